//! Borrow of a pooled connection for the duration of one exchange

use std::ops::Deref;
use std::sync::Arc;

use super::connection::Connection;

/// Marks its connection in use while alive; dropping it releases the
/// connection back to idle for the same identity
#[derive(Debug)]
pub struct PooledConnection {
    conn: Arc<Connection>,
}

impl PooledConnection {
    pub(crate) fn new(conn: Arc<Connection>) -> Self {
        conn.begin_use();
        Self { conn }
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Give the connection back to the pool
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.conn.end_use();
    }
}

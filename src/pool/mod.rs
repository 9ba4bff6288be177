//! Upstream connection pooling
//!
//! Connections are keyed by (client identity, target) so that every upstream
//! exchange runs under the identity that earned it. See [`ConnectionPool`]
//! for the locking rules.

mod connection;
mod connection_pool;
mod guard;

pub use connection::{Connection, ConnectionState};
pub use connection_pool::{ConnectionPool, PoolStatus};
pub use guard::PooledConnection;

//! One authenticated upstream connection

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::MutexGuard;
use tracing::debug;

use crate::constants::timeout::UNBIND;
use crate::error::{ProxyError, Result};
use crate::protocol::{ProtocolVersion, ResultCode};
use crate::rewrite::RewriteSession;
use crate::session::Identity;
use crate::target::Target;
use crate::types::ConnectionId;
use crate::upstream::DirectorySession;

/// Connection lifecycle
///
/// `Unbound` and `Bound` are the two initial states (an anonymous connection
/// never binds). `Retired` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Unbound = 0,
    Bound = 1,
    InUse = 2,
    Idle = 3,
    Retired = 4,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unbound,
            1 => Self::Bound,
            2 => Self::InUse,
            3 => Self::Idle,
            _ => Self::Retired,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbound => "unbound",
            Self::Bound => "bound",
            Self::InUse => "in-use",
            Self::Idle => "idle",
            Self::Retired => "retired",
        };
        f.write_str(name)
    }
}

/// Live session to one target for one identity
///
/// The identity never changes. Exchanges are serialized on the transport
/// lock in the order they ask for it.
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    target: Arc<Target>,
    version: ProtocolVersion,
    rewrite: RewriteSession,
    transport: tokio::sync::Mutex<Box<dyn DirectorySession>>,
    state: AtomicU8,
    in_flight: AtomicUsize,
    created_at: Instant,
    last_used: Mutex<Instant>,
    last_error: Mutex<Option<ResultCode>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("target", &self.target.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        identity: Identity,
        target: Arc<Target>,
        transport: Box<dyn DirectorySession>,
        rewrite: RewriteSession,
        bound: bool,
    ) -> Self {
        let now = Instant::now();
        let state = if bound {
            ConnectionState::Bound
        } else {
            ConnectionState::Unbound
        };
        Self {
            id: ConnectionId::next(),
            identity,
            version: target.protocol_version(),
            target,
            rewrite,
            transport: tokio::sync::Mutex::new(transport),
            state: AtomicU8::new(state as u8),
            in_flight: AtomicUsize::new(0),
            created_at: now,
            last_used: Mutex::new(now),
            last_error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn target(&self) -> &Arc<Target> {
        &self.target
    }

    /// Version the target speaks on this connection
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    #[must_use]
    pub fn rewrite(&self) -> &RewriteSession {
        &self.rewrite
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.state() == ConnectionState::Retired
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the last exchange finished, zero while one is running
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        if self.in_flight.load(Ordering::Acquire) > 0 {
            return Duration::ZERO;
        }
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<ResultCode> {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record_error(&self, code: ResultCode) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(code);
    }

    /// Move to `next` unless retired
    fn transition(&self, next: ConnectionState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ConnectionState::Retired as u8).then_some(next as u8)
            });
    }

    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub(crate) fn begin_use(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.touch();
        self.transition(ConnectionState::InUse);
    }

    pub(crate) fn end_use(&self) {
        self.touch();
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.transition(ConnectionState::Idle);
        }
    }

    fn invalidated(&self) -> ProxyError {
        ProxyError::ConnectionInvalidated {
            target: self.target.name().to_string(),
        }
    }

    /// Exclusive access to the transport for one exchange
    ///
    /// Fails with `ConnectionInvalidated` once the connection is retired,
    /// including when retirement happens while waiting for the lock.
    pub async fn session(&self) -> Result<MutexGuard<'_, Box<dyn DirectorySession>>> {
        if self.is_retired() {
            return Err(self.invalidated());
        }
        let guard = self.transport.lock().await;
        if self.is_retired() {
            return Err(self.invalidated());
        }
        Ok(guard)
    }

    /// Mark retired and unbind in the background
    ///
    /// Returns `false` if it was already retired. Never waits for an
    /// exchange in progress; the unbind runs once the transport is free.
    pub(crate) fn retire(self: &Arc<Self>) -> bool {
        let previous = self.state.swap(ConnectionState::Retired as u8, Ordering::AcqRel);
        if previous == ConnectionState::Retired as u8 {
            return false;
        }
        debug!(
            conn_id = %self.id,
            target = %self.target.name(),
            identity = %self.identity,
            "retiring connection"
        );

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let unbind = async {
                let mut transport = conn.transport.lock().await;
                transport.unbind().await
            };
            match tokio::time::timeout(UNBIND, unbind).await {
                Ok(Ok(())) => debug!(conn_id = %conn.id, "unbound retired connection"),
                Ok(Err(e)) => debug!(conn_id = %conn.id, error = %e, "unbind failed"),
                Err(_) => debug!(conn_id = %conn.id, "unbind timed out"),
            }
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::protocol::{Scope, SearchRequest};
    use crate::types::TargetId;
    use crate::upstream::{DirectoryConnector, MockConnector, MockDirectory};

    async fn connection(dir: &Arc<MockDirectory>) -> Arc<Connection> {
        let config = TargetConfig::builder("mock", "ldap://mock")
            .naming_context("dc=example,dc=com")
            .build()
            .unwrap();
        let target = Arc::new(Target::from_config(TargetId::from_index(0), &config).unwrap());
        let transport = MockConnector::new()
            .with_directory("mock", dir.clone())
            .connect(&target)
            .await
            .unwrap();
        let rewrite = RewriteSession::for_target(&target, Vec::new());
        Arc::new(Connection::new(
            Identity::Anonymous,
            target,
            transport,
            rewrite,
            false,
        ))
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let dir = Arc::new(MockDirectory::new());
        let conn = connection(&dir).await;
        assert_eq!(conn.state(), ConnectionState::Unbound);

        conn.begin_use();
        conn.begin_use();
        assert_eq!(conn.state(), ConnectionState::InUse);
        assert_eq!(conn.idle_for(), Duration::ZERO);
        conn.end_use();
        assert_eq!(conn.state(), ConnectionState::InUse);
        conn.end_use();
        assert_eq!(conn.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_retire_is_terminal_and_unbinds() {
        let dir = Arc::new(MockDirectory::new());
        let conn = connection(&dir).await;
        assert!(conn.retire());
        assert!(!conn.retire());

        conn.begin_use();
        assert_eq!(conn.state(), ConnectionState::Retired);
        assert!(matches!(
            conn.session().await,
            Err(ProxyError::ConnectionInvalidated { .. })
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dir.stats().unbinds, 1);
    }

    #[tokio::test]
    async fn test_retire_waits_for_running_exchange() {
        let dir = Arc::new(MockDirectory::new().with_naming_contexts(["dc=example,dc=com"]));
        let conn = connection(&dir).await;
        let mut transport = conn.session().await.unwrap();
        conn.retire();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dir.stats().unbinds, 0);
        let root = SearchRequest::new("", Scope::Base, "(objectClass=*)");
        assert!(transport.search(&root, &[]).await.is_ok());
        drop(transport);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dir.stats().unbinds, 1);
    }

    #[tokio::test]
    async fn test_last_error() {
        let dir = Arc::new(MockDirectory::new());
        let conn = connection(&dir).await;
        assert_eq!(conn.last_error(), None);
        conn.record_error(ResultCode::Busy);
        assert_eq!(conn.last_error(), Some(ResultCode::Busy));
    }
}

//! Per-identity connection pool
//!
//! One slot per (identity, target). The index is a `BTreeMap` behind a
//! short-held `std::sync::Mutex`: it is locked for lookups and mutation only,
//! never across a dial or an exchange. Creation is serialized per slot by an
//! async lock, and the slot is re-checked after taking it, so concurrent
//! acquirers of one key share a single connection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionState};
use super::guard::PooledConnection;
use crate::config::ProxyConfig;
use crate::constants::ldap::{MATCH_ALL_FILTER, NAMING_CONTEXTS_ATTR};
use crate::dn::Dn;
use crate::error::{ProxyError, Result};
use crate::protocol::{LdapResult, OperationKind, Scope, SearchRequest};
use crate::rewrite::rules::ambiguous_rule;
use crate::rewrite::{RewriteSession, SuffixMapping};
use crate::session::{Credentials, Identity};
use crate::target::{CredentialPolicy, Target};
use crate::types::{MaxPoolSize, TargetId};
use crate::upstream::{DirectoryConnector, DirectorySession};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PoolKey {
    identity: Identity,
    target: TargetId,
}

impl PoolKey {
    fn new(identity: Identity, target: TargetId) -> Self {
        Self { identity, target }
    }
}

#[derive(Debug, Default)]
struct Slot {
    conn: Mutex<Option<Arc<Connection>>>,
    creating: tokio::sync::Mutex<()>,
}

impl Slot {
    fn current(&self) -> Option<Arc<Connection>> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace(&self, conn: Option<Arc<Connection>>) -> Option<Arc<Connection>> {
        std::mem::replace(
            &mut *self.conn.lock().unwrap_or_else(PoisonError::into_inner),
            conn,
        )
    }

    /// Empty the slot if it still holds `conn`
    fn clear_if(&self, conn: &Arc<Connection>) -> bool {
        let mut current = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, conn)) {
            *current = None;
            true
        } else {
            false
        }
    }
}

/// Pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub connections: usize,
    pub in_use: usize,
    pub capacity: usize,
}

/// Keyed cache of authenticated upstream connections
#[derive(Debug)]
pub struct ConnectionPool {
    connector: Arc<dyn DirectoryConnector>,
    index: Mutex<BTreeMap<PoolKey, Arc<Slot>>>,
    max_size: MaxPoolSize,
    idle_timeout: Option<Duration>,
    conn_ttl: Option<Duration>,
    closed: AtomicBool,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(connector: Arc<dyn DirectoryConnector>, max_size: MaxPoolSize) -> Self {
        Self {
            connector,
            index: Mutex::new(BTreeMap::new()),
            max_size,
            idle_timeout: None,
            conn_ttl: None,
            closed: AtomicBool::new(false),
        }
    }

    /// Pool sized and aged per the `[proxy]` section
    #[must_use]
    pub fn from_config(connector: Arc<dyn DirectoryConnector>, config: &ProxyConfig) -> Self {
        Self::new(connector, config.max_pool_size)
            .with_idle_timeout(config.idle_timeout)
            .with_conn_ttl(config.conn_ttl)
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_conn_ttl(mut self, conn_ttl: Option<Duration>) -> Self {
        self.conn_ttl = conn_ttl;
        self
    }

    fn index(&self) -> MutexGuard<'_, BTreeMap<PoolKey, Arc<Slot>>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get or insert the slot for `key`
    fn slot_for(&self, key: &PoolKey) -> Result<Arc<Slot>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProxyError::Unwilling("connection pool is shut down".into()));
        }
        let mut index = self.index();
        if let Some(slot) = index.get(key) {
            return Ok(Arc::clone(slot));
        }
        if index.len() >= self.max_size.get() {
            // Slots left empty by abandoned creations
            index.retain(|_, slot| slot.current().is_some() || Arc::strong_count(slot) > 1);
            if index.len() >= self.max_size.get() {
                return Err(ProxyError::PoolExhausted {
                    max_size: self.max_size.get(),
                });
            }
        }
        let slot = Arc::new(Slot::default());
        index.insert(key.clone(), Arc::clone(&slot));
        Ok(slot)
    }

    fn is_indexed(&self, key: &PoolKey, slot: &Arc<Slot>) -> bool {
        self.index()
            .get(key)
            .is_some_and(|indexed| Arc::ptr_eq(indexed, slot))
    }

    fn expired(&self, conn: &Connection) -> Option<&'static str> {
        if self.conn_ttl.is_some_and(|ttl| conn.age() > ttl) {
            return Some("ttl");
        }
        if self.idle_timeout.is_some_and(|idle| conn.idle_for() > idle) {
            return Some("idle timeout");
        }
        None
    }

    /// Slot's connection if it can serve another exchange
    fn usable(&self, slot: &Slot) -> Option<Arc<Connection>> {
        let conn = slot.current()?;
        if conn.is_retired() {
            slot.clear_if(&conn);
            return None;
        }
        if let Some(reason) = self.expired(&conn) {
            debug!(conn_id = %conn.id(), target = %conn.target().name(), reason, "connection expired");
            slot.clear_if(&conn);
            conn.retire();
            return None;
        }
        Some(conn)
    }

    /// Connection for `credentials`' identity on `target`, created on first need
    ///
    /// # Errors
    ///
    /// `PoolExhausted` when the key is new and the pool is full; otherwise
    /// whatever dialing or authenticating returned. A failed creation leaves
    /// no entry behind.
    pub async fn acquire(
        &self,
        target: &Arc<Target>,
        credentials: &Credentials,
    ) -> Result<PooledConnection> {
        let key = PoolKey::new(credentials.identity().clone(), target.id());
        loop {
            let slot = self.slot_for(&key)?;
            if let Some(conn) = self.usable(&slot) {
                return Ok(PooledConnection::new(conn));
            }

            let _creating = slot.creating.lock().await;
            if !self.is_indexed(&key, &slot) {
                continue;
            }
            if let Some(conn) = self.usable(&slot) {
                return Ok(PooledConnection::new(conn));
            }
            let created = self.create(target, credentials, false).await;
            return self.install(&key, &slot, created);
        }
    }

    /// Fresh connection proving `credentials`, replacing any pooled one
    ///
    /// The client's DN and password are checked upstream even when the
    /// target's policy binds as a service identity afterwards. On failure a
    /// live pooled connection for the identity is kept; otherwise no entry
    /// is left behind.
    pub async fn bind(
        &self,
        target: &Arc<Target>,
        credentials: &Credentials,
    ) -> Result<PooledConnection> {
        let key = PoolKey::new(credentials.identity().clone(), target.id());
        let slot = self.slot_for(&key)?;
        let _creating = slot.creating.lock().await;
        let created = self.create(target, credentials, true).await;
        self.install(&key, &slot, created)
    }

    fn install(
        &self,
        key: &PoolKey,
        slot: &Arc<Slot>,
        created: Result<Arc<Connection>>,
    ) -> Result<PooledConnection> {
        let (outcome, stale) = {
            let mut index = self.index();
            let indexed = index
                .get(key)
                .is_some_and(|indexed| Arc::ptr_eq(indexed, slot));
            match created {
                Ok(conn) if indexed && !self.closed.load(Ordering::Acquire) => {
                    let stale = slot.replace(Some(Arc::clone(&conn)));
                    (Ok(conn), stale)
                }
                Ok(conn) => {
                    let target = conn.target().name().to_string();
                    (Err(ProxyError::ConnectionInvalidated { target }), Some(conn))
                }
                Err(e) => {
                    // a pooled connection other sessions use survives a
                    // failed verification
                    if slot.current().is_some_and(|c| !c.is_retired()) {
                        (Err(e), None)
                    } else {
                        if indexed {
                            index.remove(key);
                        }
                        (Err(e), slot.replace(None))
                    }
                }
            }
        };
        if let Some(stale) = stale {
            stale.retire();
        }
        outcome.map(PooledConnection::new)
    }

    async fn create(
        &self,
        target: &Arc<Target>,
        credentials: &Credentials,
        verify_client: bool,
    ) -> Result<Arc<Connection>> {
        let dial = self.connector.connect(target);
        let mut transport = match tokio::time::timeout(target.connect_timeout(), dial).await {
            Ok(dialed) => dialed?,
            Err(_) => {
                return Err(ProxyError::Liveness {
                    target: target.name().to_string(),
                    reason: format!("connect timed out after {:?}", target.connect_timeout()),
                });
            }
        };

        let rewrite = RewriteSession::for_target(target, Vec::new());
        let authenticated =
            authenticate(transport.as_mut(), target, credentials, &rewrite, verify_client).await;
        let bound = match authenticated {
            Ok(bound) => bound,
            Err(e) => {
                spawn_unbind(transport);
                return Err(e);
            }
        };

        let rewrite = if target.discover_naming_context() {
            let discovered = discover(transport.as_mut(), target).await;
            match discovered {
                Ok(learned) if !learned.is_empty() => {
                    info!(
                        target = %target.name(),
                        mappings = ?learned.iter().map(ToString::to_string).collect::<Vec<_>>(),
                        "learned naming context from root DSE"
                    );
                    RewriteSession::for_target(target, learned)
                }
                Ok(_) => rewrite,
                Err(e) if e.is_liveness() => {
                    spawn_unbind(transport);
                    return Err(e);
                }
                Err(e) => {
                    warn!(target = %target.name(), error = %e, "naming context discovery failed");
                    rewrite
                }
            }
        } else {
            rewrite
        };

        let conn = Arc::new(Connection::new(
            credentials.identity().clone(),
            Arc::clone(target),
            transport,
            rewrite,
            bound,
        ));
        debug!(
            conn_id = %conn.id(),
            target = %target.name(),
            identity = %conn.identity(),
            "created upstream connection"
        );
        Ok(conn)
    }

    /// Tear down every connection `identity` owns
    ///
    /// Returns immediately; unbinds run in the background. Operations still
    /// holding one of the connections see it invalidated.
    pub fn destroy(&self, identity: &Identity) -> usize {
        let low = PoolKey::new(identity.clone(), TargetId::MIN);
        let high = PoolKey::new(identity.clone(), TargetId::MAX);
        let removed: Vec<Arc<Slot>> = {
            let mut index = self.index();
            let keys: Vec<PoolKey> = index.range(low..=high).map(|(k, _)| k.clone()).collect();
            keys.iter().filter_map(|k| index.remove(k)).collect()
        };

        let count = removed
            .iter()
            .filter_map(|slot| slot.replace(None))
            .filter(|conn| conn.retire())
            .count();
        if count > 0 {
            debug!(identity = %identity, count, "destroyed connections");
        }
        count
    }

    /// Drop `conn` from the pool if it is still the indexed one, and retire it
    pub fn retire(&self, conn: &Arc<Connection>) -> bool {
        let key = PoolKey::new(conn.identity().clone(), conn.target().id());
        let indexed = self
            .index()
            .get(&key)
            .is_some_and(|slot| slot.clear_if(conn));
        conn.retire();
        indexed
    }

    /// Retire everything and refuse new work
    pub fn shutdown(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let slots = std::mem::take(&mut *self.index());
        let count = slots
            .values()
            .filter_map(|slot| slot.replace(None))
            .filter(|conn| conn.retire())
            .count();
        info!(count, "connection pool shut down");
        count
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let index = self.index();
        let live: Vec<Arc<Connection>> = index.values().filter_map(|s| s.current()).collect();
        PoolStatus {
            connections: live.len(),
            in_use: live
                .iter()
                .filter(|c| c.state() == ConnectionState::InUse)
                .count(),
            capacity: self.max_size.get(),
        }
    }

    /// Pooled connection for (identity, target), if any
    #[must_use]
    pub fn connection(&self, identity: &Identity, target: TargetId) -> Option<Arc<Connection>> {
        self.index()
            .get(&PoolKey::new(identity.clone(), target))
            .and_then(|slot| slot.current())
    }

    /// Number of keys with a live connection
    #[must_use]
    pub fn len(&self) -> usize {
        self.status().connections
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        let slots = std::mem::take(&mut *self.index());
        for conn in slots.values().filter_map(|slot| slot.replace(None)) {
            if tokio::runtime::Handle::try_current().is_ok() {
                conn.retire();
            }
        }
    }
}

async fn timed<T>(
    target: &Target,
    kind: OperationKind,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(target.timeout(kind), fut)
        .await
        .unwrap_or_else(|_| {
            Err(ProxyError::Timeout {
                target: target.name().to_string(),
                operation: kind,
            })
        })
}

fn check_bind(target: &Target, result: LdapResult) -> Result<()> {
    if result.is_success() {
        Ok(())
    } else {
        Err(ProxyError::Authentication {
            target: target.name().to_string(),
            result,
        })
    }
}

/// Bind per the target's credential policy; `Ok(true)` if anything was bound
async fn authenticate(
    transport: &mut dyn DirectorySession,
    target: &Target,
    credentials: &Credentials,
    rewrite: &RewriteSession,
    verify_client: bool,
) -> Result<bool> {
    let policy = target.credential_policy();
    let forward = matches!(policy, CredentialPolicy::Forward);
    let mut bound = false;

    if let Identity::Dn(dn) = credentials.identity()
        && (forward || verify_client)
    {
        let upstream_dn = rewrite.map_to_upstream(dn).unwrap_or_else(|| dn.clone());
        let result = timed(
            target,
            OperationKind::Bind,
            transport.simple_bind(&upstream_dn.to_string(), credentials.password()),
        )
        .await?;
        check_bind(target, result)?;
        bound = true;
    }

    if let Some(service) = policy.service() {
        let result = timed(
            target,
            OperationKind::Bind,
            transport.simple_bind(&service.bind_dn.to_string(), &service.password),
        )
        .await?;
        check_bind(target, result)?;
        bound = true;
    }

    Ok(bound)
}

/// Read the root DSE and derive mappings for contexts served under another name
async fn discover(
    transport: &mut dyn DirectorySession,
    target: &Target,
) -> Result<Vec<SuffixMapping>> {
    let request = SearchRequest::new("", Scope::Base, MATCH_ALL_FILTER)
        .with_attributes([NAMING_CONTEXTS_ATTR]);
    let outcome = timed(target, OperationKind::Search, transport.search(&request, &[])).await?;

    let advertised: Vec<Dn> = outcome
        .entries
        .iter()
        .flat_map(|entry| entry.values(NAMING_CONTEXTS_ATTR).unwrap_or_default())
        .filter_map(|value| std::str::from_utf8(value).ok())
        .filter_map(|value| Dn::parse(value).ok())
        .collect();
    Ok(learned_mappings(target, &advertised))
}

/// A single unmapped context paired with a single, differently named,
/// upstream context
fn learned_mappings(target: &Target, advertised: &[Dn]) -> Vec<SuffixMapping> {
    let unmapped: Vec<&Dn> = target
        .naming_contexts()
        .iter()
        .filter(|ctx| !target.suffix_mappings().iter().any(|m| &m.client == *ctx))
        .collect();
    let learned = match (unmapped.as_slice(), advertised) {
        ([client], [upstream]) if *client != upstream => {
            SuffixMapping::new((*client).clone(), upstream.clone())
        }
        _ => return Vec::new(),
    };

    let mut mappings = target.suffix_mappings().to_vec();
    mappings.push(learned.clone());
    if let Some(conflict) = ambiguous_rule(target.naming_contexts(), &mappings) {
        warn!(target = %target.name(), %conflict, "ignoring advertised naming context");
        return Vec::new();
    }
    vec![learned]
}

fn spawn_unbind(mut transport: Box<dyn DirectorySession>) {
    tokio::spawn(async move {
        let _ = tokio::time::timeout(crate::constants::timeout::UNBIND, transport.unbind()).await;
    });
}

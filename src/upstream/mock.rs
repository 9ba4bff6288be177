//! In-memory upstream for tests and dry runs
//!
//! A [`MockDirectory`] behaves like a small directory server: it stores
//! entries, checks simple-bind credentials, evaluates filters and answers a
//! root DSE query. It also counts dials, binds and exchanges, records every
//! request it receives, and can inject liveness failures so that retry and
//! teardown paths can be driven deterministically.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{DirectoryConnector, DirectorySession, SearchOutcome};
use crate::constants::ldap::NAMING_CONTEXTS_ATTR;
use crate::dn::Dn;
use crate::error::{ProxyError, Result};
use crate::filter::Filter;
use crate::protocol::{
    AddRequest, Attribute, CompareRequest, Control, DeleteRequest, Entry, LdapResult,
    ModifyDnRequest, ModifyOp, ModifyRequest, OperationKind, ResultCode, Scope, SearchRequest,
};
use crate::target::Target;

/// Snapshot of a directory's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    pub dials: usize,
    pub binds: usize,
    pub exchanges: usize,
    pub unbinds: usize,
}

/// One request as the upstream saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub kind: OperationKind,
    /// Target DN (search base for searches)
    pub dn: String,
    pub filter: Option<String>,
    pub controls: Vec<Control>,
    /// DN the session was bound as, empty for anonymous
    pub bound_as: String,
}

#[derive(Debug, Default)]
struct DirectoryState {
    /// Keyed by normalized DN
    entries: BTreeMap<String, Entry>,
    /// Normalized DN to password
    credentials: HashMap<String, String>,
    naming_contexts: Vec<String>,
    requests: Vec<RecordedRequest>,
}

/// In-memory directory server
#[derive(Debug, Default)]
pub struct MockDirectory {
    state: Mutex<DirectoryState>,
    dials: AtomicUsize,
    binds: AtomicUsize,
    exchanges: AtomicUsize,
    unbinds: AtomicUsize,
    fail_next: AtomicUsize,
    fail_dials: AtomicUsize,
    generation: AtomicU64,
    latency_ms: AtomicU64,
}

impl MockDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Contexts reported by the root DSE
    #[must_use]
    pub fn with_naming_contexts<I, S>(self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().naming_contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_entry(self, entry: Entry) -> Self {
        self.insert_entry(entry);
        self
    }

    /// Add a bindable person entry
    #[must_use]
    pub fn with_user(self, dn: &str, password: &str) -> Self {
        let cn = Dn::parse(dn)
            .ok()
            .and_then(|d| d.first_rdn().map(|r| r.avas()[0].value().to_string()))
            .unwrap_or_default();
        self.insert_entry(Entry::new(
            dn,
            vec![
                Attribute::new("objectClass", ["person"]),
                Attribute::new("cn", [cn]),
            ],
        ));
        self.state()
            .credentials
            .insert(normalize(dn), password.to_string());
        self
    }

    pub fn insert_entry(&self, entry: Entry) {
        self.state().entries.insert(normalize(&entry.dn), entry);
    }

    #[must_use]
    pub fn entry(&self, dn: &str) -> Option<Entry> {
        self.state().entries.get(&normalize(dn)).cloned()
    }

    /// Make the next `n` non-bind exchanges fail as if the connection dropped
    ///
    /// The session that hits a failure is dead afterwards.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` dials fail
    pub fn fail_dials(&self, n: usize) {
        self.fail_dials.store(n, Ordering::SeqCst);
    }

    /// Drop every open session, as a server restart would
    pub fn sever_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Delay every exchange by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    #[must_use]
    pub fn stats(&self) -> MockStats {
        MockStats {
            dials: self.dials.load(Ordering::SeqCst),
            binds: self.binds.load(Ordering::SeqCst),
            exchanges: self.exchanges.load(Ordering::SeqCst),
            unbinds: self.unbinds.load(Ordering::SeqCst),
        }
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn delay(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn search_entries(&self, request: &SearchRequest) -> SearchOutcome {
        let Ok(base) = Dn::parse(&request.base) else {
            return outcome(ResultCode::InvalidDnSyntax, Vec::new());
        };
        let Ok(filter) = Filter::parse(&request.filter) else {
            return outcome(ResultCode::ProtocolError, Vec::new());
        };
        let state = self.state();

        if base.is_root() && request.scope == Scope::Base {
            let root_dse = Entry::new(
                "",
                vec![Attribute::new(
                    NAMING_CONTEXTS_ATTR,
                    state.naming_contexts.iter().cloned(),
                )],
            );
            return outcome(ResultCode::Success, vec![root_dse]);
        }
        if !base.is_root() && !state.entries.contains_key(&base.normalized()) {
            return outcome(ResultCode::NoSuchObject, Vec::new());
        }

        let mut entries: Vec<Entry> = state
            .entries
            .values()
            .filter(|entry| {
                let Ok(dn) = Dn::parse(&entry.dn) else {
                    return false;
                };
                let in_scope = match request.scope {
                    Scope::Base => dn == base,
                    Scope::OneLevel => dn.is_child_of(&base),
                    Scope::Subtree => dn.is_within(&base),
                };
                in_scope && matches(&filter, entry)
            })
            .cloned()
            .collect();

        if request.size_limit > 0 && entries.len() > request.size_limit {
            entries.truncate(request.size_limit);
            return outcome(ResultCode::SizeLimitExceeded, entries);
        }
        outcome(ResultCode::Success, entries)
    }

    fn apply_modify(&self, request: &ModifyRequest) -> LdapResult {
        let mut state = self.state();
        let Some(entry) = state.entries.get_mut(&normalize(&request.dn)) else {
            return LdapResult::new(ResultCode::NoSuchObject, "");
        };
        for change in &request.changes {
            let name = &change.attribute.name;
            let position = entry
                .attributes
                .iter()
                .position(|a| a.name.eq_ignore_ascii_case(name));
            match (change.op, position) {
                (ModifyOp::Add, Some(i)) => {
                    entry.attributes[i]
                        .values
                        .extend(change.attribute.values.iter().cloned());
                }
                (ModifyOp::Add | ModifyOp::Replace, None) => {
                    entry.attributes.push(change.attribute.clone());
                }
                (ModifyOp::Replace, Some(i)) => {
                    entry.attributes[i].values = change.attribute.values.clone();
                }
                (ModifyOp::Delete, Some(i)) => {
                    if change.attribute.values.is_empty() {
                        entry.attributes.remove(i);
                    } else {
                        entry.attributes[i]
                            .values
                            .retain(|v| !change.attribute.values.contains(v));
                    }
                }
                (ModifyOp::Delete, None) => {
                    return LdapResult::new(ResultCode::NoSuchAttribute, name.clone());
                }
            }
        }
        LdapResult::success()
    }

    fn apply_add(&self, request: &AddRequest) -> LdapResult {
        let mut state = self.state();
        let key = normalize(&request.dn);
        if state.entries.contains_key(&key) {
            return LdapResult::new(ResultCode::EntryAlreadyExists, "");
        }
        state
            .entries
            .insert(key, Entry::new(request.dn.clone(), request.attributes.clone()));
        LdapResult::success()
    }

    fn apply_delete(&self, request: &DeleteRequest) -> LdapResult {
        let mut state = self.state();
        let Ok(dn) = Dn::parse(&request.dn) else {
            return LdapResult::new(ResultCode::InvalidDnSyntax, "");
        };
        if has_children(&state, &dn) {
            return LdapResult::new(ResultCode::NotAllowedOnNonLeaf, "");
        }
        match state.entries.remove(&dn.normalized()) {
            Some(_) => LdapResult::success(),
            None => LdapResult::new(ResultCode::NoSuchObject, ""),
        }
    }

    fn apply_modify_dn(&self, request: &ModifyDnRequest) -> LdapResult {
        let mut state = self.state();
        let (Ok(dn), Ok(rdn)) = (
            Dn::parse(&request.dn),
            crate::dn::Rdn::parse(&request.new_rdn),
        ) else {
            return LdapResult::new(ResultCode::InvalidDnSyntax, "");
        };
        let parent = match &request.new_superior {
            Some(sup) => match Dn::parse(sup) {
                Ok(sup) => sup,
                Err(_) => return LdapResult::new(ResultCode::InvalidDnSyntax, ""),
            },
            None => dn.parent().unwrap_or_else(Dn::root),
        };
        if has_children(&state, &dn) {
            return LdapResult::new(ResultCode::NotAllowedOnNonLeaf, "");
        }
        let new_dn = parent.child(rdn.clone());
        if state.entries.contains_key(&new_dn.normalized()) {
            return LdapResult::new(ResultCode::EntryAlreadyExists, "");
        }
        let Some(mut entry) = state.entries.remove(&dn.normalized()) else {
            return LdapResult::new(ResultCode::NoSuchObject, "");
        };
        entry.dn = new_dn.to_string();
        for ava in rdn.avas() {
            match entry
                .attributes
                .iter_mut()
                .find(|a| a.name.eq_ignore_ascii_case(ava.attribute()))
            {
                Some(attr) if request.delete_old_rdn => {
                    attr.values = vec![ava.value().as_bytes().to_vec()];
                }
                Some(attr) => attr.values.push(ava.value().as_bytes().to_vec()),
                None => entry
                    .attributes
                    .push(Attribute::new(ava.attribute(), [ava.value()])),
            }
        }
        state.entries.insert(new_dn.normalized(), entry);
        LdapResult::success()
    }

    fn compare_entry(&self, request: &CompareRequest) -> LdapResult {
        let state = self.state();
        let Some(entry) = state.entries.get(&normalize(&request.dn)) else {
            return LdapResult::new(ResultCode::NoSuchObject, "");
        };
        let Some(values) = entry.values(&request.attribute) else {
            return LdapResult::new(ResultCode::NoSuchAttribute, "");
        };
        if values.iter().any(|v| value_eq(v, &request.value)) {
            LdapResult::new(ResultCode::CompareTrue, "")
        } else {
            LdapResult::new(ResultCode::CompareFalse, "")
        }
    }
}

/// Routes dials to registered directories by target name
#[derive(Debug, Default, Clone)]
pub struct MockConnector {
    directories: HashMap<String, Arc<MockDirectory>>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve target `name` from `directory`
    #[must_use]
    pub fn with_directory(mut self, name: impl Into<String>, directory: Arc<MockDirectory>) -> Self {
        self.directories.insert(name.into(), directory);
        self
    }
}

#[async_trait]
impl DirectoryConnector for MockConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn DirectorySession>> {
        let liveness = |reason: &str| ProxyError::Liveness {
            target: target.name().to_string(),
            reason: reason.to_string(),
        };
        let directory = self
            .directories
            .get(target.name().as_str())
            .cloned()
            .ok_or_else(|| liveness("connection refused"))?;
        if MockDirectory::take_failure(&directory.fail_dials) {
            return Err(liveness("connection refused"));
        }
        directory.dials.fetch_add(1, Ordering::SeqCst);
        directory.delay().await;

        let generation = directory.generation.load(Ordering::SeqCst);
        Ok(Box::new(MockSession {
            directory,
            target: target.name().to_string(),
            generation,
            bound_as: String::new(),
            closed: false,
            next_id: 1,
        }))
    }
}

#[derive(Debug)]
struct MockSession {
    directory: Arc<MockDirectory>,
    target: String,
    generation: u64,
    bound_as: String,
    closed: bool,
    next_id: i32,
}

impl MockSession {
    fn liveness(&self, reason: &str) -> ProxyError {
        ProxyError::Liveness {
            target: self.target.clone(),
            reason: reason.to_string(),
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.closed || self.generation != self.directory.generation.load(Ordering::SeqCst) {
            return Err(self.liveness("connection reset by peer"));
        }
        Ok(())
    }

    /// Common prologue of every non-bind exchange
    async fn begin(
        &mut self,
        kind: OperationKind,
        dn: &str,
        filter: Option<&str>,
        controls: &[Control],
    ) -> Result<()> {
        self.check_alive()?;
        self.next_id += 1;
        self.directory.exchanges.fetch_add(1, Ordering::SeqCst);
        self.directory.state().requests.push(RecordedRequest {
            kind,
            dn: dn.to_string(),
            filter: filter.map(str::to_string),
            controls: controls.to_vec(),
            bound_as: self.bound_as.clone(),
        });
        if MockDirectory::take_failure(&self.directory.fail_next) {
            self.closed = true;
            return Err(self.liveness("unexpected end of stream"));
        }
        self.directory.delay().await;
        self.check_alive()
    }
}

#[async_trait]
impl DirectorySession for MockSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<LdapResult> {
        self.check_alive()?;
        self.next_id += 1;
        self.directory.binds.fetch_add(1, Ordering::SeqCst);
        self.directory.delay().await;

        if dn.trim().is_empty() {
            self.bound_as.clear();
            return Ok(LdapResult::success());
        }
        let expected = self.directory.state().credentials.get(&normalize(dn)).cloned();
        match expected {
            Some(expected) if expected == password => {
                self.bound_as = dn.to_string();
                Ok(LdapResult::success())
            }
            _ => Ok(LdapResult::new(ResultCode::InvalidCredentials, "invalid credentials")),
        }
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
        controls: &[Control],
    ) -> Result<SearchOutcome> {
        self.begin(
            OperationKind::Search,
            &request.base,
            Some(&request.filter),
            controls,
        )
        .await?;
        Ok(self.directory.search_entries(request))
    }

    async fn compare(
        &mut self,
        request: &CompareRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.begin(OperationKind::Compare, &request.dn, None, controls)
            .await?;
        Ok(self.directory.compare_entry(request))
    }

    async fn modify(
        &mut self,
        request: &ModifyRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.begin(OperationKind::Modify, &request.dn, None, controls)
            .await?;
        Ok(self.directory.apply_modify(request))
    }

    async fn add(&mut self, request: &AddRequest, controls: &[Control]) -> Result<LdapResult> {
        self.begin(OperationKind::Add, &request.dn, None, controls)
            .await?;
        Ok(self.directory.apply_add(request))
    }

    async fn delete(
        &mut self,
        request: &DeleteRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.begin(OperationKind::Delete, &request.dn, None, controls)
            .await?;
        Ok(self.directory.apply_delete(request))
    }

    async fn modify_dn(
        &mut self,
        request: &ModifyDnRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.begin(OperationKind::ModifyDn, &request.dn, None, controls)
            .await?;
        Ok(self.directory.apply_modify_dn(request))
    }

    async fn unbind(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.directory.unbinds.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn last_message_id(&self) -> Option<i32> {
        (self.next_id > 1).then_some(self.next_id)
    }
}

fn outcome(code: ResultCode, entries: Vec<Entry>) -> SearchOutcome {
    SearchOutcome {
        entries,
        referrals: Vec::new(),
        result: LdapResult::new(code, ""),
    }
}

fn normalize(dn: &str) -> String {
    Dn::parse(dn)
        .map(|d| d.normalized())
        .unwrap_or_else(|_| dn.to_ascii_lowercase())
}

fn has_children(state: &DirectoryState, dn: &Dn) -> bool {
    state.entries.values().any(|e| {
        Dn::parse(&e.dn)
            .map(|child| child.is_child_of(dn))
            .unwrap_or(false)
    })
}

/// Case-insensitive value match; DN values compare by normalized form
fn value_eq(stored: &[u8], asserted: &[u8]) -> bool {
    if stored.eq_ignore_ascii_case(asserted) {
        return true;
    }
    match (std::str::from_utf8(stored), std::str::from_utf8(asserted)) {
        (Ok(a), Ok(b)) if a.contains('=') && b.contains('=') => {
            matches!((Dn::parse(a), Dn::parse(b)), (Ok(a), Ok(b)) if a == b)
        }
        _ => false,
    }
}

fn matches(filter: &Filter, entry: &Entry) -> bool {
    match filter {
        Filter::And(items) => items.iter().all(|f| matches(f, entry)),
        Filter::Or(items) => items.iter().any(|f| matches(f, entry)),
        Filter::Not(inner) => !matches(inner, entry),
        Filter::Present { attribute } => {
            attribute.eq_ignore_ascii_case("objectClass") || entry.values(attribute).is_some()
        }
        Filter::Equality { attribute, value } | Filter::Approx { attribute, value } => entry
            .values(attribute)
            .is_some_and(|values| values.iter().any(|v| value_eq(v, value))),
        Filter::GreaterOrEqual { attribute, value } => entry
            .values(attribute)
            .is_some_and(|values| values.iter().any(|v| v.as_slice() >= value.as_slice())),
        Filter::LessOrEqual { attribute, value } => entry
            .values(attribute)
            .is_some_and(|values| values.iter().any(|v| v.as_slice() <= value.as_slice())),
        Filter::Substrings {
            attribute,
            initial,
            any,
            last,
        } => entry.values(attribute).is_some_and(|values| {
            values
                .iter()
                .any(|v| substring_match(v, initial.as_deref(), any, last.as_deref()))
        }),
        Filter::Extensible {
            attribute, value, ..
        } => match attribute {
            Some(attribute) => entry
                .values(attribute)
                .is_some_and(|values| values.iter().any(|v| value_eq(v, value))),
            None => entry
                .attributes
                .iter()
                .any(|a| a.values.iter().any(|v| value_eq(v, value))),
        },
    }
}

fn substring_match(value: &[u8], initial: Option<&[u8]>, any: &[Vec<u8>], last: Option<&[u8]>) -> bool {
    let value = value.to_ascii_lowercase();
    let mut rest = value.as_slice();

    if let Some(initial) = initial {
        let initial = initial.to_ascii_lowercase();
        if !rest.starts_with(&initial) {
            return false;
        }
        rest = &rest[initial.len()..];
    }
    for piece in any {
        let piece = piece.to_ascii_lowercase();
        match rest.windows(piece.len().max(1)).position(|w| w == piece.as_slice()) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }
    match last {
        Some(last) => rest.ends_with(&last.to_ascii_lowercase()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::types::TargetId;

    fn target(name: &str) -> Target {
        let config = TargetConfig::builder(name, "ldap://mock")
            .naming_context("dc=example,dc=com")
            .build()
            .unwrap();
        Target::from_config(TargetId::from_index(0), &config).unwrap()
    }

    fn directory() -> Arc<MockDirectory> {
        Arc::new(
            MockDirectory::new()
                .with_naming_contexts(["dc=example,dc=com"])
                .with_entry(Entry::new(
                    "dc=example,dc=com",
                    vec![Attribute::new("objectClass", ["domain"])],
                ))
                .with_user("uid=jane,dc=example,dc=com", "secret"),
        )
    }

    async fn session(dir: &Arc<MockDirectory>) -> Box<dyn DirectorySession> {
        MockConnector::new()
            .with_directory("mock", dir.clone())
            .connect(&target("mock"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bind_checks_credentials() {
        let dir = directory();
        let mut s = session(&dir).await;
        let ok = s.simple_bind("uid=jane,dc=example,dc=com", "secret").await.unwrap();
        assert!(ok.is_success());
        let bad = s.simple_bind("uid=jane,dc=example,dc=com", "nope").await.unwrap();
        assert_eq!(bad.code, ResultCode::InvalidCredentials);
        assert_eq!(dir.stats().binds, 2);
        assert_eq!(dir.stats().dials, 1);
    }

    #[tokio::test]
    async fn test_search_scopes() {
        let dir = directory();
        let mut s = session(&dir).await;
        let sub = SearchRequest::new("dc=example,dc=com", Scope::Subtree, "(objectClass=*)");
        assert_eq!(s.search(&sub, &[]).await.unwrap().entries.len(), 2);
        let one = SearchRequest::new("dc=example,dc=com", Scope::OneLevel, "(uid=*)");
        let found = s.search(&one, &[]).await.unwrap();
        assert_eq!(found.entries.len(), 0);
        let one = SearchRequest::new("dc=example,dc=com", Scope::OneLevel, "(cn=jane)");
        assert_eq!(s.search(&one, &[]).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn test_root_dse() {
        let dir = directory();
        let mut s = session(&dir).await;
        let req = SearchRequest::new("", Scope::Base, "(objectClass=*)");
        let found = s.search(&req, &[]).await.unwrap();
        assert_eq!(
            found.entries[0].first_str(NAMING_CONTEXTS_ATTR),
            Some("dc=example,dc=com")
        );
    }

    #[tokio::test]
    async fn test_injected_failure_kills_session() {
        let dir = directory();
        let mut s = session(&dir).await;
        dir.fail_next(1);
        let req = SearchRequest::new("dc=example,dc=com", Scope::Base, "(objectClass=*)");
        assert!(s.search(&req, &[]).await.unwrap_err().is_liveness());
        assert!(s.search(&req, &[]).await.unwrap_err().is_liveness());
        let mut fresh = session(&dir).await;
        assert!(fresh.search(&req, &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_sever_all() {
        let dir = directory();
        let mut s = session(&dir).await;
        dir.sever_all();
        let req = SearchRequest::new("dc=example,dc=com", Scope::Base, "(objectClass=*)");
        assert!(s.search(&req, &[]).await.unwrap_err().is_liveness());
    }

    #[tokio::test]
    async fn test_update_operations() {
        let dir = directory();
        let mut s = session(&dir).await;
        let add = AddRequest {
            dn: "cn=admins,dc=example,dc=com".into(),
            attributes: vec![Attribute::new("member", ["uid=jane,dc=example,dc=com"])],
        };
        assert!(s.add(&add, &[]).await.unwrap().is_success());
        assert_eq!(
            s.add(&add, &[]).await.unwrap().code,
            ResultCode::EntryAlreadyExists
        );

        let cmp = CompareRequest {
            dn: "cn=admins,dc=example,dc=com".into(),
            attribute: "member".into(),
            value: b"UID=Jane,DC=example,DC=com".to_vec(),
        };
        assert_eq!(s.compare(&cmp, &[]).await.unwrap().code, ResultCode::CompareTrue);

        let rename = ModifyDnRequest {
            dn: "cn=admins,dc=example,dc=com".into(),
            new_rdn: "cn=operators".into(),
            delete_old_rdn: true,
            new_superior: None,
        };
        assert!(s.modify_dn(&rename, &[]).await.unwrap().is_success());
        assert!(dir.entry("cn=operators,dc=example,dc=com").is_some());

        let delete = DeleteRequest {
            dn: "cn=operators,dc=example,dc=com".into(),
        };
        assert!(s.delete(&delete, &[]).await.unwrap().is_success());
        assert_eq!(dir.requests().len(), 5);
    }

    #[test]
    fn test_substring_match() {
        assert!(substring_match(b"Jane Doe", Some(b"ja"), &[b"e d".to_vec()], Some(b"oe")));
        assert!(!substring_match(b"Jane Doe", Some(b"do"), &[], None));
        assert!(substring_match(b"Jane Doe", None, &[], Some(b"doe")));
    }
}

//! Production transport backed by `ldap3`

use async_trait::async_trait;
use ldap3::controls::RawControl;
use ldap3::{LdapConnAsync, LdapConnSettings, LdapError, Mod, SearchEntry, SearchOptions};
use std::collections::HashSet;
use tracing::debug;

use super::{DirectoryConnector, DirectorySession, SearchOutcome};
use crate::error::{ProxyError, Result};
use crate::protocol::{
    AddRequest, Attribute, CompareRequest, Control, DeleteRequest, Entry, LdapResult,
    ModifyDnRequest, ModifyOp, ModifyRequest, OperationKind, ResultCode, Scope, SearchRequest,
};
use crate::target::Target;

/// Dials targets with `ldap3`, one driver task per connection
#[derive(Debug, Default, Clone, Copy)]
pub struct LdapConnector;

impl LdapConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self, target: &Target) -> Result<Box<dyn DirectorySession>> {
        let settings = LdapConnSettings::new().set_conn_timeout(target.connect_timeout());
        let (conn, ldap) = LdapConnAsync::with_settings(settings, target.url())
            .await
            .map_err(|e| ProxyError::Liveness {
                target: target.name().to_string(),
                reason: e.to_string(),
            })?;
        ldap3::drive!(conn);
        debug!(target = %target.name(), url = target.url(), "dialed upstream");

        Ok(Box::new(LdapSession {
            ldap,
            target: target.name().to_string(),
            last_id: None,
        }))
    }
}

/// One `ldap3` connection
pub struct LdapSession {
    ldap: ldap3::Ldap,
    target: String,
    last_id: Option<i32>,
}

impl std::fmt::Debug for LdapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSession")
            .field("target", &self.target)
            .field("last_id", &self.last_id)
            .finish_non_exhaustive()
    }
}

impl LdapSession {
    fn attach_controls(&mut self, controls: &[Control]) {
        if controls.is_empty() {
            return;
        }
        let raw: Vec<RawControl> = controls
            .iter()
            .map(|c| RawControl {
                ctype: c.oid.clone(),
                crit: c.critical,
                val: c.value.clone(),
            })
            .collect();
        self.ldap.with_controls(raw);
    }

    fn record_id(&mut self) {
        self.last_id = Some(self.ldap.last_id());
    }

    fn map_error(&self, operation: OperationKind, err: LdapError) -> ProxyError {
        map_ldap_error(&self.target, operation, err)
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<LdapResult> {
        let result = self.ldap.simple_bind(dn, password).await;
        self.record_id();
        result
            .map(convert_result)
            .map_err(|e| self.map_error(OperationKind::Bind, e))
    }

    async fn search(
        &mut self,
        request: &SearchRequest,
        controls: &[Control],
    ) -> Result<SearchOutcome> {
        self.attach_controls(controls);
        let options = SearchOptions::new()
            .sizelimit(i32::try_from(request.size_limit).unwrap_or(i32::MAX))
            .timelimit(i32::try_from(request.time_limit).unwrap_or(i32::MAX))
            .typesonly(request.types_only);
        self.ldap.with_search_options(options);

        let scope = match request.scope {
            Scope::Base => ldap3::Scope::Base,
            Scope::OneLevel => ldap3::Scope::OneLevel,
            Scope::Subtree => ldap3::Scope::Subtree,
        };
        let outcome = self
            .ldap
            .search(
                &request.base,
                scope,
                &request.filter,
                request.attributes.clone(),
            )
            .await;
        self.record_id();
        let ldap3::SearchResult(raw_entries, result) =
            outcome.map_err(|e| self.map_error(OperationKind::Search, e))?;

        let mut entries = Vec::with_capacity(raw_entries.len());
        let mut referrals = Vec::new();
        for raw in raw_entries {
            if raw.is_intermediate() {
                continue;
            }
            if raw.is_ref() {
                referrals.extend(ldap3::parse_refs(raw.0));
                continue;
            }
            entries.push(convert_entry(SearchEntry::construct(raw)));
        }

        Ok(SearchOutcome {
            entries,
            referrals,
            result: convert_result(result),
        })
    }

    async fn compare(
        &mut self,
        request: &CompareRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.attach_controls(controls);
        let result = self
            .ldap
            .compare(&request.dn, &request.attribute, request.value.as_slice())
            .await;
        self.record_id();
        result
            .map(|compare| convert_result(compare.0))
            .map_err(|e| self.map_error(OperationKind::Compare, e))
    }

    async fn modify(
        &mut self,
        request: &ModifyRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.attach_controls(controls);
        let mods: Vec<Mod<Vec<u8>>> = request
            .changes
            .iter()
            .map(|change| {
                let name = change.attribute.name.clone().into_bytes();
                let values: HashSet<Vec<u8>> = change.attribute.values.iter().cloned().collect();
                match change.op {
                    ModifyOp::Add => Mod::Add(name, values),
                    ModifyOp::Delete => Mod::Delete(name, values),
                    ModifyOp::Replace => Mod::Replace(name, values),
                }
            })
            .collect();
        let result = self.ldap.modify(&request.dn, mods).await;
        self.record_id();
        result
            .map(convert_result)
            .map_err(|e| self.map_error(OperationKind::Modify, e))
    }

    async fn add(&mut self, request: &AddRequest, controls: &[Control]) -> Result<LdapResult> {
        self.attach_controls(controls);
        let attrs: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = request
            .attributes
            .iter()
            .map(|a| {
                (
                    a.name.clone().into_bytes(),
                    a.values.iter().cloned().collect(),
                )
            })
            .collect();
        let result = self.ldap.add(&request.dn, attrs).await;
        self.record_id();
        result
            .map(convert_result)
            .map_err(|e| self.map_error(OperationKind::Add, e))
    }

    async fn delete(
        &mut self,
        request: &DeleteRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.attach_controls(controls);
        let result = self.ldap.delete(&request.dn).await;
        self.record_id();
        result
            .map(convert_result)
            .map_err(|e| self.map_error(OperationKind::Delete, e))
    }

    async fn modify_dn(
        &mut self,
        request: &ModifyDnRequest,
        controls: &[Control],
    ) -> Result<LdapResult> {
        self.attach_controls(controls);
        let result = self
            .ldap
            .modifydn(
                &request.dn,
                &request.new_rdn,
                request.delete_old_rdn,
                request.new_superior.as_deref(),
            )
            .await;
        self.record_id();
        result
            .map(convert_result)
            .map_err(|e| self.map_error(OperationKind::ModifyDn, e))
    }

    async fn unbind(&mut self) -> Result<()> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| self.map_error(OperationKind::Unbind, e))
    }

    fn last_message_id(&self) -> Option<i32> {
        self.last_id
    }
}

fn convert_result(result: ldap3::LdapResult) -> LdapResult {
    LdapResult {
        code: ResultCode::from_u32(result.rc),
        matched_dn: result.matched,
        message: result.text,
        referrals: result.refs,
    }
}

fn convert_entry(entry: SearchEntry) -> Entry {
    let mut attributes: Vec<Attribute> = entry
        .attrs
        .into_iter()
        .map(|(name, values)| Attribute {
            name,
            values: values.into_iter().map(String::into_bytes).collect(),
        })
        .chain(
            entry
                .bin_attrs
                .into_iter()
                .map(|(name, values)| Attribute { name, values }),
        )
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    Entry {
        dn: entry.dn,
        attributes,
    }
}

/// Classify an `ldap3` failure
///
/// Errors that mean the connection itself is gone become liveness failures;
/// a library timeout becomes a timeout; anything else is reported as a
/// local error result.
fn map_ldap_error(target: &str, operation: OperationKind, err: LdapError) -> ProxyError {
    match err {
        LdapError::Io { .. }
        | LdapError::EndOfStream { .. }
        | LdapError::OpSend { .. }
        | LdapError::ResultRecv { .. } => ProxyError::Liveness {
            target: target.to_string(),
            reason: err.to_string(),
        },
        LdapError::Timeout { .. } => ProxyError::Timeout {
            target: target.to_string(),
            operation,
        },
        other => ProxyError::Upstream {
            target: target.to_string(),
            // local error
            result: LdapResult::new(ResultCode::from_u32(82), other.to_string()),
        },
    }
}

//! Search, including fan-out across targets
//!
//! A one-level or subtree search that spans several targets is split into
//! per-target legs which run concurrently. Replies are merged in
//! configuration order so that when two targets return the same client DN
//! the first-declared target's entry is the one the client sees.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dn::Dn;
use crate::error::{ProxyError, Result};
use crate::filter::Filter;
use crate::protocol::{Entry, LdapResult, OperationKind, ResultCode, Scope, SearchRequest};
use crate::proxy::DirectoryProxy;
use crate::session::{Attempt, ClientSession, PendingOperation};
use crate::sink::ResultSink;
use crate::target::Target;
use crate::types::TargetId;

use super::{UpstreamReply, UpstreamRequest};

/// What one target contributed
#[derive(Debug)]
struct TargetSearch {
    entries: Vec<Entry>,
    referrals: Vec<String>,
    results: Vec<LdapResult>,
    exchanges: Vec<(Option<i32>, Attempt)>,
}

/// Base and scope to send to `target` for a client search at `base`
///
/// A target holding the base gets the search as asked. Otherwise the search
/// is re-rooted at each of the target's contexts that falls inside the
/// searched region.
fn legs(target: &Target, base: &Dn, scope: Scope) -> Vec<(Dn, Scope)> {
    if target.holds(base) {
        return vec![(base.clone(), scope)];
    }
    let legs: Vec<(Dn, Scope)> = target
        .naming_contexts()
        .iter()
        .filter_map(|ctx| match scope {
            Scope::Subtree if ctx.is_descendant_of(base) => Some((ctx.clone(), Scope::Subtree)),
            Scope::OneLevel if ctx.is_child_of(base) => Some((ctx.clone(), Scope::Base)),
            _ => None,
        })
        .collect();
    if legs.is_empty() {
        vec![(base.clone(), scope)]
    } else {
        legs
    }
}

/// Case- and spacing-insensitive key for duplicate suppression
fn dedup_key(entry: &Entry) -> String {
    Dn::parse(&entry.dn).map_or_else(|_| entry.dn.to_ascii_lowercase(), |dn| dn.normalized())
}

/// Failures that end the whole search instead of skipping one target
fn is_fatal(err: &ProxyError) -> bool {
    matches!(err, ProxyError::Cancelled | ProxyError::Internal(_))
}

impl DirectoryProxy {
    /// Relay a search, streaming entries to `sink` before the final result
    pub async fn search(
        &self,
        session: &ClientSession,
        request: SearchRequest,
        sink: &dyn ResultSink,
    ) -> Option<LdapResult> {
        let mut pending = PendingOperation::new(session.next_message_id(), OperationKind::Search);
        let outcome = self.relay_search(session, &request, sink, &mut pending).await;
        self.finish(session, sink, &pending, outcome).await
    }

    async fn relay_search(
        &self,
        session: &ClientSession,
        request: &SearchRequest,
        sink: &dyn ResultSink,
        pending: &mut PendingOperation,
    ) -> Result<LdapResult> {
        Filter::parse(&request.filter)?;
        let base = Dn::parse(&request.base)?;
        let targets = self.selector.select_targets(&base, request.scope)?;
        for target in &targets {
            pending.contact(target.id());
        }

        let searches = targets
            .iter()
            .map(|target| self.search_target(session, target, &base, request));
        let replies: Vec<(TargetId, Result<TargetSearch>)> = futures::future::join_all(searches)
            .await
            .into_iter()
            .zip(targets.iter().map(|t| t.id()))
            .map(|(reply, id)| (id, reply))
            .collect();

        self.merge(session, request, sink, pending, replies).await
    }

    async fn search_target(
        &self,
        session: &ClientSession,
        target: &Arc<Target>,
        base: &Dn,
        request: &SearchRequest,
    ) -> Result<TargetSearch> {
        let mut reply = TargetSearch {
            entries: Vec::new(),
            referrals: Vec::new(),
            results: Vec::new(),
            exchanges: Vec::new(),
        };

        for (leg_base, leg_scope) in legs(target, base, request.scope) {
            let exchange = self
                .exchange(session, target, |rewrite| {
                    let mut rewritten = request.clone();
                    rewritten.base = self.engine.to_upstream(rewrite, &leg_base)?.to_string();
                    rewritten.scope = leg_scope;
                    rewritten.filter = self.engine.filter_to_upstream(rewrite, &request.filter)?;
                    Ok(UpstreamRequest::Search(rewritten))
                })
                .await?;
            reply.exchanges.push((exchange.upstream_id, exchange.attempt));

            let UpstreamReply::Search(outcome) = exchange.reply else {
                return Err(ProxyError::Internal(
                    "non-search reply to a search request".to_string(),
                ));
            };
            let rewrite = exchange.conn.rewrite();
            reply.entries.extend(
                outcome
                    .entries
                    .into_iter()
                    .map(|entry| self.engine.entry_to_client(rewrite, entry)),
            );
            reply.referrals.extend(outcome.referrals);
            reply.results.push(self.client_result(rewrite, outcome.result));
        }
        Ok(reply)
    }

    async fn merge(
        &self,
        session: &ClientSession,
        request: &SearchRequest,
        sink: &dyn ResultSink,
        pending: &mut PendingOperation,
        replies: Vec<(TargetId, Result<TargetSearch>)>,
    ) -> Result<LdapResult> {
        let mut seen = HashSet::new();
        let mut sent = 0usize;
        let mut exceeded = false;
        let mut first_error = None;
        let mut results = Vec::new();
        let mut referrals = Vec::new();

        for (target, reply) in replies {
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    warn!(target = %target, error = %e, "skipping target in search fan-out");
                    pending.record_outcome(target, e.result_code());
                    first_error.get_or_insert(e);
                    continue;
                }
            };

            for (upstream_id, attempt) in reply.exchanges {
                pending.record_exchange(target, upstream_id, attempt);
            }
            let mut delivered = 0;
            for entry in reply.entries {
                if !seen.insert(dedup_key(&entry)) {
                    continue;
                }
                if request.size_limit > 0 && sent >= request.size_limit {
                    exceeded = true;
                    break;
                }
                sink.send_entry(session, entry).await;
                sent += 1;
                delivered += 1;
            }
            pending.record_entries(target, delivered);

            if let Some(result) = reply.results.first() {
                pending.record_outcome(target, result.code);
            }
            results.extend(reply.results);
            referrals.extend(reply.referrals);
        }

        if results.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                ProxyError::Internal("search fan-out produced no reply".to_string())
            }));
        }
        debug!(entries = sent, targets = pending.targets().len(), "search merged");

        let mut result = if exceeded {
            LdapResult::new(ResultCode::SizeLimitExceeded, "")
        } else if let Some(limited) = results
            .iter()
            .find(|r| r.code == ResultCode::SizeLimitExceeded)
        {
            limited.clone()
        } else if let Some(success) = results.iter().find(|r| r.is_success()) {
            success.clone()
        } else {
            results.swap_remove(0)
        };
        if result.is_success() {
            result.referrals.extend(referrals);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn target(contexts: &[&str]) -> Target {
        let mut builder = TargetConfig::builder("t", "ldap://t");
        for ctx in contexts {
            builder = builder.naming_context(*ctx);
        }
        Target::from_config(TargetId::from_index(0), &builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_holder_gets_search_as_asked() {
        let t = target(&["dc=example,dc=com"]);
        let base = dn("ou=people,dc=example,dc=com");
        assert_eq!(legs(&t, &base, Scope::OneLevel), vec![(base.clone(), Scope::OneLevel)]);
    }

    #[test]
    fn test_subtree_rerooted_at_contexts() {
        let t = target(&["ou=people,dc=example,dc=com", "ou=x,ou=deep,dc=example,dc=com"]);
        let legs = legs(&t, &dn("dc=example,dc=com"), Scope::Subtree);
        assert_eq!(
            legs,
            vec![
                (dn("ou=people,dc=example,dc=com"), Scope::Subtree),
                (dn("ou=x,ou=deep,dc=example,dc=com"), Scope::Subtree),
            ]
        );
    }

    #[test]
    fn test_one_level_reads_child_context_entry() {
        let t = target(&["ou=people,dc=example,dc=com", "ou=x,ou=deep,dc=example,dc=com"]);
        let legs = legs(&t, &dn("dc=example,dc=com"), Scope::OneLevel);
        assert_eq!(legs, vec![(dn("ou=people,dc=example,dc=com"), Scope::Base)]);
    }

    #[test]
    fn test_dedup_key_ignores_case() {
        let a = Entry::new("CN=Admins,OU=Groups,DC=example,DC=com", Vec::new());
        let b = Entry::new("cn=admins,ou=groups,dc=example,dc=com", Vec::new());
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }
}

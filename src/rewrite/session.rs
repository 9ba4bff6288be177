//! Per-connection rewrite state

use crate::dn::Dn;
use crate::rewrite::rules::{SuffixMapping, passthrough_contexts};
use crate::target::Target;

/// Rule set used by one connection to one target
///
/// Holds the target's static mappings plus any mapping learned when the
/// connection was established. Never changes after construction.
#[derive(Debug, Clone)]
pub struct RewriteSession {
    target: String,
    /// Sorted deepest client suffix first
    mappings: Vec<SuffixMapping>,
    /// Contexts the target serves under the same name
    passthrough: Vec<Dn>,
}

impl RewriteSession {
    /// Build the session for `target`, adding `learned` mappings
    ///
    /// A learned mapping replaces passthrough for its client context.
    #[must_use]
    pub fn for_target(target: &Target, learned: Vec<SuffixMapping>) -> Self {
        let mut mappings: Vec<SuffixMapping> = target
            .suffix_mappings()
            .iter()
            .cloned()
            .chain(learned)
            .filter(|m| !m.is_identity())
            .collect();
        mappings.sort_by(|a, b| b.client.depth().cmp(&a.client.depth()));

        let passthrough = passthrough_contexts(target.naming_contexts(), &mappings);

        Self {
            target: target.name().to_string(),
            mappings,
            passthrough,
        }
    }

    #[must_use]
    pub fn target_name(&self) -> &str {
        &self.target
    }

    #[must_use]
    pub fn mappings(&self) -> &[SuffixMapping] {
        &self.mappings
    }

    #[must_use]
    pub fn passthrough(&self) -> &[Dn] {
        &self.passthrough
    }

    /// Apply the first matching rule in client-to-upstream direction
    #[must_use]
    pub(crate) fn map_to_upstream(&self, dn: &Dn) -> Option<Dn> {
        self.mappings
            .iter()
            .find_map(|m| m.to_upstream(dn))
            .or_else(|| self.passthrough_match(dn))
    }

    /// Apply the first matching rule in upstream-to-client direction
    #[must_use]
    pub(crate) fn map_to_client(&self, dn: &Dn) -> Option<Dn> {
        let mut by_upstream: Vec<&SuffixMapping> = self.mappings.iter().collect();
        by_upstream.sort_by(|a, b| b.upstream.depth().cmp(&a.upstream.depth()));
        by_upstream
            .into_iter()
            .find_map(|m| m.to_client(dn))
            .or_else(|| self.passthrough_match(dn))
    }

    fn passthrough_match(&self, dn: &Dn) -> Option<Dn> {
        self.passthrough
            .iter()
            .any(|ctx| dn.is_within(ctx))
            .then(|| dn.clone())
    }
}

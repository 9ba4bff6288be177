//! Suffix mapping rules

use crate::dn::Dn;

/// Maps one client-visible suffix onto one upstream suffix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixMapping {
    pub client: Dn,
    pub upstream: Dn,
}

impl SuffixMapping {
    #[must_use]
    pub fn new(client: Dn, upstream: Dn) -> Self {
        Self { client, upstream }
    }

    /// Client DN to upstream DN, `None` when outside the client suffix
    #[must_use]
    pub fn to_upstream(&self, dn: &Dn) -> Option<Dn> {
        dn.replace_suffix(&self.client, &self.upstream)
    }

    /// Upstream DN to client DN, `None` when outside the upstream suffix
    #[must_use]
    pub fn to_client(&self, dn: &Dn) -> Option<Dn> {
        dn.replace_suffix(&self.upstream, &self.client)
    }

    /// Mapping that changes nothing
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.client == self.upstream
    }
}

impl std::fmt::Display for SuffixMapping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.client, self.upstream)
    }
}

/// Naming contexts a target serves under the same name upstream
///
/// Those whose client suffix no mapping renames.
#[must_use]
pub fn passthrough_contexts(contexts: &[Dn], mappings: &[SuffixMapping]) -> Vec<Dn> {
    contexts
        .iter()
        .filter(|ctx| !mappings.iter().any(|m| &m.client == *ctx))
        .cloned()
        .collect()
}

/// First mapping whose upstream suffix makes replies ambiguous, with the
/// suffix it collides with
///
/// An upstream DN must map back through exactly one rule: a mapping's
/// upstream suffix may not overlap a passthrough context, nor another
/// mapping's upstream suffix unless the outer mapping already sends the
/// inner upstream suffix to the inner client suffix.
#[must_use]
pub fn upstream_overlap<'a>(
    mappings: &'a [SuffixMapping],
    passthrough: &'a [Dn],
) -> Option<(&'a SuffixMapping, &'a Dn)> {
    fn overlaps(a: &Dn, b: &Dn) -> bool {
        a.is_within(b) || b.is_within(a)
    }

    for (i, mapping) in mappings.iter().enumerate() {
        if let Some(ctx) = passthrough.iter().find(|ctx| overlaps(&mapping.upstream, ctx)) {
            return Some((mapping, ctx));
        }
        for other in &mappings[i + 1..] {
            if mapping == other || !overlaps(&mapping.upstream, &other.upstream) {
                continue;
            }
            let consistent = mapping.to_client(&other.upstream).as_ref() == Some(&other.client)
                || other.to_client(&mapping.upstream).as_ref() == Some(&mapping.client);
            if !consistent {
                return Some((mapping, &other.upstream));
            }
        }
    }
    None
}

/// Describe the first ambiguity among a target's contexts and mappings
///
/// Identity mappings are ignored, as the rewrite session drops them.
#[must_use]
pub fn ambiguous_rule(contexts: &[Dn], mappings: &[SuffixMapping]) -> Option<String> {
    let effective: Vec<SuffixMapping> = mappings
        .iter()
        .filter(|m| !m.is_identity())
        .cloned()
        .collect();
    let passthrough = passthrough_contexts(contexts, &effective);
    upstream_overlap(&effective, &passthrough)
        .map(|(mapping, with)| format!("mapping {mapping} overlaps upstream suffix {with}"))
}

//! Candidate target selection
//!
//! Decides which upstream targets an operation touches, based purely on the
//! naming contexts each target claims.
//!
//! # Overview
//!
//! - Object-scope operations go to exactly one target: the first one in
//!   configuration order whose context contains the DN.
//! - One-level and subtree searches fan out to every target whose context
//!   overlaps the searched region.
//! - A DN no target claims is refused before any upstream is contacted,
//!   even when only one target is configured.
//!
//! # Usage
//!
//! ```
//! use ldap_proxy::config::TargetConfig;
//! use ldap_proxy::dn::Dn;
//! use ldap_proxy::protocol::Scope;
//! use ldap_proxy::router::CandidateSelector;
//! use ldap_proxy::target::{Target, TargetRegistry};
//! use ldap_proxy::types::TargetId;
//!
//! let people = TargetConfig::builder("people", "ldap://10.0.0.1")
//!     .naming_context("ou=people,dc=example,dc=com")
//!     .build()
//!     .unwrap();
//! let groups = TargetConfig::builder("groups", "ldap://10.0.0.2")
//!     .naming_context("ou=groups,dc=example,dc=com")
//!     .build()
//!     .unwrap();
//! let registry = TargetRegistry::new(vec![
//!     Target::from_config(TargetId::from_index(0), &people).unwrap(),
//!     Target::from_config(TargetId::from_index(1), &groups).unwrap(),
//! ]);
//! let selector = CandidateSelector::new(registry);
//!
//! let root = Dn::parse("dc=example,dc=com").unwrap();
//! let targets = selector.select_targets(&root, Scope::Subtree).unwrap();
//! assert_eq!(targets.len(), 2);
//! ```

use std::sync::Arc;
use tracing::trace;

use crate::dn::Dn;
use crate::error::{ProxyError, Result};
use crate::protocol::Scope;
use crate::target::{Target, TargetRegistry};

/// Maps request DNs to the targets responsible for them
#[derive(Debug, Clone)]
pub struct CandidateSelector {
    registry: TargetRegistry,
}

impl CandidateSelector {
    #[must_use]
    pub fn new(registry: TargetRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Targets in play for an operation at `dn` with `scope`, in
    /// configuration order
    ///
    /// # Errors
    ///
    /// `NoSuchObject` when no target claims any part of the region.
    pub fn select_targets(&self, dn: &Dn, scope: Scope) -> Result<Vec<Arc<Target>>> {
        if scope == Scope::Base {
            return self.select_one(dn).map(|target| vec![target]);
        }
        let candidates: Vec<Arc<Target>> = self
            .registry
            .iter()
            .filter(|target| {
                target.naming_contexts().iter().any(|ctx| match scope {
                    Scope::Base => dn.is_within(ctx),
                    Scope::OneLevel => dn.is_within(ctx) || ctx.is_child_of(dn),
                    Scope::Subtree => dn.is_within(ctx) || ctx.is_descendant_of(dn),
                })
            })
            .cloned()
            .collect();

        trace!(dn = %dn, ?scope, count = candidates.len(), "selected candidates");
        if candidates.is_empty() {
            return Err(ProxyError::NoSuchObject { dn: dn.to_string() });
        }
        Ok(candidates)
    }

    /// The one target an object-scope operation at `dn` goes to
    ///
    /// The first declared target whose context contains `dn` wins.
    pub fn select_one(&self, dn: &Dn) -> Result<Arc<Target>> {
        self.registry
            .iter()
            .find(|target| target.holds(dn))
            .cloned()
            .ok_or_else(|| ProxyError::NoSuchObject { dn: dn.to_string() })
    }

    /// Check that renaming an entry held by `target` under `new_superior`
    /// stays on that target
    ///
    /// # Errors
    ///
    /// `AffectsMultipleDsas` when the new parent belongs to another target,
    /// `NoSuchObject` when it belongs to none.
    pub fn target_for_new_superior(
        &self,
        target: &Target,
        dn: &Dn,
        new_superior: &Dn,
    ) -> Result<()> {
        let owner = self.select_one(new_superior)?;
        if owner.id() != target.id() {
            return Err(ProxyError::AffectsMultipleDsas {
                dn: dn.to_string(),
                new_superior: new_superior.to_string(),
            });
        }
        Ok(())
    }
}

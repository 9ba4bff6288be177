//! Configuration validation
//!
//! This module provides validation logic for the configuration to ensure
//! all settings are valid before the proxy starts.

use anyhow::{Result, bail};
use std::collections::HashSet;

use super::types::{Config, CredentialPolicyKind, TargetConfig};
use crate::dn::Dn;
use crate::protocol::ProtocolVersion;
use crate::rewrite::SuffixMapping;
use crate::rewrite::rules::ambiguous_rule;

impl Config {
    /// Validate configuration for correctness
    ///
    /// Names and pool sizes are enforced by their types. This checks the
    /// remaining semantic constraints:
    /// - At least one target configured, with unique names
    /// - Every target claims at least one parseable naming context
    /// - Every upstream DN maps back through exactly one rewrite rule
    /// - Service credentials present for assert/fixed policies
    pub fn validate(&self) -> Result<()> {
        if self.targets.is_empty() {
            bail!("Configuration must have at least one target");
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            if !names.insert(target.name.as_str()) {
                bail!("Duplicate target name '{}'", target.name);
            }
            validate_target(target)?;
        }

        if let (Some(idle), Some(ttl)) = (self.proxy.idle_timeout, self.proxy.conn_ttl)
            && idle > ttl
        {
            tracing::warn!(
                "idle_timeout ({:?}) exceeds conn_ttl ({:?}); connections will hit the TTL first",
                idle,
                ttl
            );
        }

        Ok(())
    }
}

/// Validate a single target configuration
fn validate_target(target: &TargetConfig) -> Result<()> {
    let name = &target.name;

    if !(target.url.starts_with("ldap://")
        || target.url.starts_with("ldaps://")
        || target.url.starts_with("ldapi://"))
    {
        bail!("Target '{name}': url {:?} is not an ldap URL", target.url);
    }

    if target.naming_contexts.is_empty() {
        bail!("Target '{name}' must claim at least one naming context");
    }
    let mut contexts = Vec::with_capacity(target.naming_contexts.len());
    for context in &target.naming_contexts {
        match Dn::parse(context) {
            Ok(dn) => contexts.push(dn),
            Err(e) => bail!("Target '{name}': invalid naming context {context:?}: {e}"),
        }
    }

    let mut mappings = Vec::new();
    if let Some(suffix) = &target.upstream_suffix {
        if contexts.len() != 1 {
            bail!("Target '{name}': upstream_suffix requires exactly one naming context");
        }
        match Dn::parse(suffix) {
            Ok(upstream) => mappings.push(SuffixMapping::new(contexts[0].clone(), upstream)),
            Err(e) => bail!("Target '{name}': invalid upstream_suffix {suffix:?}: {e}"),
        }
    }

    for massage in &target.suffix_massage {
        let client = Dn::parse(&massage.client);
        let upstream = Dn::parse(&massage.upstream);
        match (client, upstream) {
            (Ok(client), Ok(upstream)) => {
                if !contexts.iter().any(|ctx| client.is_within(ctx)) {
                    bail!(
                        "Target '{name}': suffix_massage client {:?} is outside its naming contexts",
                        massage.client
                    );
                }
                mappings.push(SuffixMapping::new(client, upstream));
            }
            (Err(e), _) | (_, Err(e)) => {
                bail!("Target '{name}': invalid suffix_massage entry: {e}");
            }
        }
    }

    if let Some(conflict) = ambiguous_rule(&contexts, &mappings) {
        bail!("Target '{name}': {conflict}; replies could not be mapped back unambiguously");
    }

    if ProtocolVersion::from_u8(target.protocol_version).is_none() {
        bail!(
            "Target '{name}': protocol_version must be 2 or 3, got {}",
            target.protocol_version
        );
    }

    match target.credential_policy {
        CredentialPolicyKind::Forward => {}
        policy => match &target.bind_dn {
            None => bail!("Target '{name}': credential_policy '{policy}' requires bind_dn"),
            Some(dn) => {
                if let Err(e) = Dn::parse(dn) {
                    bail!("Target '{name}': invalid bind_dn {dn:?}: {e}");
                }
                if target.bind_password.as_deref().unwrap_or_default().is_empty() {
                    tracing::warn!(
                        "Target '{}' uses credential_policy '{}' with an empty bind_password",
                        name,
                        policy
                    );
                }
            }
        },
    }

    Ok(())
}

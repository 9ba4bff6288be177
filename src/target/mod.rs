//! Upstream target descriptors
//!
//! A [`Target`] is built once from its configuration and never changes. The
//! [`TargetRegistry`] holds all of them in configuration order, which is the
//! order candidate selection and fan-out merging follow.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, CredentialPolicyKind, TargetConfig};
use crate::constants::timeout::{BIND_TIMEOUT, OPERATION_TIMEOUT, SEARCH_TIMEOUT};
use crate::dn::Dn;
use crate::protocol::{OperationKind, ProtocolVersion};
use crate::rewrite::SuffixMapping;
use crate::rewrite::rules::ambiguous_rule;
use crate::types::{TargetId, TargetName, option_duration_serde};

/// Service identity the proxy binds as
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceCredentials {
    pub bind_dn: Dn,
    pub password: String,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("bind_dn", &self.bind_dn.to_string())
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the proxy authenticates upstream on behalf of a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Bind upstream with the client's own DN and password
    Forward,
    /// Bind as the service identity and assert the client with the
    /// proxied-authorization control on every request
    AssertIdentity(ServiceCredentials),
    /// Bind as the service identity; the client identity is not relayed
    Fixed(ServiceCredentials),
}

impl CredentialPolicy {
    #[must_use]
    pub fn service(&self) -> Option<&ServiceCredentials> {
        match self {
            Self::Forward => None,
            Self::AssertIdentity(service) | Self::Fixed(service) => Some(service),
        }
    }

    #[must_use]
    pub const fn asserts_identity(&self) -> bool {
        matches!(self, Self::AssertIdentity(_))
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::AssertIdentity(_) => "assert",
            Self::Fixed(_) => "fixed",
        }
    }
}

/// Per-operation-kind timeouts, unset entries fall back to the defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationTimeouts {
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub bind: Option<Duration>,
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub search: Option<Duration>,
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub compare: Option<Duration>,
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub modify: Option<Duration>,
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub add: Option<Duration>,
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Duration>,
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub modify_dn: Option<Duration>,
}

impl OperationTimeouts {
    #[must_use]
    pub fn get(&self, kind: OperationKind) -> Duration {
        let configured = match kind {
            OperationKind::Bind => self.bind,
            OperationKind::Search => self.search,
            OperationKind::Compare => self.compare,
            OperationKind::Modify => self.modify,
            OperationKind::Add => self.add,
            OperationKind::Delete => self.delete,
            OperationKind::ModifyDn => self.modify_dn,
            OperationKind::Unbind => None,
        };
        configured.unwrap_or(match kind {
            OperationKind::Bind => BIND_TIMEOUT,
            OperationKind::Search => SEARCH_TIMEOUT,
            _ => OPERATION_TIMEOUT,
        })
    }

    pub fn set(&mut self, kind: OperationKind, timeout: Duration) {
        let slot = match kind {
            OperationKind::Bind => &mut self.bind,
            OperationKind::Search => &mut self.search,
            OperationKind::Compare => &mut self.compare,
            OperationKind::Modify => &mut self.modify,
            OperationKind::Add => &mut self.add,
            OperationKind::Delete => &mut self.delete,
            OperationKind::ModifyDn => &mut self.modify_dn,
            OperationKind::Unbind => return,
        };
        *slot = Some(timeout);
    }
}

/// Immutable description of one upstream directory server
#[derive(Debug)]
pub struct Target {
    id: TargetId,
    name: TargetName,
    url: String,
    naming_contexts: Vec<Dn>,
    suffix_mappings: Vec<SuffixMapping>,
    protocol_version: ProtocolVersion,
    credential_policy: CredentialPolicy,
    discover_naming_context: bool,
    connect_timeout: Duration,
    timeouts: OperationTimeouts,
}

impl Target {
    /// Build a target from its configuration
    ///
    /// # Errors
    ///
    /// Fails when a DN does not parse, the protocol version is not 2 or 3, or
    /// a service credential is missing.
    pub fn from_config(id: TargetId, config: &TargetConfig) -> Result<Self> {
        let name = config.name.clone();
        let naming_contexts = config
            .naming_contexts
            .iter()
            .map(|ctx| {
                Dn::parse(ctx).with_context(|| format!("target '{name}': naming context {ctx:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut suffix_mappings = Vec::new();
        if let Some(upstream) = &config.upstream_suffix {
            let client = naming_contexts.first().cloned().with_context(|| {
                format!("target '{name}': upstream_suffix needs a naming context")
            })?;
            let upstream = Dn::parse(upstream)
                .with_context(|| format!("target '{name}': upstream_suffix {upstream:?}"))?;
            suffix_mappings.push(SuffixMapping::new(client, upstream));
        }
        for massage in &config.suffix_massage {
            let client = Dn::parse(&massage.client)
                .with_context(|| format!("target '{name}': suffix_massage client {:?}", massage.client))?;
            let upstream = Dn::parse(&massage.upstream).with_context(|| {
                format!("target '{name}': suffix_massage upstream {:?}", massage.upstream)
            })?;
            suffix_mappings.push(SuffixMapping::new(client, upstream));
        }

        if let Some(conflict) = ambiguous_rule(&naming_contexts, &suffix_mappings) {
            anyhow::bail!("target '{name}': {conflict}");
        }

        let protocol_version = ProtocolVersion::from_u8(config.protocol_version).with_context(
            || {
                format!(
                    "target '{name}': unsupported protocol_version {}",
                    config.protocol_version
                )
            },
        )?;

        let credential_policy = match config.credential_policy {
            CredentialPolicyKind::Forward => CredentialPolicy::Forward,
            kind => {
                let bind_dn = config
                    .bind_dn
                    .as_deref()
                    .with_context(|| format!("target '{name}': {kind} policy requires bind_dn"))?;
                let service = ServiceCredentials {
                    bind_dn: Dn::parse(bind_dn)
                        .with_context(|| format!("target '{name}': bind_dn {bind_dn:?}"))?,
                    password: config.bind_password.clone().unwrap_or_default(),
                };
                if kind == CredentialPolicyKind::Assert {
                    CredentialPolicy::AssertIdentity(service)
                } else {
                    CredentialPolicy::Fixed(service)
                }
            }
        };

        Ok(Self {
            id,
            name,
            url: config.url.clone(),
            naming_contexts,
            suffix_mappings,
            protocol_version,
            credential_policy,
            discover_naming_context: config.discover_naming_context,
            connect_timeout: config.connect_timeout,
            timeouts: config.timeouts,
        })
    }

    #[must_use]
    #[inline]
    pub fn id(&self) -> TargetId {
        self.id
    }

    #[must_use]
    #[inline]
    pub fn name(&self) -> &TargetName {
        &self.name
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Client-visible naming contexts
    #[must_use]
    pub fn naming_contexts(&self) -> &[Dn] {
        &self.naming_contexts
    }

    #[must_use]
    pub fn suffix_mappings(&self) -> &[SuffixMapping] {
        &self.suffix_mappings
    }

    /// Highest protocol version the target speaks
    #[must_use]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    #[must_use]
    pub fn credential_policy(&self) -> &CredentialPolicy {
        &self.credential_policy
    }

    #[must_use]
    pub fn discover_naming_context(&self) -> bool {
        self.discover_naming_context
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn timeout(&self, kind: OperationKind) -> Duration {
        self.timeouts.get(kind)
    }

    /// True when one of the naming contexts equals or is an ancestor of `dn`
    #[must_use]
    pub fn holds(&self, dn: &Dn) -> bool {
        self.naming_contexts.iter().any(|ctx| dn.is_within(ctx))
    }

    /// Naming context that contains `dn`, deepest first
    #[must_use]
    pub fn context_for(&self, dn: &Dn) -> Option<&Dn> {
        self.naming_contexts
            .iter()
            .filter(|ctx| dn.is_within(ctx))
            .max_by_key(|ctx| ctx.depth())
    }
}

/// All configured targets in configuration order
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Arc<[Arc<Target>]>,
}

impl TargetRegistry {
    #[must_use]
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: targets.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build every target in `config`
    ///
    /// # Errors
    ///
    /// Fails on the first target that does not convert.
    pub fn from_config(config: &Config) -> Result<Self> {
        let targets = config
            .targets
            .iter()
            .enumerate()
            .map(|(index, target)| Target::from_config(TargetId::from_index(index), target))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(targets))
    }

    #[must_use]
    pub fn get(&self, id: TargetId) -> Option<&Arc<Target>> {
        self.targets.get(id.as_index())
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Arc<Target>> {
        self.targets.iter().find(|t| t.name().as_str() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Target>> {
        self.targets.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

//! Configuration type definitions
//!
//! This module contains all the core configuration structures used by the proxy.

use crate::target::OperationTimeouts;
use crate::types::{MaxPoolSize, TargetName, duration_serde, option_duration_serde};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main proxy configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    /// Pool and rewrite settings
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Upstream directory servers, in selection order
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Proxy-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Maximum distinct (identity, target) connections
    pub max_pool_size: MaxPoolSize,
    /// Retire connections idle longer than this
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<Duration>,
    /// Retire connections older than this
    #[serde(with = "option_duration_serde", skip_serializing_if = "Option::is_none")]
    pub conn_ttl: Option<Duration>,
    /// Attribute types treated as DN-valued in addition to the standard set
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema_dn_attributes: Vec<String>,
}

/// How a target authenticates proxied operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialPolicyKind {
    /// Relay the client's bind credentials
    #[default]
    Forward,
    /// Bind as the service identity and assert the client per request
    Assert,
    /// Bind as the service identity only
    Fixed,
}

impl CredentialPolicyKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Assert => "assert",
            Self::Fixed => "fixed",
        }
    }
}

impl std::fmt::Display for CredentialPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit client suffix to upstream suffix mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuffixMassageConfig {
    pub client: String,
    pub upstream: String,
}

/// Configuration for a single upstream target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    pub name: TargetName,
    /// `ldap://host:port` or `ldaps://host:port`
    pub url: String,
    /// Client-visible contexts this target is authoritative for
    pub naming_contexts: Vec<String>,
    /// Shorthand mapping the first naming context onto this upstream suffix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suffix_massage: Vec<SuffixMassageConfig>,
    #[serde(default = "super::defaults::protocol_version")]
    pub protocol_version: u8,
    #[serde(default)]
    pub credential_policy: CredentialPolicyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_dn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,
    /// Learn the upstream suffix from the root DSE at connect time
    #[serde(default)]
    pub discover_naming_context: bool,
    #[serde(
        with = "duration_serde",
        default = "super::defaults::connect_timeout"
    )]
    pub connect_timeout: Duration,
    #[serde(default)]
    pub timeouts: OperationTimeouts,
}

/// Builder for constructing `TargetConfig` instances
///
/// # Examples
///
/// ```
/// use ldap_proxy::config::{CredentialPolicyKind, TargetConfig};
///
/// let config = TargetConfig::builder("people", "ldap://10.0.0.1:389")
///     .naming_context("ou=people,dc=example,dc=com")
///     .upstream_suffix("ou=staff,o=corp")
///     .credential_policy(CredentialPolicyKind::Assert)
///     .service_credentials("cn=proxy,o=corp", "secret")
///     .build()
///     .unwrap();
/// assert_eq!(config.naming_contexts.len(), 1);
/// ```
pub struct TargetConfigBuilder {
    name: String,
    url: String,
    naming_contexts: Vec<String>,
    upstream_suffix: Option<String>,
    suffix_massage: Vec<SuffixMassageConfig>,
    protocol_version: u8,
    credential_policy: CredentialPolicyKind,
    bind_dn: Option<String>,
    bind_password: Option<String>,
    discover_naming_context: bool,
    connect_timeout: Duration,
    timeouts: OperationTimeouts,
}

impl TargetConfigBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            naming_contexts: Vec::new(),
            upstream_suffix: None,
            suffix_massage: Vec::new(),
            protocol_version: super::defaults::protocol_version(),
            credential_policy: CredentialPolicyKind::default(),
            bind_dn: None,
            bind_password: None,
            discover_naming_context: false,
            connect_timeout: super::defaults::connect_timeout(),
            timeouts: OperationTimeouts::default(),
        }
    }

    #[must_use]
    pub fn naming_context(mut self, context: impl Into<String>) -> Self {
        self.naming_contexts.push(context.into());
        self
    }

    #[must_use]
    pub fn upstream_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.upstream_suffix = Some(suffix.into());
        self
    }

    #[must_use]
    pub fn suffix_mapping(mut self, client: impl Into<String>, upstream: impl Into<String>) -> Self {
        self.suffix_massage.push(SuffixMassageConfig {
            client: client.into(),
            upstream: upstream.into(),
        });
        self
    }

    #[must_use]
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub fn credential_policy(mut self, policy: CredentialPolicyKind) -> Self {
        self.credential_policy = policy;
        self
    }

    #[must_use]
    pub fn service_credentials(
        mut self,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.bind_dn = Some(bind_dn.into());
        self.bind_password = Some(password.into());
        self
    }

    #[must_use]
    pub fn discover_naming_context(mut self, enabled: bool) -> Self {
        self.discover_naming_context = enabled;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn timeouts(mut self, timeouts: OperationTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the TargetConfig
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or invalid.
    pub fn build(self) -> Result<TargetConfig, anyhow::Error> {
        Ok(TargetConfig {
            name: TargetName::new(self.name)?,
            url: self.url,
            naming_contexts: self.naming_contexts,
            upstream_suffix: self.upstream_suffix,
            suffix_massage: self.suffix_massage,
            protocol_version: self.protocol_version,
            credential_policy: self.credential_policy,
            bind_dn: self.bind_dn,
            bind_password: self.bind_password,
            discover_naming_context: self.discover_naming_context,
            connect_timeout: self.connect_timeout,
            timeouts: self.timeouts,
        })
    }
}

impl TargetConfig {
    /// Create a builder for constructing a TargetConfig
    #[must_use]
    pub fn builder(name: impl Into<String>, url: impl Into<String>) -> TargetConfigBuilder {
        TargetConfigBuilder::new(name, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_target() {
        let toml = r#"
            [proxy]
            max_pool_size = 8
            idle_timeout = 300
            schema_dn_attributes = ["x-sponsor"]

            [[targets]]
            name = "people"
            url = "ldap://10.0.0.1:389"
            naming_contexts = ["ou=people,dc=example,dc=com"]
            upstream_suffix = "ou=staff,o=corp"
            protocol_version = 2
            credential_policy = "assert"
            bind_dn = "cn=proxy,o=corp"
            bind_password = "secret"
            connect_timeout = 3

            [targets.timeouts]
            search = 12
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.proxy.max_pool_size.get(), 8);
        assert_eq!(config.proxy.idle_timeout, Some(Duration::from_secs(300)));
        assert!(config.proxy.conn_ttl.is_none());

        let target = &config.targets[0];
        assert_eq!(target.name.as_str(), "people");
        assert_eq!(target.protocol_version, 2);
        assert_eq!(target.credential_policy, CredentialPolicyKind::Assert);
        assert_eq!(target.connect_timeout, Duration::from_secs(3));
        assert_eq!(target.timeouts.search, Some(Duration::from_secs(12)));
        assert!(target.timeouts.bind.is_none());
    }

    #[test]
    fn test_defaults_applied() {
        let toml = r#"
            [[targets]]
            name = "people"
            url = "ldap://10.0.0.1:389"
            naming_contexts = ["dc=example,dc=com"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        let target = &config.targets[0];
        assert_eq!(target.protocol_version, 3);
        assert_eq!(target.credential_policy, CredentialPolicyKind::Forward);
        assert!(!target.discover_naming_context);
        assert_eq!(config.proxy.max_pool_size, MaxPoolSize::default());
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let toml = r#"
            [[targets]]
            name = "people"
            url = "ldap://10.0.0.1:389"
            naming_contexts = ["dc=example,dc=com"]
            credential_policy = "sasl"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let toml = "[proxy]\nmax_pool_size = 0\n";
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        assert!(TargetConfig::builder("", "ldap://x").build().is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = Config {
            targets: vec![
                TargetConfig::builder("people", "ldap://10.0.0.1:389")
                    .naming_context("dc=example,dc=com")
                    .build()
                    .unwrap(),
            ],
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}

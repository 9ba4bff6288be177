//! Configuration loading from files and environment variables
//!
//! This module handles loading configuration from TOML files and environment variables,
//! with environment variables taking precedence for container deployments.

use anyhow::{Context, Result};
use std::path::Path;

use super::types::{Config, ProxyConfig, TargetConfig};
use crate::constants::env::TARGET_PREFIX;
use crate::types::TargetName;

/// Apply indexed target overrides
///
/// Supports indexed environment variables:
/// - `LDAP_PROXY_TARGET_0_URL`, `LDAP_PROXY_TARGET_0_NAME`, `LDAP_PROXY_TARGET_0_CONTEXT`
/// - `LDAP_PROXY_TARGET_1_URL`, ...
///
/// An index that matches a configured target overrides its fields; the next
/// index past the end appends a new target, which then needs both `URL` and
/// `CONTEXT`. Scanning stops at the first index with no `URL`.
fn apply_target_overrides<F>(config: &mut Config, lookup: F) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = 0;

    for index in 0.. {
        let key = |field: &str| format!("{TARGET_PREFIX}{index}_{field}");
        let Some(url) = lookup(&key("URL")) else {
            break;
        };
        let name = lookup(&key("NAME"));
        let context = lookup(&key("CONTEXT"));

        match config.targets.get_mut(index) {
            Some(target) => {
                target.url = url;
                if let Some(name) = name {
                    target.name = name.try_into()?;
                }
                if let Some(context) = context {
                    target.naming_contexts = vec![context];
                }
            }
            None => {
                let context = context
                    .with_context(|| format!("{} is required for a new target", key("CONTEXT")))?;
                let target = TargetConfig::builder(
                    name.unwrap_or_else(|| format!("target-{index}")),
                    url,
                )
                .naming_context(context)
                .build()?;
                config.targets.push(target);
            }
        }
        applied += 1;
    }

    Ok(applied)
}

/// Load configuration from a TOML file, with environment variable overrides
///
/// The result has been validated.
pub fn load_config(config_path: impl AsRef<Path>) -> Result<Config> {
    let config_path = config_path.as_ref();
    let config_content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config file '{}'", config_path.display()))?;

    let mut config: Config = toml::from_str(&config_content)
        .with_context(|| format!("Failed to parse config file '{}'", config_path.display()))?;

    let overridden = apply_target_overrides(&mut config, |key| std::env::var(key).ok())?;
    if overridden > 0 {
        tracing::info!(
            "Applied {} target override(s) from environment variables",
            overridden
        );
    }

    config.validate()?;

    Ok(config)
}

/// Load the configuration, writing a default one first if the file is missing
pub fn load_config_or_create(config_path: impl AsRef<Path>) -> Result<Config> {
    let config_path = config_path.as_ref();
    if !config_path.exists() {
        let default = create_default_config();
        let text = toml::to_string_pretty(&default).context("Failed to serialize default config")?;
        std::fs::write(config_path, text).with_context(|| {
            format!(
                "Failed to write default config to '{}'",
                config_path.display()
            )
        })?;
        tracing::info!("Created default config file at {}", config_path.display());
    }
    load_config(config_path)
}

/// Create a default configuration for examples/testing
#[must_use]
pub fn create_default_config() -> Config {
    Config {
        proxy: ProxyConfig::default(),
        targets: vec![TargetConfig {
            name: TargetName::new("example".to_string()).expect("literal name is valid"),
            url: "ldap://ldap.example.com:389".to_string(),
            naming_contexts: vec!["dc=example,dc=com".to_string()],
            upstream_suffix: None,
            suffix_massage: Vec::new(),
            protocol_version: super::defaults::protocol_version(),
            credential_policy: Default::default(),
            bind_dn: None,
            bind_password: None,
            discover_naming_context: false,
            connect_timeout: super::defaults::connect_timeout(),
            timeouts: Default::default(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_override_existing_target() {
        let mut config = create_default_config();
        let applied = apply_target_overrides(
            &mut config,
            lookup(&[
                ("LDAP_PROXY_TARGET_0_URL", "ldap://override:389"),
                ("LDAP_PROXY_TARGET_0_CONTEXT", "o=override"),
            ]),
        )
        .unwrap();
        assert_eq!(applied, 1);
        assert_eq!(config.targets[0].url, "ldap://override:389");
        assert_eq!(config.targets[0].naming_contexts, vec!["o=override"]);
        assert_eq!(config.targets[0].name.as_str(), "example");
    }

    #[test]
    fn test_append_new_target() {
        let mut config = create_default_config();
        apply_target_overrides(
            &mut config,
            lookup(&[
                ("LDAP_PROXY_TARGET_0_URL", "ldap://a:389"),
                ("LDAP_PROXY_TARGET_1_URL", "ldap://b:389"),
                ("LDAP_PROXY_TARGET_1_CONTEXT", "ou=b,dc=example,dc=com"),
            ]),
        )
        .unwrap();
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[1].name.as_str(), "target-1");
    }

    #[test]
    fn test_new_target_without_context_fails() {
        let mut config = Config::default();
        let result = apply_target_overrides(
            &mut config,
            lookup(&[("LDAP_PROXY_TARGET_0_URL", "ldap://a:389")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[targets]]
name = "people"
url = "ldap://127.0.0.1:3389"
naming_contexts = ["ou=people,dc=example,dc=com"]
"#
        )
        .unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].url, "ldap://127.0.0.1:3389");
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/ldap-proxy.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = load_config_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.targets[0].name.as_str(), "example");
    }
}

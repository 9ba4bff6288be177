//! Builder pattern for constructing `DirectoryProxy` instances

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::pool::ConnectionPool;
use crate::rewrite::RewriteEngine;
use crate::router::CandidateSelector;
use crate::schema::{SchemaLookup, StaticSchema};
use crate::target::TargetRegistry;
use crate::upstream::{DirectoryConnector, LdapConnector};

use super::DirectoryProxy;

/// Builder for constructing a `DirectoryProxy` with optional overrides
///
/// # Examples
///
/// Basic usage with the `ldap3` transport:
/// ```no_run
/// # fn main() -> anyhow::Result<()> {
/// use ldap_proxy::config::load_config;
/// use ldap_proxy::DirectoryProxyBuilder;
///
/// let config = load_config("ldap-proxy.toml")?;
/// let proxy = DirectoryProxyBuilder::new(config).build()?;
/// # Ok(())
/// # }
/// ```
///
/// Against an in-memory directory:
/// ```
/// # fn main() -> anyhow::Result<()> {
/// use std::sync::Arc;
/// use ldap_proxy::config::create_default_config;
/// use ldap_proxy::upstream::{MockConnector, MockDirectory};
/// use ldap_proxy::DirectoryProxyBuilder;
///
/// let directory = Arc::new(MockDirectory::new());
/// let proxy = DirectoryProxyBuilder::new(create_default_config())
///     .with_connector(Arc::new(MockConnector::new().with_directory("example", directory)))
///     .build()?;
/// assert_eq!(proxy.registry().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DirectoryProxyBuilder {
    config: Config,
    connector: Option<Arc<dyn DirectoryConnector>>,
    schema: Option<Arc<dyn SchemaLookup>>,
}

impl DirectoryProxyBuilder {
    /// Create a new builder with the given configuration
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            connector: None,
            schema: None,
        }
    }

    /// Replace the upstream transport (defaults to `LdapConnector`)
    #[must_use]
    pub fn with_connector(mut self, connector: Arc<dyn DirectoryConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the schema lookup
    ///
    /// Defaults to the standard DN-valued attributes plus
    /// `schema_dn_attributes` from the configuration.
    #[must_use]
    pub fn with_schema(mut self, schema: Arc<dyn SchemaLookup>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Validate the configuration and assemble the proxy
    pub fn build(self) -> Result<DirectoryProxy> {
        self.config.validate().context("Invalid configuration")?;

        let registry = TargetRegistry::from_config(&self.config)?;
        for target in registry.iter() {
            info!(
                "Target '{}' at {} serving {} ({} policy)",
                target.name(),
                target.url(),
                target
                    .naming_contexts()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
                target.credential_policy().as_str()
            );
        }

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(LdapConnector::new()));
        let schema = self.schema.unwrap_or_else(|| {
            Arc::new(StaticSchema::with_extra(
                self.config.proxy.schema_dn_attributes.iter().cloned(),
            ))
        });

        let pool = ConnectionPool::from_config(connector, &self.config.proxy);
        info!(
            "Connection pool ready (max {} connections)",
            self.config.proxy.max_pool_size.get()
        );

        Ok(DirectoryProxy {
            selector: CandidateSelector::new(registry.clone()),
            registry,
            pool,
            engine: RewriteEngine::new(schema),
        })
    }
}

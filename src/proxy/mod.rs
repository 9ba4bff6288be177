//! The directory proxy facade
//!
//! [`DirectoryProxy`] owns the target registry, the connection pool and the
//! rewrite engine. It is `Send + Sync` and meant to be shared by `Arc`
//! across one task per client request. The per-operation entry points live
//! in the `relay` module.

mod builder;

pub use builder::DirectoryProxyBuilder;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::constants::ldap::{MATCH_ALL_FILTER, NAMING_CONTEXTS_ATTR};
use crate::error::ProxyError;
use crate::pool::{ConnectionPool, PoolStatus};
use crate::protocol::{OperationKind, Scope, SearchRequest};
use crate::rewrite::RewriteEngine;
use crate::router::CandidateSelector;
use crate::session::Credentials;
use crate::target::{Target, TargetRegistry};

/// Relays directory operations to the configured targets
#[derive(Debug)]
pub struct DirectoryProxy {
    pub(crate) registry: TargetRegistry,
    pub(crate) selector: CandidateSelector,
    pub(crate) pool: ConnectionPool,
    pub(crate) engine: RewriteEngine,
}

/// Outcome of probing one target
#[derive(Debug)]
pub struct ProbeReport {
    pub target: String,
    /// Naming contexts advertised by the root DSE
    pub result: Result<Vec<String>, ProxyError>,
}

impl DirectoryProxy {
    /// Build with the `ldap3` transport and default schema
    pub fn new(config: Config) -> Result<Self> {
        DirectoryProxyBuilder::new(config).build()
    }

    #[must_use]
    pub fn builder(config: Config) -> DirectoryProxyBuilder {
        DirectoryProxyBuilder::new(config)
    }

    #[must_use]
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    #[must_use]
    pub fn engine(&self) -> &RewriteEngine {
        &self.engine
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Connect to every target anonymously (or as its service identity)
    /// and read the root DSE
    pub async fn probe_targets(&self) -> Vec<ProbeReport> {
        let credentials = Credentials::anonymous();
        let request = SearchRequest::new("", Scope::Base, MATCH_ALL_FILTER)
            .with_attributes([NAMING_CONTEXTS_ATTR]);

        let probes = self.registry.iter().map(|target| {
            let credentials = &credentials;
            let request = &request;
            async move {
                ProbeReport {
                    target: target.name().to_string(),
                    result: self.probe(target, credentials, request).await,
                }
            }
        });
        futures::future::join_all(probes).await
    }

    async fn probe(
        &self,
        target: &Arc<Target>,
        credentials: &Credentials,
        request: &SearchRequest,
    ) -> Result<Vec<String>, ProxyError> {
        let conn = self.pool.acquire(target, credentials).await?;
        let mut transport = conn.session().await?;
        let outcome = tokio::time::timeout(
            target.timeout(OperationKind::Search),
            transport.search(request, &[]),
        )
        .await
        .map_err(|_| ProxyError::Timeout {
            target: target.name().to_string(),
            operation: OperationKind::Search,
        })??;
        Ok(outcome
            .entries
            .iter()
            .flat_map(|e| e.values(NAMING_CONTEXTS_ATTR).unwrap_or_default())
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect())
    }

    /// Retire every pooled connection and refuse new work
    pub fn shutdown(&self) {
        let retired = self.pool.shutdown();
        info!("Directory proxy shut down ({} connections retired)", retired);
    }
}

//! Upstream transport seam
//!
//! [`DirectoryConnector`] dials a target and [`DirectorySession`] runs
//! exchanges on one established connection. Transport failures come back as
//! `Err(ProxyError::Liveness)`; anything the server answered, including error
//! results, comes back as `Ok`.

pub mod ldap;
pub mod mock;

pub use ldap::LdapConnector;
pub use mock::{MockConnector, MockDirectory};

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{
    AddRequest, CompareRequest, Control, DeleteRequest, Entry, LdapResult, ModifyDnRequest,
    ModifyRequest, SearchRequest,
};
use crate::target::Target;

/// Collected reply of one search exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub entries: Vec<Entry>,
    pub referrals: Vec<String>,
    pub result: LdapResult,
}

/// Dials upstream targets
#[async_trait]
pub trait DirectoryConnector: Send + Sync + std::fmt::Debug {
    /// Open a new unauthenticated session to `target`
    async fn connect(&self, target: &Target) -> Result<Box<dyn DirectorySession>>;
}

/// One established upstream connection
///
/// Requests carry upstream-namespace DNs; the caller has already rewritten
/// them.
#[async_trait]
pub trait DirectorySession: Send + std::fmt::Debug {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> Result<LdapResult>;

    async fn search(
        &mut self,
        request: &SearchRequest,
        controls: &[Control],
    ) -> Result<SearchOutcome>;

    async fn compare(&mut self, request: &CompareRequest, controls: &[Control])
    -> Result<LdapResult>;

    async fn modify(&mut self, request: &ModifyRequest, controls: &[Control])
    -> Result<LdapResult>;

    async fn add(&mut self, request: &AddRequest, controls: &[Control]) -> Result<LdapResult>;

    async fn delete(&mut self, request: &DeleteRequest, controls: &[Control])
    -> Result<LdapResult>;

    async fn modify_dn(
        &mut self,
        request: &ModifyDnRequest,
        controls: &[Control],
    ) -> Result<LdapResult>;

    async fn unbind(&mut self) -> Result<()>;

    /// Message id of the most recent request sent on this session
    fn last_message_id(&self) -> Option<i32>;
}

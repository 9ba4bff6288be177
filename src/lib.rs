//! # ldap-proxy
//!
//! A directory proxy core. It relays LDAP operations from a front-end server
//! to one or more upstream directory servers and presents them as a single
//! namespace.
//!
//! - [`pool`]: one authenticated upstream connection per (client identity,
//!   target), created lazily and reused.
//! - [`rewrite`]: DN and filter translation between the client-visible and
//!   upstream naming contexts.
//! - [`router`]: picks the target(s) an operation touches.
//! - [`DirectoryProxy`]: the per-operation entry points, with a single
//!   reconnect-and-resend on a stale upstream connection.
//!
//! The front end decodes client requests, calls the matching
//! [`DirectoryProxy`] method with a [`ClientSession`] and receives entries and
//! results through its [`ResultSink`].

pub mod args;
pub mod authz;
pub mod config;
pub mod constants;
pub mod dn;
pub mod error;
pub mod filter;
pub mod logging;
pub mod pool;
pub mod protocol;
pub mod proxy;
mod relay;
pub mod rewrite;
pub mod router;
pub mod schema;
pub mod session;
pub mod sink;
pub mod target;
pub mod types;
pub mod upstream;

pub use config::{Config, TargetConfig, create_default_config, load_config, load_config_or_create};
pub use error::{ProxyError, Result};
pub use proxy::{DirectoryProxy, DirectoryProxyBuilder, ProbeReport};
pub use session::{ClientSession, Credentials, Identity};
pub use sink::{RecordingSink, ResultSink};

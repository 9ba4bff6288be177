//! Configuration module
//!
//! This module handles all configuration types and loading
//! for the LDAP proxy.

mod defaults;
mod loading;
mod types;
mod validation;

// Re-export public types
pub use loading::{create_default_config, load_config, load_config_or_create};
pub use types::{
    Config, CredentialPolicyKind, ProxyConfig, SuffixMassageConfig, TargetConfig,
    TargetConfigBuilder,
};

pub use defaults::{connect_timeout, protocol_version};

//! Constants used throughout the LDAP proxy
//!
//! This module centralizes magic numbers and default values.

use std::time::Duration;

/// Timeout constants
pub mod timeout {
    use super::Duration;

    /// Dial plus TLS handshake
    pub const CONNECT: Duration = Duration::from_secs(10);

    /// Default for bind exchanges
    pub const BIND_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default for search exchanges, which may stream many entries
    pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default for every other exchange
    pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

    /// Upper bound on the background unbind of a retired connection
    pub const UNBIND: Duration = Duration::from_secs(5);
}

/// Connection pool constants
pub mod pool {
    /// Default number of (identity, target) connections one pool may hold
    pub const DEFAULT_MAX_POOL_SIZE: usize = 256;

    /// Minimum jitter before a retry reconnects (milliseconds)
    pub const RETRY_JITTER_MIN_MS: u64 = 10;

    /// Width of the retry jitter window (milliseconds)
    ///
    /// Delays land in `[MIN, MIN + SPAN)`.
    pub const RETRY_JITTER_SPAN_MS: u64 = 50;
}

/// Protocol constants
pub mod ldap {
    /// Proxied authorization control, RFC 4370
    pub const PROXIED_AUTHZ_OID: &str = "2.16.840.1.113730.3.4.18";

    /// Root DSE attribute listing the contexts a server holds
    pub const NAMING_CONTEXTS_ATTR: &str = "namingContexts";

    /// Filter matching every entry
    pub const MATCH_ALL_FILTER: &str = "(objectClass=*)";
}

/// Environment variable prefixes
pub mod env {
    /// Indexed target overrides: `LDAP_PROXY_TARGET_<N>_URL` etc.
    pub const TARGET_PREFIX: &str = "LDAP_PROXY_TARGET_";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_window_is_positive() {
        assert!(pool::RETRY_JITTER_SPAN_MS > 0);
        assert!(pool::RETRY_JITTER_MIN_MS > 0);
    }

    #[test]
    fn test_search_timeout_not_shorter_than_default() {
        assert!(timeout::SEARCH_TIMEOUT >= timeout::OPERATION_TIMEOUT);
    }
}

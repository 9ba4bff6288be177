//! Proxy error types
//!
//! Every failure the relay can produce is a [`ProxyError`]. Each variant maps
//! to exactly one client-visible result code; [`ProxyError::to_result`] builds
//! the response and [`ProxyError::log_level`] picks how loudly to log it.

use thiserror::Error;

use crate::dn::DnError;
use crate::filter::FilterError;
use crate::protocol::{LdapResult, OperationKind, ProtocolVersion, ResultCode};

pub type Result<T, E = ProxyError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ProxyError {
    /// DN lies outside every naming context of the chosen target
    #[error("DN {dn:?} is outside the naming contexts of target '{target}'")]
    NamingMismatch { dn: String, target: String },

    /// No target claims the DN
    #[error("no target serves {dn:?}")]
    NoSuchObject { dn: String },

    #[error("{operation} requires LDAPv3 but the negotiated version is {version}")]
    ProtocolIncompatible {
        operation: OperationKind,
        version: ProtocolVersion,
    },

    #[error("cannot move {dn:?} under {new_superior:?}: different targets")]
    AffectsMultipleDsas { dn: String, new_superior: String },

    #[error("unwilling to perform: {0}")]
    Unwilling(String),

    /// Upstream rejected the credentials; the result is relayed verbatim
    #[error("authentication failed on target '{target}': {result}")]
    Authentication { target: String, result: LdapResult },

    /// Transport failure (refused, reset, EOF, server down)
    #[error("target '{target}' unreachable: {reason}")]
    Liveness { target: String, reason: String },

    /// Connection was torn down while an operation was using it
    #[error("connection to target '{target}' was invalidated")]
    ConnectionInvalidated { target: String },

    #[error("connection pool exhausted (max size: {max_size})")]
    PoolExhausted { max_size: usize },

    #[error("{operation} on target '{target}' timed out")]
    Timeout {
        target: String,
        operation: OperationKind,
    },

    /// The client session went away
    #[error("operation cancelled")]
    Cancelled,

    /// Non-success result produced by an upstream server or its client library
    #[error("target '{target}' returned {result}")]
    Upstream { target: String, result: LdapResult },

    #[error("invalid DN: {0}")]
    InvalidDn(#[from] DnError),

    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    /// Client-visible result code
    #[must_use]
    pub fn result_code(&self) -> ResultCode {
        match self {
            Self::NamingMismatch { .. } | Self::NoSuchObject { .. } => ResultCode::NoSuchObject,
            Self::ProtocolIncompatible { .. } | Self::Unwilling(_) => {
                ResultCode::UnwillingToPerform
            }
            Self::AffectsMultipleDsas { .. } => ResultCode::AffectsMultipleDsas,
            Self::Authentication { result, .. } => result.code,
            Self::Liveness { .. } | Self::ConnectionInvalidated { .. } | Self::Cancelled => {
                ResultCode::Unavailable
            }
            Self::PoolExhausted { .. } => ResultCode::Busy,
            Self::Timeout { .. } => ResultCode::TimeLimitExceeded,
            Self::Upstream { result, .. } => ResultCode::from_upstream(result.code.as_u32()),
            Self::InvalidDn(_) => ResultCode::InvalidDnSyntax,
            Self::InvalidFilter(_) => ResultCode::ProtocolError,
            Self::Internal(_) => ResultCode::Other,
        }
    }

    /// Response to send the client, `None` when nobody is listening
    #[must_use]
    pub fn to_result(&self) -> Option<LdapResult> {
        match self {
            Self::Cancelled => None,
            Self::Authentication { result, .. } => Some(result.clone()),
            Self::Upstream { result, .. } => {
                let mut result = result.clone();
                result.code = self.result_code();
                Some(result)
            }
            other => Some(LdapResult::new(other.result_code(), other.to_string())),
        }
    }

    /// Transport-level failure that warrants a reconnect
    #[must_use]
    pub const fn is_liveness(&self) -> bool {
        matches!(self, Self::Liveness { .. })
    }

    /// Failure that ends the client session rather than just the operation
    #[must_use]
    pub const fn aborts_session(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Get the appropriate log level for this error
    #[must_use]
    pub fn log_level(&self) -> tracing::Level {
        match self {
            // Expected outcomes of normal client traffic
            Self::Cancelled
            | Self::NoSuchObject { .. }
            | Self::NamingMismatch { .. }
            | Self::Upstream { .. }
            | Self::Authentication { .. }
            | Self::InvalidDn(_)
            | Self::InvalidFilter(_) => tracing::Level::DEBUG,
            Self::ProtocolIncompatible { .. }
            | Self::AffectsMultipleDsas { .. }
            | Self::Unwilling(_)
            | Self::ConnectionInvalidated { .. } => tracing::Level::INFO,
            Self::Liveness { .. } | Self::PoolExhausted { .. } | Self::Timeout { .. } => {
                tracing::Level::WARN
            }
            Self::Internal(_) => tracing::Level::ERROR,
        }
    }
}

/// Log an error at the level it asks for
pub fn log_error(context: &str, err: &ProxyError) {
    match err.log_level() {
        tracing::Level::ERROR => tracing::error!(error = %err, "{context}"),
        tracing::Level::WARN => tracing::warn!(error = %err, "{context}"),
        tracing::Level::INFO => tracing::info!(error = %err, "{context}"),
        _ => tracing::debug!(error = %err, "{context}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_errors_map_to_no_such_object() {
        let err = ProxyError::NoSuchObject {
            dn: "o=nowhere".into(),
        };
        assert_eq!(err.result_code(), ResultCode::NoSuchObject);
        let err = ProxyError::NamingMismatch {
            dn: "o=nowhere".into(),
            target: "people".into(),
        };
        assert_eq!(err.result_code(), ResultCode::NoSuchObject);
    }

    #[test]
    fn test_authentication_result_relayed_verbatim() {
        let upstream = LdapResult::new(ResultCode::InvalidCredentials, "bad password");
        let err = ProxyError::Authentication {
            target: "people".into(),
            result: upstream.clone(),
        };
        assert_eq!(err.to_result(), Some(upstream));
    }

    #[test]
    fn test_upstream_library_code_folded() {
        let err = ProxyError::Upstream {
            target: "people".into(),
            result: LdapResult::new(ResultCode::from_u32(85), "timeout"),
        };
        let result = err.to_result().unwrap();
        assert_eq!(result.code, ResultCode::Unavailable);
        assert_eq!(result.message, "timeout");
    }

    #[test]
    fn test_cancelled_produces_no_result() {
        assert!(ProxyError::Cancelled.to_result().is_none());
    }

    #[test]
    fn test_code_table() {
        let cases = [
            (
                ProxyError::ProtocolIncompatible {
                    operation: OperationKind::ModifyDn,
                    version: ProtocolVersion::V2,
                },
                ResultCode::UnwillingToPerform,
            ),
            (
                ProxyError::AffectsMultipleDsas {
                    dn: "a".into(),
                    new_superior: "b".into(),
                },
                ResultCode::AffectsMultipleDsas,
            ),
            (
                ProxyError::Liveness {
                    target: "t".into(),
                    reason: "reset".into(),
                },
                ResultCode::Unavailable,
            ),
            (
                ProxyError::ConnectionInvalidated { target: "t".into() },
                ResultCode::Unavailable,
            ),
            (ProxyError::PoolExhausted { max_size: 1 }, ResultCode::Busy),
            (
                ProxyError::Timeout {
                    target: "t".into(),
                    operation: OperationKind::Search,
                },
                ResultCode::TimeLimitExceeded,
            ),
            (
                ProxyError::InvalidDn(DnError::UnterminatedEscape),
                ResultCode::InvalidDnSyntax,
            ),
            (
                ProxyError::InvalidFilter(FilterError::Empty),
                ResultCode::ProtocolError,
            ),
            (ProxyError::Internal("x".into()), ResultCode::Other),
        ];
        for (err, code) in cases {
            assert_eq!(err.result_code(), code, "{err}");
        }
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(ProxyError::Cancelled.log_level(), tracing::Level::DEBUG);
        assert_eq!(
            ProxyError::PoolExhausted { max_size: 2 }.log_level(),
            tracing::Level::WARN
        );
        assert_eq!(
            ProxyError::Internal("bug".into()).log_level(),
            tracing::Level::ERROR
        );
        assert!(ProxyError::Internal("bug".into()).aborts_session());
    }
}

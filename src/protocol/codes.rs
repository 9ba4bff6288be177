//! LDAP result codes
//!
//! Numeric values follow RFC 4511 §4.1.9. The client-library range (81-91)
//! never reaches a client verbatim; [`ResultCode::from_upstream`] folds it into
//! the server range.

use std::fmt;

/// Result code carried in every LDAP response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    CompareFalse,
    CompareTrue,
    AuthMethodNotSupported,
    StrongerAuthRequired,
    Referral,
    AdminLimitExceeded,
    UnavailableCriticalExtension,
    ConfidentialityRequired,
    NoSuchAttribute,
    UndefinedAttributeType,
    InappropriateMatching,
    ConstraintViolation,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    NoSuchObject,
    AliasProblem,
    InvalidDnSyntax,
    InappropriateAuthentication,
    InvalidCredentials,
    InsufficientAccessRights,
    Busy,
    Unavailable,
    UnwillingToPerform,
    LoopDetect,
    NamingViolation,
    ObjectClassViolation,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    ObjectClassModsProhibited,
    AffectsMultipleDsas,
    Other,
    /// Any code outside the table above, kept verbatim
    Unknown(u32),
}

impl ResultCode {
    /// Numeric value on the wire
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::TimeLimitExceeded => 3,
            Self::SizeLimitExceeded => 4,
            Self::CompareFalse => 5,
            Self::CompareTrue => 6,
            Self::AuthMethodNotSupported => 7,
            Self::StrongerAuthRequired => 8,
            Self::Referral => 10,
            Self::AdminLimitExceeded => 11,
            Self::UnavailableCriticalExtension => 12,
            Self::ConfidentialityRequired => 13,
            Self::NoSuchAttribute => 16,
            Self::UndefinedAttributeType => 17,
            Self::InappropriateMatching => 18,
            Self::ConstraintViolation => 19,
            Self::AttributeOrValueExists => 20,
            Self::InvalidAttributeSyntax => 21,
            Self::NoSuchObject => 32,
            Self::AliasProblem => 33,
            Self::InvalidDnSyntax => 34,
            Self::InappropriateAuthentication => 48,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::LoopDetect => 54,
            Self::NamingViolation => 64,
            Self::ObjectClassViolation => 65,
            Self::NotAllowedOnNonLeaf => 66,
            Self::NotAllowedOnRdn => 67,
            Self::EntryAlreadyExists => 68,
            Self::ObjectClassModsProhibited => 69,
            Self::AffectsMultipleDsas => 71,
            Self::Other => 80,
            Self::Unknown(code) => code,
        }
    }

    /// Decode a numeric code
    #[must_use]
    pub const fn from_u32(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::OperationsError,
            2 => Self::ProtocolError,
            3 => Self::TimeLimitExceeded,
            4 => Self::SizeLimitExceeded,
            5 => Self::CompareFalse,
            6 => Self::CompareTrue,
            7 => Self::AuthMethodNotSupported,
            8 => Self::StrongerAuthRequired,
            10 => Self::Referral,
            11 => Self::AdminLimitExceeded,
            12 => Self::UnavailableCriticalExtension,
            13 => Self::ConfidentialityRequired,
            16 => Self::NoSuchAttribute,
            17 => Self::UndefinedAttributeType,
            18 => Self::InappropriateMatching,
            19 => Self::ConstraintViolation,
            20 => Self::AttributeOrValueExists,
            21 => Self::InvalidAttributeSyntax,
            32 => Self::NoSuchObject,
            33 => Self::AliasProblem,
            34 => Self::InvalidDnSyntax,
            48 => Self::InappropriateAuthentication,
            49 => Self::InvalidCredentials,
            50 => Self::InsufficientAccessRights,
            51 => Self::Busy,
            52 => Self::Unavailable,
            53 => Self::UnwillingToPerform,
            54 => Self::LoopDetect,
            64 => Self::NamingViolation,
            65 => Self::ObjectClassViolation,
            66 => Self::NotAllowedOnNonLeaf,
            67 => Self::NotAllowedOnRdn,
            68 => Self::EntryAlreadyExists,
            69 => Self::ObjectClassModsProhibited,
            71 => Self::AffectsMultipleDsas,
            80 => Self::Other,
            other => Self::Unknown(other),
        }
    }

    /// Map a code reported by the upstream client library to a client-visible code
    ///
    /// Server codes pass through. Transport-level library codes become
    /// `unavailable`; the remaining library codes become `other`.
    #[must_use]
    pub const fn from_upstream(code: u32) -> Self {
        match code {
            // server down, timeout, connect error
            81 | 85 | 91 => Self::Unavailable,
            // local error, encoding/decoding error, auth unknown, filter error,
            // user cancelled, no memory, not supported, control not found,
            // client loop
            82..=84 | 86..=90 => Self::Other,
            other => Self::from_u32(other),
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// True for outcomes a compare or search can legitimately end with
    #[must_use]
    pub const fn is_non_error(self) -> bool {
        matches!(
            self,
            Self::Success | Self::CompareFalse | Self::CompareTrue | Self::Referral
        )
    }
}

impl From<u32> for ResultCode {
    fn from(code: u32) -> Self {
        Self::from_u32(code)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "unknown({code})"),
            other => write!(f, "{other:?}({})", other.as_u32()),
        }
    }
}

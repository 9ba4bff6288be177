//! Decoded LDAP operations and responses
//!
//! The front end decodes client PDUs into these structs and the upstream
//! transport encodes them again; nothing in this module touches BER.
//! DNs and filters are carried as the client sent them and only parsed by the
//! relay, so that malformed input is reported with the proper result code.

pub mod codes;

pub use codes::ResultCode;

use std::fmt;

/// LDAP protocol version negotiated with a client or supported by a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ProtocolVersion {
    V2,
    #[default]
    V3,
}

impl ProtocolVersion {
    /// Parse a numeric version, accepting only 2 and 3
    #[must_use]
    pub const fn from_u8(version: u8) -> Option<Self> {
        match version {
            2 => Some(Self::V2),
            3 => Some(Self::V3),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    /// Version both sides can speak
    #[must_use]
    pub fn negotiate(self, other: Self) -> Self {
        self.min(other)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.as_u8())
    }
}

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Base,
    OneLevel,
    Subtree,
}

impl Scope {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::OneLevel => "one",
            Self::Subtree => "sub",
        }
    }
}

/// Operation kinds, used for per-kind timeouts and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    Bind,
    Search,
    Compare,
    Modify,
    Add,
    Delete,
    ModifyDn,
    Unbind,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Search => "search",
            Self::Compare => "compare",
            Self::Modify => "modify",
            Self::Add => "add",
            Self::Delete => "delete",
            Self::ModifyDn => "modrdn",
            Self::Unbind => "unbind",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request or response control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub oid: String,
    pub critical: bool,
    pub value: Option<Vec<u8>>,
}

/// One attribute with its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    /// Build an attribute from string values
    pub fn new<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// A directory entry as returned by search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

impl Entry {
    #[must_use]
    pub fn new(dn: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Values of an attribute, matched case-insensitively
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[Vec<u8>]> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.values.as_slice())
    }

    /// First value of an attribute as UTF-8
    #[must_use]
    pub fn first_str(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|v| v.first())
            .and_then(|v| std::str::from_utf8(v).ok())
    }
}

/// Final response of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    pub code: ResultCode,
    pub matched_dn: String,
    pub message: String,
    pub referrals: Vec<String>,
}

impl LdapResult {
    #[must_use]
    pub fn success() -> Self {
        Self::new(ResultCode::Success, "")
    }

    #[must_use]
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            message: message.into(),
            referrals: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_matched_dn(mut self, matched_dn: impl Into<String>) -> Self {
        self.matched_dn = matched_dn.into();
        self
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl fmt::Display for LdapResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Simple bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub name: String,
    pub password: String,
    pub version: ProtocolVersion,
}

impl BindRequest {
    #[must_use]
    pub fn simple(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            version: ProtocolVersion::V3,
        }
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::simple("", "")
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: Scope,
    pub filter: String,
    pub attributes: Vec<String>,
    /// Maximum entries to return, 0 means unlimited
    pub size_limit: usize,
    /// Server-side time limit in seconds, 0 means unlimited
    pub time_limit: u32,
    pub types_only: bool,
}

impl SearchRequest {
    #[must_use]
    pub fn new(base: impl Into<String>, scope: Scope, filter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
            size_limit: 0,
            time_limit: 0,
            types_only: false,
        }
    }

    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompareRequest {
    pub dn: String,
    pub attribute: String,
    pub value: Vec<u8>,
}

/// Kind of change applied by one modification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifyOp {
    Add,
    Delete,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub op: ModifyOp,
    pub attribute: Attribute,
}

impl Modification {
    pub fn new<I, V>(op: ModifyOp, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        Self {
            op,
            attribute: Attribute::new(name, values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub dn: String,
    pub changes: Vec<Modification>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub dn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDnRequest {
    pub dn: String,
    pub new_rdn: String,
    pub delete_old_rdn: bool,
    pub new_superior: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_negotiation_takes_lower() {
        assert_eq!(
            ProtocolVersion::V3.negotiate(ProtocolVersion::V2),
            ProtocolVersion::V2
        );
        assert_eq!(
            ProtocolVersion::V3.negotiate(ProtocolVersion::V3),
            ProtocolVersion::V3
        );
    }

    #[test]
    fn test_version_from_u8() {
        assert_eq!(ProtocolVersion::from_u8(2), Some(ProtocolVersion::V2));
        assert_eq!(ProtocolVersion::from_u8(3), Some(ProtocolVersion::V3));
        assert_eq!(ProtocolVersion::from_u8(4), None);
    }

    #[test]
    fn test_entry_attribute_lookup_is_case_insensitive() {
        let entry = Entry::new(
            "cn=a,dc=example",
            vec![Attribute::new("mail", ["a@example.com"])],
        );
        assert_eq!(entry.first_str("MAIL"), Some("a@example.com"));
        assert!(entry.values("cn").is_none());
    }

    #[test]
    fn test_anonymous_bind_detection() {
        assert!(BindRequest::anonymous().is_anonymous());
        assert!(BindRequest::simple("  ", "").is_anonymous());
        assert!(!BindRequest::simple("cn=a", "pw").is_anonymous());
    }

    #[test]
    fn test_ldap_result_display() {
        let result = LdapResult::new(ResultCode::NoSuchObject, "not here");
        assert_eq!(result.to_string(), "NoSuchObject(32): not here");
        assert!(LdapResult::success().is_success());
    }
}

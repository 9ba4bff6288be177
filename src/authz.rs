//! Proxied authorization (RFC 4370)
//!
//! Targets that assert client identity receive the client's authorization
//! identity in a critical control on every request. The control is built per
//! request and never stored on the connection.

use crate::constants::ldap::PROXIED_AUTHZ_OID;
use crate::dn::Dn;
use crate::protocol::Control;

/// Authorization identity asserted to a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAuthorizationContext {
    authz_id: String,
}

impl ProxyAuthorizationContext {
    /// `dn:<dn>` for a bound client, the empty authzId for anonymous
    #[must_use]
    pub fn new(dn: Option<&Dn>) -> Self {
        let authz_id = dn.map(|dn| format!("dn:{dn}")).unwrap_or_default();
        Self { authz_id }
    }

    #[must_use]
    pub fn authz_id(&self) -> &str {
        &self.authz_id
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.authz_id.is_empty()
    }

    #[must_use]
    pub fn to_control(&self) -> Control {
        Control {
            oid: PROXIED_AUTHZ_OID.to_string(),
            critical: true,
            value: Some(self.authz_id.as_bytes().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_identity() {
        let dn = Dn::parse("uid=jane,ou=staff,o=corp").unwrap();
        let ctx = ProxyAuthorizationContext::new(Some(&dn));
        assert_eq!(ctx.authz_id(), "dn:uid=jane,ou=staff,o=corp");
        let control = ctx.to_control();
        assert_eq!(control.oid, "2.16.840.1.113730.3.4.18");
        assert!(control.critical);
        assert_eq!(control.value.as_deref(), Some(b"dn:uid=jane,ou=staff,o=corp".as_slice()));
    }

    #[test]
    fn test_anonymous() {
        let ctx = ProxyAuthorizationContext::new(None);
        assert!(ctx.is_anonymous());
        assert_eq!(ctx.to_control().value, Some(Vec::new()));
    }
}

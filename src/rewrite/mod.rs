//! Naming-context rewrite between client and upstream namespaces
//!
//! Requests are rewritten strictly: a DN that no rule covers is a
//! [`ProxyError::NamingMismatch`] and the operation never reaches the
//! upstream. Replies are rewritten best-effort: anything that cannot be
//! mapped back is handed to the client unchanged.

pub mod rules;
pub mod session;

pub use rules::SuffixMapping;
pub use session::RewriteSession;

use std::sync::Arc;
use tracing::trace;

use crate::dn::Dn;
use crate::error::{ProxyError, Result};
use crate::filter::Filter;
use crate::protocol::{Attribute, Entry, LdapResult};
use crate::schema::SchemaLookup;

/// Stateless translator; all per-connection state lives in [`RewriteSession`]
#[derive(Debug, Clone)]
pub struct RewriteEngine {
    schema: Arc<dyn SchemaLookup>,
}

impl RewriteEngine {
    #[must_use]
    pub fn new(schema: Arc<dyn SchemaLookup>) -> Self {
        Self { schema }
    }

    #[must_use]
    pub fn schema(&self) -> &dyn SchemaLookup {
        self.schema.as_ref()
    }

    /// Client DN to upstream DN
    ///
    /// # Errors
    ///
    /// [`ProxyError::NamingMismatch`] when no rule of `session` covers `dn`.
    pub fn to_upstream(&self, session: &RewriteSession, dn: &Dn) -> Result<Dn> {
        session
            .map_to_upstream(dn)
            .ok_or_else(|| ProxyError::NamingMismatch {
                dn: dn.to_string(),
                target: session.target_name().to_string(),
            })
    }

    /// Upstream DN to client DN
    ///
    /// # Errors
    ///
    /// [`ProxyError::NamingMismatch`] when no rule of `session` covers `dn`.
    pub fn to_client(&self, session: &RewriteSession, dn: &Dn) -> Result<Dn> {
        session
            .map_to_client(dn)
            .ok_or_else(|| ProxyError::NamingMismatch {
                dn: dn.to_string(),
                target: session.target_name().to_string(),
            })
    }

    /// Parse and rewrite a DN string from a client request
    pub fn dn_to_upstream(&self, session: &RewriteSession, dn: &str) -> Result<String> {
        let parsed = Dn::parse(dn)?;
        Ok(self.to_upstream(session, &parsed)?.to_string())
    }

    /// Parse a filter and rewrite every DN-valued assertion
    ///
    /// Values that do not parse as DNs, or that lie outside every rule, are
    /// sent unchanged; they cannot match anything under this target anyway.
    pub fn filter_to_upstream(&self, session: &RewriteSession, filter: &str) -> Result<String> {
        let mut parsed = Filter::parse(filter)?;
        parsed.visit_values(&mut |attribute: Option<&str>, value: &mut Vec<u8>| {
            let dn_valued = attribute.is_some_and(|a| self.schema.is_dn_valued(a));
            if dn_valued && let Some(mapped) = map_value(value, |dn| session.map_to_upstream(dn)) {
                *value = mapped;
            }
        });
        Ok(parsed.to_string())
    }

    /// Rewrite DN-valued attribute values of an add or modify request
    pub fn attributes_to_upstream(&self, session: &RewriteSession, attributes: &mut [Attribute]) {
        for attribute in attributes {
            if self.schema.is_dn_valued(&attribute.name) {
                for value in &mut attribute.values {
                    if let Some(mapped) = map_value(value, |dn| session.map_to_upstream(dn)) {
                        *value = mapped;
                    }
                }
            }
        }
    }

    /// Map an upstream entry back into the client namespace
    #[must_use]
    pub fn entry_to_client(&self, session: &RewriteSession, mut entry: Entry) -> Entry {
        match Dn::parse(&entry.dn) {
            Ok(dn) => match session.map_to_client(&dn) {
                Some(mapped) => entry.dn = mapped.to_string(),
                None => trace!(dn = %entry.dn, "entry DN outside rewrite rules, left unchanged"),
            },
            Err(err) => trace!(dn = %entry.dn, error = %err, "unparseable entry DN"),
        }

        for attribute in &mut entry.attributes {
            if self.schema.is_dn_valued(&attribute.name) {
                for value in &mut attribute.values {
                    if let Some(mapped) = map_value(value, |dn| session.map_to_client(dn)) {
                        *value = mapped;
                    }
                }
            }
        }
        entry
    }

    /// Map the matched DN of an upstream result back into the client namespace
    #[must_use]
    pub fn result_to_client(&self, session: &RewriteSession, mut result: LdapResult) -> LdapResult {
        if !result.matched_dn.is_empty()
            && let Some(mapped) = map_value(result.matched_dn.as_bytes(), |dn| {
                session.map_to_client(dn)
            })
        {
            result.matched_dn = String::from_utf8_lossy(&mapped).into_owned();
        }
        result
    }
}

fn map_value(value: &[u8], map: impl Fn(&Dn) -> Option<Dn>) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(value).ok()?;
    let dn = Dn::parse(text).ok()?;
    if dn.is_root() {
        return None;
    }
    map(&dn).map(|mapped| mapped.to_string().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ResultCode;
    use crate::schema::StaticSchema;
    use crate::config::TargetConfig;
    use crate::target::Target;
    use crate::types::TargetId;

    fn engine() -> RewriteEngine {
        RewriteEngine::new(Arc::new(StaticSchema::default()))
    }

    fn mapped_session() -> RewriteSession {
        let config = TargetConfig::builder("people", "ldap://people.example:389")
            .naming_context("ou=people,dc=example,dc=com")
            .suffix_mapping("ou=people,dc=example,dc=com", "ou=staff,o=corp")
            .naming_context("ou=shared,dc=example,dc=com")
            .build()
            .unwrap();
        let target = Target::from_config(TargetId::from_index(0), &config).unwrap();
        RewriteSession::for_target(&target, Vec::new())
    }

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn test_mapped_context_roundtrip() {
        let engine = engine();
        let session = mapped_session();
        let client = dn("uid=jane,ou=people,dc=example,dc=com");
        let upstream = engine.to_upstream(&session, &client).unwrap();
        assert_eq!(upstream.to_string(), "uid=jane,ou=staff,o=corp");
        assert_eq!(engine.to_client(&session, &upstream).unwrap(), client);
    }

    #[test]
    fn test_passthrough_context_unchanged() {
        let engine = engine();
        let session = mapped_session();
        let client = dn("cn=printer,ou=shared,dc=example,dc=com");
        assert_eq!(engine.to_upstream(&session, &client).unwrap(), client);
        assert_eq!(session.passthrough().len(), 1);
    }

    #[test]
    fn test_outside_every_context_is_mismatch() {
        let engine = engine();
        let session = mapped_session();
        let err = engine
            .to_upstream(&session, &dn("ou=groups,dc=example,dc=com"))
            .unwrap_err();
        assert!(matches!(err, ProxyError::NamingMismatch { .. }));
        assert_eq!(err.result_code(), ResultCode::NoSuchObject);
    }

    #[test]
    fn test_filter_dn_values_rewritten() {
        let engine = engine();
        let session = mapped_session();
        let filter = engine
            .filter_to_upstream(
                &session,
                "(&(objectClass=groupOfNames)(member=uid=jane,ou=people,dc=example,dc=com)(cn=ou=people,dc=example,dc=com))",
            )
            .unwrap();
        assert_eq!(
            filter,
            "(&(objectClass=groupOfNames)(member=uid=jane,ou=staff,o=corp)(cn=ou=people,dc=example,dc=com))"
        );
    }

    #[test]
    fn test_filter_dn_outside_mappings_left_unchanged() {
        let engine = engine();
        let session = mapped_session();
        let filter = engine
            .filter_to_upstream(&session, "(member=cn=x,o=elsewhere)")
            .unwrap();
        assert_eq!(filter, "(member=cn=x,o=elsewhere)");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let engine = engine();
        let err = engine
            .filter_to_upstream(&mapped_session(), "(member=")
            .unwrap_err();
        assert!(matches!(err, ProxyError::InvalidFilter(_)));
    }

    #[test]
    fn test_entry_mapped_back() {
        let engine = engine();
        let session = mapped_session();
        let entry = Entry::new(
            "cn=staff,ou=staff,o=corp",
            vec![
                Attribute::new("member", ["uid=jane,ou=staff,o=corp", "cn=ext,o=partner"]),
                Attribute::new("description", ["ou=staff,o=corp"]),
            ],
        );
        let mapped = engine.entry_to_client(&session, entry);
        assert_eq!(mapped.dn, "cn=staff,ou=people,dc=example,dc=com");
        let members: Vec<&[u8]> = mapped.values("member").unwrap().iter().map(Vec::as_slice).collect();
        assert_eq!(
            members,
            vec![
                b"uid=jane,ou=people,dc=example,dc=com".as_slice(),
                b"cn=ext,o=partner".as_slice()
            ]
        );
        assert_eq!(mapped.first_str("description"), Some("ou=staff,o=corp"));
    }

    #[test]
    fn test_matched_dn_mapped_back() {
        let engine = engine();
        let session = mapped_session();
        let result = LdapResult::new(ResultCode::NoSuchObject, "")
            .with_matched_dn("ou=staff,o=corp");
        let mapped = engine.result_to_client(&session, result);
        assert_eq!(mapped.matched_dn, "ou=people,dc=example,dc=com");
    }

    #[test]
    fn test_learned_mapping_replaces_passthrough() {
        let config = TargetConfig::builder("dir", "ldap://dir.example:389")
            .naming_context("dc=example,dc=com")
            .build()
            .unwrap();
        let target = Target::from_config(TargetId::from_index(0), &config).unwrap();
        let learned = vec![SuffixMapping::new(dn("dc=example,dc=com"), dn("o=internal"))];
        let session = RewriteSession::for_target(&target, learned);
        assert!(session.passthrough().is_empty());
        let upstream = engine()
            .to_upstream(&session, &dn("cn=a,dc=example,dc=com"))
            .unwrap();
        assert_eq!(upstream.to_string(), "cn=a,o=internal");
    }
}

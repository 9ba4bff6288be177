//! Property-based tests using proptest
//!
//! These tests verify the algebraic laws of the rewrite layer and the
//! stability of DN and filter parsing over arbitrary input.

use std::sync::Arc;

use ldap_proxy::config::TargetConfig;
use ldap_proxy::dn::Dn;
use ldap_proxy::filter::Filter;
use ldap_proxy::protocol::Scope;
use ldap_proxy::rewrite::{RewriteEngine, RewriteSession};
use ldap_proxy::router::CandidateSelector;
use ldap_proxy::schema::StaticSchema;
use ldap_proxy::target::{Target, TargetRegistry};
use ldap_proxy::types::TargetId;
use ldap_proxy::ProxyError;
use proptest::prelude::*;

fn massaged_target() -> Target {
    let config = TargetConfig::builder("corp", "ldap://corp.test")
        .naming_context("ou=people,dc=example,dc=com")
        .naming_context("ou=groups,dc=example,dc=com")
        .suffix_mapping("ou=people,dc=example,dc=com", "ou=staff,o=corp")
        .build()
        .unwrap();
    Target::from_config(TargetId::from_index(0), &config).unwrap()
}

fn engine() -> RewriteEngine {
    RewriteEngine::new(Arc::new(StaticSchema::default()))
}

fn attr() -> impl Strategy<Value = String> {
    prop_oneof![Just("uid"), Just("cn"), Just("ou"), Just("CN"), Just("mail")]
        .prop_map(str::to_string)
}

/// Values including characters that need escaping in a DN
fn value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9 .,+=#;<>\"\\\\-]{0,12}[a-zA-Z0-9]"
}

fn escape(value: &str) -> String {
    ldap_proxy::dn::escape(value)
}

fn leaf() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec((attr(), value()), 0..4)
}

fn under(rdns: &[(String, String)], suffix: &str) -> String {
    rdns.iter()
        .map(|(a, v)| format!("{a}={}", escape(v)))
        .chain((!suffix.is_empty()).then(|| suffix.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// 1. Rewrite round trip
// =============================================================================

proptest! {
    #[test]
    fn prop_rewrite_round_trip_mapped(rdns in leaf()) {
        let target = massaged_target();
        let session = RewriteSession::for_target(&target, Vec::new());
        let engine = engine();

        let dn = Dn::parse(under(&rdns, "ou=people,dc=example,dc=com")).unwrap();
        let upstream = engine.to_upstream(&session, &dn).unwrap();
        prop_assert!(upstream.is_within(&Dn::parse("ou=staff,o=corp").unwrap()));
        let back = engine.to_client(&session, &upstream).unwrap();
        prop_assert_eq!(back, dn);
    }

    #[test]
    fn prop_rewrite_round_trip_passthrough(rdns in leaf()) {
        let target = massaged_target();
        let session = RewriteSession::for_target(&target, Vec::new());
        let engine = engine();

        let dn = Dn::parse(under(&rdns, "ou=groups,dc=example,dc=com")).unwrap();
        let upstream = engine.to_upstream(&session, &dn).unwrap();
        prop_assert_eq!(&upstream, &dn);
        prop_assert_eq!(engine.to_client(&session, &upstream).unwrap(), dn);
    }

    #[test]
    fn prop_rewrite_outside_contexts_fails(rdns in leaf()) {
        let target = massaged_target();
        let session = RewriteSession::for_target(&target, Vec::new());

        let dn = Dn::parse(under(&rdns, "o=elsewhere")).unwrap();
        let err = engine().to_upstream(&session, &dn).unwrap_err();
        let is_mismatch = matches!(err, ProxyError::NamingMismatch { .. });
        prop_assert!(is_mismatch);
    }
}

fn upstream_suffix() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("dc=b"),
        Just("ou=x,dc=b"),
        Just("o=corp"),
        Just("ou=y,dc=a"),
        Just("dc=c"),
    ]
}

proptest! {
    /// Whatever mapping a two-context target accepts, both contexts round trip
    #[test]
    fn prop_rewrite_round_trip_multi_context(
        rdns in leaf(),
        upstream in upstream_suffix(),
        in_mapped in any::<bool>(),
    ) {
        let config = TargetConfig::builder("two", "ldap://two.test")
            .naming_context("dc=a")
            .naming_context("dc=b")
            .suffix_mapping("dc=a", upstream)
            .build()
            .unwrap();
        let Ok(target) = Target::from_config(TargetId::from_index(0), &config) else {
            let overlaps = Dn::parse(upstream).unwrap().is_within(&Dn::parse("dc=b").unwrap());
            prop_assert!(overlaps, "{upstream} rejected without overlapping dc=b");
            return Ok(());
        };
        let session = RewriteSession::for_target(&target, Vec::new());
        let engine = engine();

        let dn = Dn::parse(under(&rdns, if in_mapped { "dc=a" } else { "dc=b" })).unwrap();
        let upstream_dn = engine.to_upstream(&session, &dn).unwrap();
        prop_assert_eq!(engine.to_client(&session, &upstream_dn).unwrap(), dn);
    }
}

// =============================================================================
// 2. DN parsing
// =============================================================================

proptest! {
    #[test]
    fn prop_dn_parse_never_panics(s in ".*") {
        let _ = Dn::parse(&s);
    }

    #[test]
    fn prop_dn_display_reparses_equal(rdns in leaf()) {
        let dn = Dn::parse(under(&rdns, "dc=example,dc=com")).unwrap();
        let reparsed = Dn::parse(dn.to_string()).unwrap();
        prop_assert_eq!(reparsed.normalized(), dn.normalized());
    }

    #[test]
    fn prop_dn_equality_ignores_case(rdns in leaf()) {
        let text = under(&rdns, "dc=example,dc=com");
        let lower = Dn::parse(&text).unwrap();
        let upper = Dn::parse(text.to_uppercase()).unwrap();
        prop_assert_eq!(lower, upper);
    }
}

// =============================================================================
// 3. Filter parse/serialize stability
// =============================================================================

fn simple_filter() -> impl Strategy<Value = String> {
    let value = "[a-zA-Z0-9.=,@-]{1,10}";
    prop_oneof![
        (attr(), value).prop_map(|(a, v)| format!("({a}={v})")),
        attr().prop_map(|a| format!("({a}=*)")),
        (attr(), value).prop_map(|(a, v)| format!("({a}>={v})")),
        (attr(), value).prop_map(|(a, v)| format!("({a}~={v})")),
        (attr(), value, value).prop_map(|(a, v, w)| format!("({a}={v}*{w})")),
        (attr(), value).prop_map(|(a, v)| format!("({a}=*{v}*)")),
    ]
}

fn filter() -> impl Strategy<Value = String> {
    simple_filter().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4)
                .prop_map(|parts| format!("(&{})", parts.concat())),
            prop::collection::vec(inner.clone(), 1..4)
                .prop_map(|parts| format!("(|{})", parts.concat())),
            inner.prop_map(|f| format!("(!{f})")),
        ]
    })
}

proptest! {
    #[test]
    fn prop_filter_parse_never_panics(s in ".*") {
        let _ = Filter::parse(&s);
    }

    #[test]
    fn prop_filter_serialization_is_stable(text in filter()) {
        let parsed = Filter::parse(&text).unwrap();
        let once = parsed.to_string();
        let twice = Filter::parse(&once).unwrap().to_string();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_filter_rewrite_without_dn_values_is_identity(text in filter()) {
        let target = massaged_target();
        let session = RewriteSession::for_target(&target, Vec::new());
        let rewritten = engine().filter_to_upstream(&session, &text).unwrap();
        prop_assert_eq!(rewritten, Filter::parse(&text).unwrap().to_string());
    }
}

// =============================================================================
// 4. Candidate selection
// =============================================================================

proptest! {
    #[test]
    fn prop_object_scope_selects_holder(rdns in leaf(), people in any::<bool>()) {
        let targets = [
            ("people", "ou=people,dc=example,dc=com"),
            ("groups", "ou=groups,dc=example,dc=com"),
        ]
        .iter()
        .enumerate()
        .map(|(i, (name, ctx))| {
            let config = TargetConfig::builder(*name, format!("ldap://{name}"))
                .naming_context(*ctx)
                .build()
                .unwrap();
            Target::from_config(TargetId::from_index(i), &config).unwrap()
        })
        .collect();
        let selector = CandidateSelector::new(TargetRegistry::new(targets));

        let (suffix, expected) = if people {
            ("ou=people,dc=example,dc=com", "people")
        } else {
            ("ou=groups,dc=example,dc=com", "groups")
        };
        let dn = Dn::parse(under(&rdns, suffix)).unwrap();

        let one = selector.select_one(&dn).unwrap();
        prop_assert_eq!(one.name().as_str(), expected);
        for scope in [Scope::Base, Scope::OneLevel, Scope::Subtree] {
            let all = selector.select_targets(&dn, scope).unwrap();
            prop_assert_eq!(all.len(), 1);
            prop_assert_eq!(all[0].name().as_str(), expected);
        }
    }
}

use super::*;
use kuadrant_policy_controller_core::{Locator, PathId};
use kuadrant_policy_controller_k8s_api::policy::{AuthPolicy, RateLimitPolicy};
use maplit::btreemap;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn mk_auth(ns: &str, name: &str, target: Value, rules: Value) -> AuthPolicy {
    let mut spec = rules;
    spec["targetRef"] = target;
    mk_policy(
        "kuadrant.io/v1",
        "AuthPolicy",
        ns,
        name,
        "2024-01-01T00:00:00Z",
        spec,
    )
}

fn auth_locator(ns: &str, name: &str) -> Locator {
    Locator::new("AuthPolicy", "kuadrant.io", Some(ns), name)
}

fn rule_path(rule: usize) -> PathId {
    PathId::new(&[
        Locator::from("gatewayclass.gateway.networking.k8s.io:istio"),
        Locator::from("gateway.gateway.networking.k8s.io:gw-ns/gw"),
        Locator::from("gateway.gateway.networking.k8s.io:gw-ns/gw#http"),
        Locator::from("httproute.gateway.networking.k8s.io:app-ns/toystore"),
        Locator::from(
            format!("httproute.gateway.networking.k8s.io:app-ns/toystore#rule-{rule}").as_str(),
        ),
    ])
}

/// Summarizes an effective policy as rule key => (source policy name, rule).
fn rules_by_source(effective: &EffectivePolicies<Value>, path: &PathId) -> BTreeMap<String, (String, Value)> {
    effective[path]
        .rules
        .iter()
        .map(|(key, rule)| {
            let source = rule.source.namespaced_name().to_string();
            (key.clone(), (source, rule.spec.clone()))
        })
        .collect()
}

#[test]
fn auth_overrides_and_defaults_across_three_levels() {
    let jwt = json!({ "jwt": { "issuerUrl": "https://sso.example.com" } });
    let admins_only = json!({ "patternMatching": { "patterns": [{ "predicate": "auth.identity.group == 'admins'" }] } });
    let admins_or_privileged = json!({ "patternMatching": { "patterns": [{ "predicate": "auth.identity.group in ['admins', 'privileged']" }] } });

    let mut test = TestConfig::with_gateway();
    test.insert(mk_route(
        "app-ns",
        "toystore",
        &["toys.example.com"],
        &["/toys", "/assets"],
    ))
    .insert(mk_auth(
        "gw-ns",
        "gw-auth",
        target("Gateway", "gw", None),
        json!({ "overrides": { "strategy": "merge", "rules": { "authentication": { "jwt": jwt } } } }),
    ))
    .insert(mk_auth(
        "app-ns",
        "route-auth",
        target("HTTPRoute", "toystore", None),
        json!({ "rules": { "authorization": { "admins": admins_only } } }),
    ))
    .insert(mk_auth(
        "app-ns",
        "rule-1-auth",
        target("HTTPRoute", "toystore", Some("rule-1")),
        json!({ "rules": { "authorization": { "admins": admins_or_privileged } } }),
    ));

    let state = State::compute(&test.topology());
    let effective = state.auth.effective.as_ref().expect("auth policies must be computed");
    assert_eq!(effective.len(), 2);

    assert_eq!(
        rules_by_source(effective, &rule_path(1)),
        btreemap! {
            "authentication#jwt".to_string() => ("gw-ns/gw-auth".to_string(), jwt.clone()),
            "authorization#admins".to_string() => ("app-ns/rule-1-auth".to_string(), admins_or_privileged),
        }
    );
    assert_eq!(
        rules_by_source(effective, &rule_path(2)),
        btreemap! {
            "authentication#jwt".to_string() => ("gw-ns/gw-auth".to_string(), jwt),
            "authorization#admins".to_string() => ("app-ns/route-auth".to_string(), admins_only),
        }
    );

    // The route policy is displaced on rule-1 only.
    let route = auth_locator("app-ns", "route-auth");
    assert!(!effective[&rule_path(1)].has_source(&route));
    assert!(effective[&rule_path(2)].has_source(&route));
}

#[test]
fn rejected_and_deleting_policies_do_not_apply() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_route("app-ns", "toystore", &[], &["/"]));

    // Targets a missing route.
    test.insert(mk_auth(
        "app-ns",
        "orphan",
        target("HTTPRoute", "missing", None),
        json!({ "rules": { "authentication": { "key": { "apiKey": {} } } } }),
    ));

    let mut deleting = mk_auth(
        "gw-ns",
        "deleting",
        target("Gateway", "gw", None),
        json!({ "rules": { "authentication": { "key": { "apiKey": {} } } } }),
    );
    deleting.metadata.deletion_timestamp = from_json(json!("2024-03-01T00:00:00Z"));
    test.insert(deleting);

    let state = State::compute(&test.topology());
    assert!(!state.auth.has_effective());
    assert!(state.ratelimit.effective.as_ref().is_some_and(|e| e.is_empty()));
}

#[test]
fn the_oldest_policy_on_a_target_is_closest_to_the_leaf() {
    let limit = |n: i64| json!({ "rates": [{ "limit": n, "window": "1m" }] });
    let mk_rlp = |name: &str, created: &str, n: i64| -> RateLimitPolicy {
        mk_policy(
            "kuadrant.io/v1",
            "RateLimitPolicy",
            "gw-ns",
            name,
            created,
            json!({ "targetRef": target("Gateway", "gw", None), "limits": { "global": limit(n) } }),
        )
    };

    let mut test = TestConfig::with_gateway();
    test.insert(mk_route("app-ns", "toystore", &["toys.example.com"], &["/"]))
        .insert(mk_rlp("newer", "2024-02-01T00:00:00Z", 10))
        .insert(mk_rlp("older", "2024-01-01T00:00:00Z", 5));

    let topology = test.topology();
    let state = State::compute(&topology);
    let effective = state
        .policy::<RateLimitPolicy>()
        .effective_policies()
        .collect::<Vec<_>>();
    assert_eq!(effective.len(), 1);
    assert_eq!(
        effective[0].source_policies,
        vec![Locator::new("RateLimitPolicy", "kuadrant.io", Some("gw-ns"), "older")]
    );

    // Recomputing an unchanged topology yields the same result.
    let again = State::compute(&topology);
    assert_eq!(state.ratelimit.effective, again.ratelimit.effective);
}

use super::*;
use kuadrant_policy_controller_core::{Locator, PolicyError, PolicyKind};
use kuadrant_policy_controller_k8s_api::{
    cert_manager::ClusterIssuer,
    policy::{AuthPolicy, RateLimitPolicy, TLSPolicy},
};
use pretty_assertions::assert_eq;

fn mk_tls(name: &str, created: &str, issuer: &str) -> TLSPolicy {
    mk_policy(
        "kuadrant.io/v1",
        "TLSPolicy",
        "gw-ns",
        name,
        created,
        json!({
            "targetRef": target("Gateway", "gw", None),
            "issuerRef": { "name": issuer, "kind": "ClusterIssuer" },
        }),
    )
}

fn mk_cluster_issuer(name: &str) -> ClusterIssuer {
    from_json(json!({
        "apiVersion": "cert-manager.io/v1",
        "kind": "ClusterIssuer",
        "metadata": { "name": name },
        "spec": {},
    }))
}

fn tls_locator(name: &str) -> Locator {
    Locator::new("TLSPolicy", "kuadrant.io", Some("gw-ns"), name)
}

#[test]
fn the_oldest_exclusive_policy_wins() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_cluster_issuer("letsencrypt"))
        .insert(mk_tls("tls-b", "2024-02-01T00:00:00Z", "letsencrypt"))
        .insert(mk_tls("tls-a", "2024-01-01T00:00:00Z", "letsencrypt"));

    let validations = validate::validate::<TLSPolicy>(&test.topology());
    assert!(validations.is_accepted(&tls_locator("tls-a")));
    assert_eq!(
        validations.error(&tls_locator("tls-b")),
        Some(&PolicyError::Conflict {
            kind: PolicyKind::Tls,
            existing: "gw-ns/tls-a".to_string(),
        })
    );
}

#[test]
fn tls_policies_need_an_existing_issuer() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_tls("tls", "2024-01-01T00:00:00Z", "missing"));

    let validations = validate::validate::<TLSPolicy>(&test.topology());
    assert!(matches!(
        validations.error(&tls_locator("tls")),
        Some(PolicyError::Invalid { kind: PolicyKind::Tls, .. })
    ));
}

#[test]
fn unresolved_targets_are_not_found() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_policy::<AuthPolicy>(
        "kuadrant.io/v1",
        "AuthPolicy",
        "app-ns",
        "toystore",
        "2024-01-01T00:00:00Z",
        json!({ "targetRef": target("HTTPRoute", "toystore", None) }),
    ));

    let validations = validate::validate::<AuthPolicy>(&test.topology());
    let locator = Locator::new("AuthPolicy", "kuadrant.io", Some("app-ns"), "toystore");
    assert_eq!(
        validations.error(&locator),
        Some(&PolicyError::TargetNotFound {
            kind: PolicyKind::Auth,
            target: "toystore".to_string(),
        })
    );
    assert_eq!(validations.len(), 1);
}

#[test]
fn missing_dependencies_come_first() {
    let mut test = TestConfig::default();
    test.dependencies.authorino = false;
    test.insert(mk_policy::<AuthPolicy>(
        "kuadrant.io/v1",
        "AuthPolicy",
        "app-ns",
        "toystore",
        "2024-01-01T00:00:00Z",
        json!({ "targetRef": target("HTTPRoute", "toystore", None) }),
    ));

    let validations = validate::validate::<AuthPolicy>(&test.topology());
    let (_, error) = validations.iter().next().expect("policy must be validated");
    assert!(matches!(
        error,
        Some(PolicyError::DependencyNotInstalled { dependency, .. }) if dependency == "Authorino"
    ));
}

#[test]
fn ambiguous_specs_are_invalid() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_policy::<RateLimitPolicy>(
        "kuadrant.io/v1",
        "RateLimitPolicy",
        "gw-ns",
        "gw-rlp",
        "2024-01-01T00:00:00Z",
        json!({
            "targetRef": target("Gateway", "gw", None),
            "limits": { "a": { "rates": [{ "limit": 1, "window": "1s" }] } },
            "defaults": { "limits": { "b": { "rates": [{ "limit": 2, "window": "1s" }] } } },
        }),
    ));

    let validations = validate::validate::<RateLimitPolicy>(&test.topology());
    let locator = Locator::new("RateLimitPolicy", "kuadrant.io", Some("gw-ns"), "gw-rlp");
    assert_eq!(
        validations.error(&locator).map(PolicyError::reason),
        Some("Invalid")
    );
}

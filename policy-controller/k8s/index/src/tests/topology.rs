use super::*;
use crate::topology::{gateway_addresses, listeners, CertificateRef, GatewayAddress};
use kuadrant_policy_controller_core::route_match::HttpRouteMatch;
use kuadrant_policy_controller_k8s_api::policy::LocalPolicyTargetReference;
use pretty_assertions::assert_eq;

fn local_target(kind: &str, name: &str, section: Option<&str>) -> LocalPolicyTargetReference {
    from_json(target(kind, name, section))
}

#[test]
fn routes_attach_to_listeners_with_matching_hostnames() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_route(
        "app-ns",
        "toystore",
        &["toys.example.com"],
        &["/toys", "/assets"],
    ));
    let topology = test.topology();

    assert_eq!(topology.listener_paths().len(), 2);

    // Only the `http` listener accepts the route's hostname.
    let ids = topology
        .route_paths()
        .iter()
        .map(|p| p.id().to_string())
        .collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            "gatewayclass.gateway.networking.k8s.io:istio|gateway.gateway.networking.k8s.io:gw-ns/gw|gateway.gateway.networking.k8s.io:gw-ns/gw#http|httproute.gateway.networking.k8s.io:app-ns/toystore|httproute.gateway.networking.k8s.io:app-ns/toystore#rule-1",
            "gatewayclass.gateway.networking.k8s.io:istio|gateway.gateway.networking.k8s.io:gw-ns/gw|gateway.gateway.networking.k8s.io:gw-ns/gw#http|httproute.gateway.networking.k8s.io:app-ns/toystore|httproute.gateway.networking.k8s.io:app-ns/toystore#rule-2",
        ]
    );

    let rule2 = &topology.route_paths()[1];
    assert_eq!(rule2.hostnames(), vec!["toys.example.com".to_string()]);
    assert_eq!(rule2.controller_name(), ISTIO);
    assert_eq!(
        rule2.matches(),
        vec![HttpRouteMatch::from_json(
            &json!({ "path": { "type": "PathPrefix", "value": "/assets" } })
        )]
    );
}

#[test]
fn routes_without_a_matching_parent_are_detached() {
    let mut test = TestConfig::with_gateway();
    let mut route = mk_route("app-ns", "toystore", &[], &["/"]);
    route.spec.parent_refs = Some(vec![from_json(json!({
        "namespace": "gw-ns",
        "name": "gw",
        "sectionName": "missing",
    }))]);
    test.insert(route);

    assert!(test.topology().route_paths().is_empty());
}

#[test]
fn resolves_targets_and_sections() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_route("app-ns", "toystore", &[], &["/toys", "/assets"]));
    let topology = test.topology();

    let gw = topology.target_locator(&local_target("Gateway", "gw", None), "gw-ns");
    assert_eq!(
        gw.map(|l| l.to_string()).as_deref(),
        Some("gateway.gateway.networking.k8s.io:gw-ns/gw")
    );

    let listener = topology.target_locator(&local_target("Gateway", "gw", Some("api")), "gw-ns");
    assert_eq!(
        listener.map(|l| l.to_string()).as_deref(),
        Some("gateway.gateway.networking.k8s.io:gw-ns/gw#api")
    );

    let rule = topology.target_locator(
        &local_target("HTTPRoute", "toystore", Some("rule-2")),
        "app-ns",
    );
    assert_eq!(
        rule.map(|l| l.to_string()).as_deref(),
        Some("httproute.gateway.networking.k8s.io:app-ns/toystore#rule-2")
    );

    assert!(topology
        .target_locator(&local_target("HTTPRoute", "toystore", Some("rule-3")), "app-ns")
        .is_none());
    assert!(topology
        .target_locator(&local_target("Gateway", "gw", None), "app-ns")
        .is_none());
}

#[test]
fn renders_policies_in_the_dot_graph() {
    let mut test = TestConfig::with_gateway();
    test.insert(mk_policy::<kuadrant_policy_controller_k8s_api::policy::AuthPolicy>(
        "kuadrant.io/v1",
        "AuthPolicy",
        "gw-ns",
        "gw-auth",
        "2024-01-01T00:00:00Z",
        json!({ "targetRef": target("Gateway", "gw", None) }),
    ));
    let dot = test.topology().to_dot().expect("dot must render");

    assert!(dot.starts_with("digraph {\n"));
    assert!(dot.contains(
        "\"authpolicy.kuadrant.io:gw-ns/gw-auth\" -> \"gateway.gateway.networking.k8s.io:gw-ns/gw\";"
    ));
    assert!(dot.contains(
        "\"gateway.gateway.networking.k8s.io:gw-ns/gw\" -> \"gateway.gateway.networking.k8s.io:gw-ns/gw#api\";"
    ));
}

#[test]
fn named_rules_are_targeted_by_name() {
    let mut test = TestConfig::with_gateway();
    let mut route = mk_route("app-ns", "toystore", &[], &["/toys", "/assets"]);
    if let Some(rules) = route.spec.rules.as_mut() {
        rules[0].name = Some("toys".to_string());
    }
    test.insert(route);
    let topology = test.topology();

    let named = topology.target_locator(
        &local_target("HTTPRoute", "toystore", Some("toys")),
        "app-ns",
    );
    assert_eq!(
        named.map(|l| l.to_string()).as_deref(),
        Some("httproute.gateway.networking.k8s.io:app-ns/toystore#toys")
    );
    // Unnamed rules keep their positional name.
    assert!(topology
        .target_locator(&local_target("HTTPRoute", "toystore", Some("rule-2")), "app-ns")
        .is_some());
    assert!(topology
        .target_locator(&local_target("HTTPRoute", "toystore", Some("rule-1")), "app-ns")
        .is_none());
}

#[test]
fn reads_listener_certificates_and_status_addresses() {
    let gw: gateway::Gateway = from_json(json!({
        "apiVersion": GATEWAY_API_VERSION,
        "kind": "Gateway",
        "metadata": { "namespace": "gw-ns", "name": "gw" },
        "spec": {
            "gatewayClassName": "istio",
            "listeners": [{
                "name": "https",
                "port": 443,
                "protocol": "HTTPS",
                "hostname": "*.example.com",
                "tls": { "certificateRefs": [{ "name": "wildcard" }] },
            }],
        },
        "status": {
            "addresses": [
                { "type": "IPAddress", "value": "10.0.0.1" },
                { "value": "lb.example.com" },
            ],
        },
    }));

    let listeners = listeners(&gw);
    assert_eq!(
        listeners[0].certificate_refs,
        vec![CertificateRef {
            group: String::new(),
            kind: "Secret".to_string(),
            name: "wildcard".to_string(),
            namespace: None,
        }]
    );
    assert!(listeners[0].is_tls());

    assert_eq!(
        gateway_addresses(&gw),
        vec![
            GatewayAddress {
                type_: Some("IPAddress".to_string()),
                value: "10.0.0.1".to_string(),
            },
            GatewayAddress {
                type_: None,
                value: "lb.example.com".to_string(),
            },
        ]
    );
}

mod effective;
mod topology;
mod validation;

use super::*;
use kuadrant_policy_controller_k8s_api::gateway;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

const GATEWAY_API_VERSION: &str = "gateway.networking.k8s.io/v1";
const ISTIO: &str = "istio.io/gateway-controller";

struct TestConfig {
    resources: Resources,
    dependencies: Dependencies,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            resources: Resources::default(),
            dependencies: Dependencies {
                gateway_api: true,
                istio: true,
                envoy_gateway: false,
                authorino: true,
                limitador: true,
                cert_manager: true,
                dns_operator: true,
            },
        }
    }
}

impl TestConfig {
    /// A GatewayClass `istio` with a Gateway `gw-ns/gw` listening on
    /// `*.example.com` and `api.other.io`.
    fn with_gateway() -> Self {
        let mut test = Self::default();
        test.resources.insert(mk_gateway_class("istio", ISTIO));
        test.resources.insert(mk_gateway(
            "gw-ns",
            "gw",
            "istio",
            &[("http", 80, Some("*.example.com")), ("api", 443, Some("api.other.io"))],
        ));
        test
    }

    fn insert<T: Indexed>(&mut self, resource: T) -> &mut Self {
        self.resources.insert(resource);
        self
    }

    fn topology(&self) -> Topology {
        Topology::new(self.resources.clone(), self.dependencies)
    }
}

fn from_json<T: DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("fixture must deserialize")
}

fn mk_gateway_class(name: &str, controller: &str) -> gateway::GatewayClass {
    from_json(json!({
        "apiVersion": GATEWAY_API_VERSION,
        "kind": "GatewayClass",
        "metadata": { "name": name },
        "spec": { "controllerName": controller },
    }))
}

fn mk_gateway(
    ns: &str,
    name: &str,
    class: &str,
    listeners: &[(&str, i32, Option<&str>)],
) -> gateway::Gateway {
    let listeners = listeners
        .iter()
        .map(|(name, port, hostname)| {
            let mut listener = json!({ "name": name, "port": port, "protocol": "HTTP" });
            if let Some(hostname) = hostname {
                listener["hostname"] = json!(hostname);
            }
            listener
        })
        .collect::<Vec<_>>();
    from_json(json!({
        "apiVersion": GATEWAY_API_VERSION,
        "kind": "Gateway",
        "metadata": { "namespace": ns, "name": name },
        "spec": { "gatewayClassName": class, "listeners": listeners },
    }))
}

/// A route attached to `gw-ns/gw` with one rule per path prefix.
fn mk_route(ns: &str, name: &str, hostnames: &[&str], prefixes: &[&str]) -> gateway::HTTPRoute {
    let rules = prefixes
        .iter()
        .map(|prefix| json!({ "matches": [{ "path": { "type": "PathPrefix", "value": prefix } }] }))
        .collect::<Vec<_>>();
    from_json(json!({
        "apiVersion": GATEWAY_API_VERSION,
        "kind": "HTTPRoute",
        "metadata": { "namespace": ns, "name": name },
        "spec": {
            "parentRefs": [{ "namespace": "gw-ns", "name": "gw" }],
            "hostnames": hostnames,
            "rules": rules,
        },
    }))
}

fn mk_policy<P: DeserializeOwned>(
    api_version: &str,
    kind: &str,
    ns: &str,
    name: &str,
    created: &str,
    spec: Value,
) -> P {
    from_json(json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {
            "namespace": ns,
            "name": name,
            "uid": format!("{ns}-{name}"),
            "creationTimestamp": created,
        },
        "spec": spec,
    }))
}

fn target(kind: &str, name: &str, section: Option<&str>) -> Value {
    let mut target = json!({ "group": "gateway.networking.k8s.io", "kind": kind, "name": name });
    if let Some(section) = section {
        target["sectionName"] = json!(section);
    }
    target
}

mod reconcile;

use crate::{client::ClientError, ResourceClient};
use kuadrant_policy_controller_core::{
    config::{DnsDefaults, WasmConfig},
    Config, GatewayControllers, ResourceId,
};
use kuadrant_policy_controller_k8s_api::Resource;
use kuadrant_policy_controller_k8s_index::{Dependencies, Indexed, Resources, State, Topology};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{collections::BTreeMap, time::Duration};

const GATEWAY_API_VERSION: &str = "gateway.networking.k8s.io/v1";
const ISTIO: &str = "istio.io/gateway-controller";
const KUADRANT_NS: &str = "kuadrant-system";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Create(String, ResourceId),
    Update(String, ResourceId),
    Delete(String, ResourceId),
}

impl Call {
    fn create(kind: &str, ns: &str, name: &str) -> Self {
        Self::Create(kind.to_string(), ResourceId::new(ns, name))
    }

    fn update(kind: &str, ns: &str, name: &str) -> Self {
        Self::Update(kind.to_string(), ResourceId::new(ns, name))
    }

    fn delete(kind: &str, ns: &str, name: &str) -> Self {
        Self::Delete(kind.to_string(), ResourceId::new(ns, name))
    }
}

/// Records every write and keeps written objects as JSON.
#[derive(Default)]
struct FakeClient {
    objects: Mutex<BTreeMap<(String, ResourceId), Value>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeClient {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn object<T: Resource<DynamicType = ()> + DeserializeOwned>(&self, namespace: &str, name: &str) -> Option<T> {
        let key = (T::kind(&()).to_string(), ResourceId::new(namespace, name));
        let value = self.objects.lock().get(&key).cloned()?;
        Some(serde_json::from_value(value).expect("stored object must deserialize"))
    }
}

fn id_of<T: Resource<DynamicType = ()>>(resource: &T) -> ResourceId {
    kuadrant_policy_controller_k8s_index::resource_id(resource)
}

#[async_trait::async_trait]
impl<T> ResourceClient<T> for FakeClient
where
    T: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>, ClientError> {
        Ok(self.object(namespace, name))
    }

    async fn create(&self, resource: &T) -> Result<(), ClientError> {
        let id = id_of(resource);
        self.calls.lock().push(Call::Create(T::kind(&()).to_string(), id.clone()));
        let value = serde_json::to_value(resource).map_err(|e| ClientError::Other(e.to_string()))?;
        let mut objects = self.objects.lock();
        let key = (T::kind(&()).to_string(), id);
        if objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists);
        }
        objects.insert(key, value);
        Ok(())
    }

    async fn update(&self, resource: &T) -> Result<(), ClientError> {
        let id = id_of(resource);
        self.calls.lock().push(Call::Update(T::kind(&()).to_string(), id.clone()));
        let value = serde_json::to_value(resource).map_err(|e| ClientError::Other(e.to_string()))?;
        self.objects.lock().insert((T::kind(&()).to_string(), id), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        let id = ResourceId::new(namespace, name);
        self.calls.lock().push(Call::Delete(T::kind(&()).to_string(), id.clone()));
        match self.objects.lock().remove(&(T::kind(&()).to_string(), id)) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound),
        }
    }
}

struct TestConfig {
    resources: Resources,
    dependencies: Dependencies,
}

impl TestConfig {
    /// A Kuadrant CR, an Istio GatewayClass and a Gateway `gw-ns/gw` with a
    /// single `*.example.com` listener.
    fn with_gateway() -> Self {
        let mut test = Self {
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
        };
        test.insert(mk_kuadrant(json!({})));
        test.insert(from_json::<kuadrant_policy_controller_k8s_api::gateway::GatewayClass>(json!({
            "apiVersion": GATEWAY_API_VERSION,
            "kind": "GatewayClass",
            "metadata": { "name": "istio" },
            "spec": { "controllerName": ISTIO },
        })));
        test.insert(mk_gateway(json!([
            { "name": "http", "port": 80, "protocol": "HTTP", "hostname": "*.example.com" },
        ])));
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

fn config() -> Config {
    Config {
        operator_namespace: KUADRANT_NS.to_string(),
        gateway_controllers: GatewayControllers::default(),
        wasm: WasmConfig {
            image: "oci://quay.io/kuadrant/wasm-shim:latest".to_string(),
            protected_registry: "registry.redhat.io".to_string(),
        },
        dns: DnsDefaults {
            ttl: Duration::from_secs(60),
            lb_ttl: Duration::from_secs(300),
        },
    }
}

fn from_json<T: DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).expect("fixture must deserialize")
}

fn mk_kuadrant(spec: Value) -> kuadrant_policy_controller_k8s_api::kuadrant::Kuadrant {
    from_json(json!({
        "apiVersion": "kuadrant.io/v1beta1",
        "kind": "Kuadrant",
        "metadata": { "namespace": KUADRANT_NS, "name": "kuadrant" },
        "spec": spec,
    }))
}

fn mk_gateway(listeners: Value) -> kuadrant_policy_controller_k8s_api::gateway::Gateway {
    from_json(json!({
        "apiVersion": GATEWAY_API_VERSION,
        "kind": "Gateway",
        "metadata": { "namespace": "gw-ns", "name": "gw" },
        "spec": { "gatewayClassName": "istio", "listeners": listeners },
    }))
}

fn mk_route() -> kuadrant_policy_controller_k8s_api::gateway::HTTPRoute {
    from_json(json!({
        "apiVersion": GATEWAY_API_VERSION,
        "kind": "HTTPRoute",
        "metadata": { "namespace": "app-ns", "name": "toystore" },
        "spec": {
            "parentRefs": [{ "namespace": "gw-ns", "name": "gw" }],
            "hostnames": ["toys.example.com"],
            "rules": [{ "matches": [{ "path": { "type": "PathPrefix", "value": "/toys" } }] }],
        },
    }))
}

fn mk_policy<P: DeserializeOwned>(kind: &str, name: &str, target: Value, spec: Value) -> P {
    let mut spec = spec;
    spec["targetRef"] = target;
    from_json(json!({
        "apiVersion": "kuadrant.io/v1",
        "kind": kind,
        "metadata": {
            "namespace": "app-ns",
            "name": name,
            "uid": format!("app-ns-{name}"),
            "creationTimestamp": "2024-01-01T00:00:00Z",
        },
        "spec": spec,
    }))
}

fn route_target() -> Value {
    json!({ "group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "toystore" })
}

/// A topology with the toystore route protected by JWT auth and limited by
/// a global limit and a per-user limit.
fn toystore() -> TestConfig {
    use kuadrant_policy_controller_k8s_api::policy::{AuthPolicy, RateLimitPolicy};

    let mut test = TestConfig::with_gateway();
    test.insert(mk_route());
    test.insert(mk_policy::<AuthPolicy>(
        "AuthPolicy",
        "toystore-auth",
        route_target(),
        json!({
            "rules": {
                "authentication": {
                    "jwt": { "jwt": { "issuerUrl": "https://sso.example.com" } },
                },
            },
        }),
    ));
    test.insert(mk_policy::<RateLimitPolicy>(
        "RateLimitPolicy",
        "toystore-rl",
        route_target(),
        json!({
            "limits": {
                "global": { "rates": [{ "limit": 100, "window": "1m" }] },
                "per-user": {
                    "rates": [{ "limit": 5, "window": "10s" }],
                    "counters": [{ "expression": "auth.identity.username" }],
                },
            },
        }),
    ));
    test
}

fn compute(topology: &Topology) -> State {
    State::compute(topology)
}

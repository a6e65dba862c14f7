use crate::StatusCondition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The root object of a Kuadrant installation. Everything the controller
/// derives hangs off the single Kuadrant CR in the cluster.
#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1beta1",
    kind = "Kuadrant",
    status = "KuadrantStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct KuadrantSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<Observability>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtls: Option<Mtls>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Observability {
    #[serde(default)]
    pub enable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<Tracing>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tracing {
    /// Collector URL, e.g. `rpc://jaeger-collector.observability:4317`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_endpoint: Option<String>,

    #[serde(default)]
    pub insecure: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Mtls {
    #[serde(default)]
    pub enable: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KuadrantStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,
}

impl KuadrantSpec {
    pub fn mtls_enabled(&self) -> bool {
        self.mtls.as_ref().map(|m| m.enable).unwrap_or(false)
    }

    pub fn tracing_endpoint(&self) -> Option<&str> {
        self.observability
            .as_ref()?
            .tracing
            .as_ref()?
            .default_endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
    }
}

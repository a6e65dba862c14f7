use super::{LocalPolicyTargetReference, PolicyStatus};
use crate::K8sDuration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1",
    kind = "TLSPolicy",
    status = "PolicyStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TLSPolicySpec {
    /// A Gateway, optionally narrowed to one listener.
    pub target_ref: LocalPolicyTargetReference,

    pub issuer_ref: IssuerRef,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<K8sDuration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
}

/// A cert-manager `Issuer` in the policy namespace or a `ClusterIssuer`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_policy: Option<String>,
}

impl IssuerRef {
    pub const ISSUER: &'static str = "Issuer";
    pub const CLUSTER_ISSUER: &'static str = "ClusterIssuer";
    pub const GROUP: &'static str = "cert-manager.io";

    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or(Self::ISSUER)
    }

    pub fn is_cluster_issuer(&self) -> bool {
        self.kind() == Self::CLUSTER_ISSUER
    }
}

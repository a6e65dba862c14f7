use super::{LocalPolicyTargetReference, MergeStrategy, PolicyStatus};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Authorino rule payloads are opaque to the controller; they are carried as
/// JSON and copied into the generated `AuthConfig` as-is.
pub type AuthRuleSpec = Value;

#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1",
    kind = "AuthPolicy",
    status = "PolicyStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicySpec {
    pub target_ref: LocalPolicyTargetReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<MergeableAuthPolicySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<MergeableAuthPolicySpec>,

    #[serde(flatten)]
    pub proper: AuthPolicySpecProper,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeableAuthPolicySpec {
    #[serde(default)]
    pub strategy: MergeStrategy,

    #[serde(flatten)]
    pub proper: AuthPolicySpecProper,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicySpecProper {
    /// Named pattern sets that `when` conditions and authorization rules may
    /// refer to.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub patterns: BTreeMap<String, Vec<Value>>,

    /// Overall conditions for the policy. Entries carrying a `predicate` are
    /// CEL and are enforced by the gateway; the rest are Authorino pattern
    /// expressions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<AuthScheme>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthScheme {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authentication: BTreeMap<String, AuthRuleSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, AuthRuleSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub authorization: BTreeMap<String, AuthRuleSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub callbacks: BTreeMap<String, AuthRuleSpec>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unauthenticated: Option<AuthRuleSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unauthorized: Option<AuthRuleSpec>,

    #[serde(default)]
    pub success: SuccessResponseSpec,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponseSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, AuthRuleSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, AuthRuleSpec>,
}

impl AuthPolicySpec {
    /// Both `defaults` and `overrides` are mutually exclusive with the bare
    /// spec and with each other.
    pub fn is_ambiguous(&self) -> bool {
        let bare = !self.proper.is_empty();
        [bare, self.defaults.is_some(), self.overrides.is_some()]
            .iter()
            .filter(|set| **set)
            .count()
            > 1
    }
}

impl AuthPolicySpecProper {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.when.is_empty() && self.rules.is_none()
    }
}

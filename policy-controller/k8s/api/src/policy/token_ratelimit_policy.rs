use super::{
    ratelimit_policy::{MergeableRateLimitPolicySpec, RateLimitPolicySpecProper},
    LocalPolicyTargetReference, PolicyStatus,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Limits on tokens reported by an upstream model server rather than on
/// requests. Shares its limit shape with `RateLimitPolicy`.
#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1alpha1",
    kind = "TokenRateLimitPolicy",
    status = "PolicyStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TokenRateLimitPolicySpec {
    pub target_ref: LocalPolicyTargetReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<MergeableRateLimitPolicySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<MergeableRateLimitPolicySpec>,

    #[serde(flatten)]
    pub proper: RateLimitPolicySpecProper,
}

impl TokenRateLimitPolicySpec {
    pub fn is_ambiguous(&self) -> bool {
        let bare = !self.proper.is_empty();
        [bare, self.defaults.is_some(), self.overrides.is_some()]
            .iter()
            .filter(|set| **set)
            .count()
            > 1
    }
}

pub mod auth_policy;
pub mod dns_policy;
pub mod ratelimit_policy;
pub mod target_ref;
pub mod tls_policy;
pub mod token_ratelimit_policy;

pub use self::{
    auth_policy::{AuthPolicy, AuthPolicySpec, AuthPolicySpecProper, AuthScheme},
    dns_policy::{DNSPolicy, DNSPolicySpec, LoadBalancingSpec},
    ratelimit_policy::{Counter, Limit, Rate, RateLimitPolicy, RateLimitPolicySpec},
    target_ref::LocalPolicyTargetReference,
    tls_policy::{TLSPolicy, TLSPolicySpec},
    token_ratelimit_policy::{TokenRateLimitPolicy, TokenRateLimitPolicySpec},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "kuadrant.io";

/// Status shared by every Kuadrant policy kind.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// How a `defaults` or `overrides` block combines with the policies it
/// applies to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// The whole block replaces, or is replaced by, the other side.
    #[default]
    Atomic,
    /// Rules are combined one by one, keyed by rule name.
    Merge,
}

/// A CEL predicate gating a rule.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub struct WhenPredicate {
    pub predicate: String,
}

impl From<&str> for WhenPredicate {
    fn from(predicate: &str) -> Self {
        Self {
            predicate: predicate.to_string(),
        }
    }
}

impl PolicyStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

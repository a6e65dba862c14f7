use super::{LocalPolicyTargetReference, MergeStrategy, PolicyStatus, WhenPredicate};
use crate::K8sDuration;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Clone, Debug, Default, PartialEq, kube::CustomResource, Deserialize, Serialize, JsonSchema,
)]
#[kube(
    group = "kuadrant.io",
    version = "v1",
    kind = "RateLimitPolicy",
    status = "PolicyStatus",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicySpec {
    pub target_ref: LocalPolicyTargetReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<MergeableRateLimitPolicySpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<MergeableRateLimitPolicySpec>,

    #[serde(flatten)]
    pub proper: RateLimitPolicySpecProper,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeableRateLimitPolicySpec {
    #[serde(default)]
    pub strategy: MergeStrategy,

    #[serde(flatten)]
    pub proper: RateLimitPolicySpecProper,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicySpecProper {
    /// Predicates gating every limit of the policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenPredicate>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Limit>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Limit {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<WhenPredicate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub counters: Vec<Counter>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rates: Vec<Rate>,
}

/// A CEL expression whose value qualifies the counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub struct Counter {
    pub expression: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rate {
    pub limit: i64,
    pub window: K8sDuration,
}

impl Rate {
    /// Returns `(max_value, seconds)` as Limitador expects them. Negative
    /// windows count as zero seconds.
    pub fn to_seconds(&self) -> (i64, u64) {
        (self.limit, self.window.whole_seconds().unwrap_or(0))
    }
}

impl RateLimitPolicySpec {
    pub fn is_ambiguous(&self) -> bool {
        let bare = !self.proper.is_empty();
        [bare, self.defaults.is_some(), self.overrides.is_some()]
            .iter()
            .filter(|set| **set)
            .count()
            > 1
    }
}

impl RateLimitPolicySpecProper {
    pub fn is_empty(&self) -> bool {
        self.when.is_empty() && self.limits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_convert_to_limitador_seconds() {
        let rate = Rate {
            limit: 50,
            window: "1m".parse().unwrap(),
        };
        assert_eq!(rate.to_seconds(), (50, 60));

        let rate = Rate {
            limit: 5,
            window: "10s500ms".parse().unwrap(),
        };
        assert_eq!(rate.to_seconds(), (5, 10));
    }

    #[test]
    fn deserializes_bare_limits() {
        let spec: RateLimitPolicySpec = serde_json::from_value(serde_json::json!({
            "targetRef": {
                "group": "gateway.networking.k8s.io",
                "kind": "HTTPRoute",
                "name": "toystore",
            },
            "limits": {
                "toys": {
                    "rates": [{ "limit": 50, "window": "1m" }],
                    "counters": [{ "expression": "auth.identity.username" }],
                    "when": [{ "predicate": "request.method == 'POST'" }],
                },
            },
        }))
        .unwrap();

        let toys = &spec.proper.limits["toys"];
        assert_eq!(toys.rates.len(), 1);
        assert_eq!(toys.counters[0].expression, "auth.identity.username");
        assert!(spec.defaults.is_none());
        assert!(!spec.is_ambiguous());
    }
}

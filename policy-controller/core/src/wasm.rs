//! The configuration consumed by the Kuadrant wasm shim.

use crate::{PathId, PolicyKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub const AUTH_SERVICE_NAME: &str = "auth-service";
pub const RATELIMIT_SERVICE_NAME: &str = "ratelimit-service";
pub const RATELIMIT_CHECK_SERVICE_NAME: &str = "ratelimit-check-service";
pub const RATELIMIT_REPORT_SERVICE_NAME: &str = "ratelimit-report-service";
pub const TRACING_SERVICE_NAME: &str = "tracing-service";

pub const AUTH_CLUSTER_NAME: &str = "kuadrant-auth-service";
pub const RATELIMIT_CLUSTER_NAME: &str = "kuadrant-ratelimit-service";
pub const TRACING_CLUSTER_NAME: &str = "kuadrant-tracing-service";

/// Data key through which token limits report consumed tokens.
pub const HITS_ADDEND_KEY: &str = "ratelimit.hits_addend";
pub const TOTAL_TOKENS_EXPRESSION: &str = "responseBodyJSON(\"/usage/total_tokens\")";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub services: BTreeMap<String, Service>,
    pub action_sets: Vec<ActionSet>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub request_data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<Observability>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(rename = "type")]
    pub type_: ServiceType,
    pub endpoint: String,
    pub failure_mode: FailureMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Auth,
    Ratelimit,
    RatelimitCheck,
    RatelimitReport,
    Tracing,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    Deny,
    Allow,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observability {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<TracingObservability>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingObservability {
    pub service: String,
}

/// The actions applied to requests matching a route rule on a set of
/// hostnames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSet {
    pub name: String,
    pub route_rule_conditions: RouteRuleConditions,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRuleConditions {
    pub hostnames: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "service")]
    pub service_name: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditional_data: Vec<ConditionalData>,
    /// The policy kind the action enforces. Not part of the shim config.
    #[serde(skip)]
    pub kind: Option<PolicyKind>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predicates: Vec<String>,
    #[serde(default)]
    pub data: Vec<DataItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataItem {
    Static(DataValue),
    Expression(DataValue),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValue {
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("duplicate key {key:?} with different values in merged {service} actions for scope {scope:?}")]
pub struct MergeError {
    pub key: String,
    pub service: String,
    pub scope: String,
}

/// Declares the services actions may call.
pub fn services(tracing: bool) -> BTreeMap<String, Service> {
    let svc = |type_, endpoint: &str, failure_mode, timeout: Option<&str>| Service {
        type_,
        endpoint: endpoint.to_string(),
        failure_mode,
        timeout: timeout.map(str::to_string),
    };

    let mut services = BTreeMap::new();
    services.insert(
        AUTH_SERVICE_NAME.to_string(),
        svc(ServiceType::Auth, AUTH_CLUSTER_NAME, FailureMode::Deny, Some("200ms")),
    );
    services.insert(
        RATELIMIT_SERVICE_NAME.to_string(),
        svc(
            ServiceType::Ratelimit,
            RATELIMIT_CLUSTER_NAME,
            FailureMode::Allow,
            Some("100ms"),
        ),
    );
    services.insert(
        RATELIMIT_CHECK_SERVICE_NAME.to_string(),
        svc(
            ServiceType::RatelimitCheck,
            RATELIMIT_CLUSTER_NAME,
            FailureMode::Allow,
            Some("100ms"),
        ),
    );
    services.insert(
        RATELIMIT_REPORT_SERVICE_NAME.to_string(),
        svc(
            ServiceType::RatelimitReport,
            RATELIMIT_CLUSTER_NAME,
            FailureMode::Allow,
            Some("100ms"),
        ),
    );
    if tracing {
        services.insert(
            TRACING_SERVICE_NAME.to_string(),
            svc(ServiceType::Tracing, TRACING_CLUSTER_NAME, FailureMode::Allow, None),
        );
    }
    services
}

/// Names the Authorino `AuthConfig` of a path. Also the scope of the path's
/// auth action.
pub fn auth_config_name(path: &PathId) -> String {
    hex::encode(Sha256::digest(path.as_str().as_bytes()))
}

pub fn action_set_name(path: &PathId, match_index: usize, hostname: &str) -> String {
    let digest = Sha256::digest(format!("{path}#{match_index}#{hostname}").as_bytes());
    hex::encode(digest)
}

// === impl Action ===

impl Action {
    pub fn new(kind: PolicyKind, service_name: &str, scope: impl Into<String>) -> Self {
        Self {
            service_name: service_name.to_string(),
            scope: scope.into(),
            predicates: vec![],
            conditional_data: vec![],
            kind: Some(kind),
        }
    }

    /// Every CEL expression the shim evaluates for this action.
    pub fn expressions(&self) -> impl Iterator<Item = &str> {
        let conditional = self.conditional_data.iter().flat_map(|cd| {
            let data = cd.data.iter().filter_map(|item| match item {
                DataItem::Expression(DataValue { value, .. }) => Some(value.as_str()),
                DataItem::Static(_) => None,
            });
            cd.predicates.iter().map(String::as_str).chain(data)
        });
        self.predicates
            .iter()
            .map(String::as_str)
            .chain(conditional)
    }

    fn can_merge(&self, other: &Action) -> bool {
        self.service_name != AUTH_SERVICE_NAME
            && self.service_name == other.service_name
            && self.scope == other.scope
    }

    fn merge(&mut self, mut other: Action) -> Result<(), MergeError> {
        if self.predicates != other.predicates {
            let own = std::mem::take(&mut self.predicates);
            push_down(&mut self.conditional_data, own);
            let theirs = std::mem::take(&mut other.predicates);
            push_down(&mut other.conditional_data, theirs);
        }

        for item in other.conditional_data.iter().flat_map(|cd| &cd.data) {
            let conflict = self
                .conditional_data
                .iter()
                .flat_map(|cd| &cd.data)
                .any(|existing| existing.key() == item.key() && existing != item);
            if conflict {
                return Err(MergeError {
                    key: item.key().to_string(),
                    service: self.service_name.clone(),
                    scope: self.scope.clone(),
                });
            }
        }

        self.conditional_data.extend(other.conditional_data);
        Ok(())
    }
}

fn push_down(blocks: &mut Vec<ConditionalData>, predicates: Vec<String>) {
    if predicates.is_empty() {
        return;
    }
    if blocks.is_empty() {
        blocks.push(ConditionalData::default());
    }
    for block in blocks.iter_mut() {
        let mut merged = predicates.clone();
        merged.append(&mut block.predicates);
        block.predicates = merged;
    }
}

impl DataItem {
    pub fn static_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Static(DataValue {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn expression(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Expression(DataValue {
            key: key.into(),
            value: value.into(),
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Static(DataValue { key, .. }) | Self::Expression(DataValue { key, .. }) => key,
        }
    }
}

/// Merges adjacent actions calling the same service with the same scope.
/// Auth actions are never merged. Predicates that differ between the merged
/// actions are pushed down into their conditional data blocks.
pub fn merge_and_verify(actions: Vec<Action>) -> Result<Vec<Action>, MergeError> {
    let mut merged: Vec<Action> = Vec::with_capacity(actions.len());
    for action in actions {
        match merged.last_mut() {
            Some(last) if last.can_merge(&action) => last.merge(action)?,
            _ => merged.push(action),
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ratelimit(scope: &str, predicates: &[&str], data: Vec<DataItem>) -> Action {
        Action {
            predicates: predicates.iter().map(|p| p.to_string()).collect(),
            conditional_data: vec![ConditionalData {
                predicates: vec![],
                data,
            }],
            ..Action::new(PolicyKind::RateLimit, RATELIMIT_SERVICE_NAME, scope)
        }
    }

    #[test]
    fn merges_adjacent_actions_with_same_scope_and_service() {
        let actions = vec![
            ratelimit("ns/route", &["p"], vec![DataItem::static_value("limit.a", "1")]),
            ratelimit("ns/route", &["p"], vec![DataItem::static_value("limit.b", "1")]),
            ratelimit("ns/other", &[], vec![DataItem::static_value("limit.c", "1")]),
        ];
        let merged = merge_and_verify(actions).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].predicates, vec!["p".to_string()]);
        let keys = merged[0]
            .conditional_data
            .iter()
            .flat_map(|cd| cd.data.iter().map(DataItem::key))
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["limit.a", "limit.b"]);
    }

    #[test]
    fn pushes_differing_predicates_down() {
        let actions = vec![
            ratelimit("ns/route", &["a"], vec![DataItem::static_value("limit.a", "1")]),
            ratelimit("ns/route", &["b"], vec![DataItem::static_value("limit.b", "1")]),
        ];
        let merged = merge_and_verify(actions).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].predicates.is_empty());
        assert_eq!(merged[0].conditional_data[0].predicates, vec!["a".to_string()]);
        assert_eq!(merged[0].conditional_data[1].predicates, vec!["b".to_string()]);
    }

    #[test]
    fn never_merges_auth_actions() {
        let auth = Action::new(PolicyKind::Auth, AUTH_SERVICE_NAME, "abc");
        let merged = merge_and_verify(vec![auth.clone(), auth]).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn rejects_conflicting_values_for_the_same_key() {
        let actions = vec![
            ratelimit("ns/route", &[], vec![DataItem::expression("user", "auth.identity.sub")]),
            ratelimit("ns/route", &[], vec![DataItem::expression("user", "request.headers['x-user']")]),
        ];
        let err = merge_and_verify(actions).unwrap_err();
        assert!(err.to_string().contains("duplicate key"), "{err}");
    }

    #[test]
    fn identical_assignments_are_not_conflicts() {
        let actions = vec![
            ratelimit("ns/route", &[], vec![DataItem::expression("user", "auth.identity.sub")]),
            ratelimit("ns/route", &[], vec![DataItem::expression("user", "auth.identity.sub")]),
        ];
        assert_eq!(merge_and_verify(actions).unwrap().len(), 1);
    }

    #[test]
    fn serializes_in_shim_format() {
        let action = Action {
            conditional_data: vec![ConditionalData {
                predicates: vec!["request.method == 'GET'".to_string()],
                data: vec![
                    DataItem::static_value("limit.toys__1a2b3c4d", "1"),
                    DataItem::expression("user", "auth.identity.username"),
                ],
            }],
            ..Action::new(PolicyKind::RateLimit, RATELIMIT_SERVICE_NAME, "toystore/toystore")
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({
                "service": "ratelimit-service",
                "scope": "toystore/toystore",
                "conditionalData": [{
                    "predicates": ["request.method == 'GET'"],
                    "data": [
                        { "static": { "key": "limit.toys__1a2b3c4d", "value": "1" } },
                        { "expression": { "key": "user", "value": "auth.identity.username" } },
                    ],
                }],
            })
        );
    }
}

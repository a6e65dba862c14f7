//! Builds the wasm shim configuration of every gateway from the effective
//! AuthPolicies, RateLimitPolicies and TokenRateLimitPolicies of the paths
//! going through it.
//!
//! Each path gets one list of actions, applied in order:
//!
//! 1. rate limits that don't depend on auth data;
//! 2. the auth check;
//! 3. rate limits that read `auth.*`;
//! 4. token rate limit checks, before the request is forwarded;
//! 5. token rate limit reports, once the response is known.
//!
//! The list is repeated in one action set per route match and hostname,
//! ordered from the most to the least specific.

use kuadrant_policy_controller_core::{
    cel::CelEnv,
    limitador::{limit_name_to_limitador_identifier, limits_namespace},
    route_match::{self, HttpRouteMatch},
    wasm::{self, Action, ActionSet, ConditionalData, DataItem, MergeError, RouteRuleConditions},
    EffectivePolicy, GatewayControllers, GatewayProvider, PathId, PolicyKind, ResourceId, Rules,
};
use kuadrant_policy_controller_k8s_api::ResourceExt;
use kuadrant_policy_controller_k8s_index::{
    policy::{self, RateLimitRule},
    resource_id, PolicyState, RoutePath, State, Topology,
};
use std::collections::BTreeMap;

/// Builds the wasm configuration of every gateway handled by `provider`.
///
/// Every such gateway gets an entry; gateways without any action set get a
/// configuration with none, which callers turn into a deletion. Actions
/// failing CEL validation are dropped and recorded in `state.cel_issues`;
/// paths whose actions conflict are skipped and recorded in
/// `state.wasm_conflicts`.
pub fn gateway_configs(
    topology: &Topology,
    state: &mut State,
    provider: GatewayProvider,
    controllers: &GatewayControllers,
) -> BTreeMap<ResourceId, wasm::Config> {
    let tracing = topology
        .kuadrant()
        .is_some_and(|k| k.spec.tracing_endpoint().is_some());

    let mut action_sets = topology
        .gateways_for(provider, controllers)
        .map(|gw| (resource_id(gw.as_ref()), Vec::new()))
        .collect::<BTreeMap<_, Vec<(String, HttpRouteMatch, ActionSet)>>>();

    for path in topology.route_paths() {
        let Some(sets) = action_sets.get_mut(&path.gateway_id()) else {
            continue;
        };

        let id = path.id();
        let actions = match path_actions(path, state) {
            Ok(actions) => actions,
            Err(error) => {
                tracing::warn!(path = %id, %error, "Skipping path with conflicting wasm actions");
                state.wasm_conflicts.insert(id, error);
                continue;
            }
        };
        if actions.is_empty() {
            continue;
        }

        let has_auth = actions.iter().any(|a| a.kind == Some(PolicyKind::Auth));
        let actions = CelEnv::new(has_auth).filter_actions(&id, actions, &mut state.cel_issues);
        if actions.is_empty() {
            continue;
        }

        for (index, route_match) in path.matches().into_iter().enumerate() {
            for hostname in path.hostnames() {
                let set = ActionSet {
                    name: wasm::action_set_name(&id, index, &hostname),
                    route_rule_conditions: RouteRuleConditions {
                        hostnames: vec![hostname.clone()],
                        predicates: route_match.predicates(),
                    },
                    actions: actions.clone(),
                };
                sets.push((hostname, route_match.clone(), set));
            }
        }
    }

    action_sets
        .into_iter()
        .map(|(gw, mut sets)| {
            route_match::sort_by_precedence(&mut sets, |(hostname, m, _)| (hostname.as_str(), m));
            let config = wasm::Config {
                services: wasm::services(tracing),
                action_sets: sets.into_iter().map(|(_, _, set)| set).collect(),
                observability: tracing.then(|| wasm::Observability {
                    tracing: Some(wasm::TracingObservability {
                        service: wasm::TRACING_SERVICE_NAME.to_string(),
                    }),
                }),
                ..Default::default()
            };
            (gw, config)
        })
        .collect()
}

/// Whether any action of the configuration calls one of `services`.
pub fn uses_service(config: &wasm::Config, services: &[&str]) -> bool {
    config
        .action_sets
        .iter()
        .flat_map(|set| &set.actions)
        .any(|action| services.contains(&action.service_name.as_str()))
}

/// The merged actions of one path.
pub fn path_actions(path: &RoutePath, state: &State) -> Result<Vec<Action>, MergeError> {
    let id = path.id();
    let auth = effective_on(&state.auth, &id);
    let ratelimit = effective_on(&state.ratelimit, &id);
    let token_ratelimit = effective_on(&state.token_ratelimit, &id);

    let route = path.route.as_ref();
    let scope = limits_namespace(
        &route.namespace().unwrap_or_default(),
        &route.name_unchecked(),
    );

    let (post_auth, mut actions) = ratelimit
        .map(|rl| {
            ratelimit_actions(
                PolicyKind::RateLimit,
                wasm::RATELIMIT_SERVICE_NAME,
                &scope,
                &rl.rules,
            )
        })
        .unwrap_or_default()
        .into_iter()
        .partition::<Vec<_>, _>(has_auth_access);

    if let Some(auth) = auth {
        let spec = policy::auth_spec(&auth.rules);
        actions.push(Action {
            predicates: policy::auth_predicates(&spec),
            ..Action::new(
                PolicyKind::Auth,
                wasm::AUTH_SERVICE_NAME,
                wasm::auth_config_name(&id),
            )
        });
    }
    actions.extend(post_auth);

    if let Some(trl) = token_ratelimit {
        let checks = ratelimit_actions(
            PolicyKind::TokenRateLimit,
            wasm::RATELIMIT_CHECK_SERVICE_NAME,
            &scope,
            &trl.rules,
        );
        let reports = checks
            .iter()
            .cloned()
            .map(|mut action| {
                action.service_name = wasm::RATELIMIT_REPORT_SERVICE_NAME.to_string();
                for block in &mut action.conditional_data {
                    block.data.push(DataItem::expression(
                        wasm::HITS_ADDEND_KEY,
                        wasm::TOTAL_TOKENS_EXPRESSION,
                    ));
                }
                action
            })
            .collect::<Vec<_>>();
        actions.extend(checks);
        actions.extend(reports);
    }

    wasm::merge_and_verify(actions)
}

/// One action per limit. The limit's descriptor is set only when the
/// top-level and the limit's own predicates hold.
fn ratelimit_actions(
    kind: PolicyKind,
    service: &str,
    scope: &str,
    rules: &Rules<RateLimitRule>,
) -> Vec<Action> {
    let top_level = policy::top_level_predicates(rules);
    policy::limits(rules)
        .map(|(name, limit, source)| {
            let identifier = limit_name_to_limitador_identifier(&source.resource_id(), name);
            let data = std::iter::once(DataItem::static_value(identifier, "1"))
                .chain(
                    limit
                        .counters
                        .iter()
                        .map(|c| DataItem::expression(c.expression.clone(), c.expression.clone())),
                )
                .collect();
            Action {
                predicates: top_level
                    .iter()
                    .chain(&limit.when)
                    .map(|w| w.predicate.clone())
                    .collect(),
                conditional_data: vec![ConditionalData {
                    predicates: vec![],
                    data,
                }],
                ..Action::new(kind, service, scope)
            }
        })
        .collect()
}

fn effective_on<'s, R>(state: &'s PolicyState<R>, path: &PathId) -> Option<&'s EffectivePolicy<R>> {
    state.effective.as_ref()?.get(path)
}

fn has_auth_access(action: &Action) -> bool {
    action.expressions().any(|expr| {
        expr.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .any(|token| token == "auth" || token.starts_with("auth."))
    })
}

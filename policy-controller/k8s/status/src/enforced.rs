//! Whether an accepted policy is enforced, derived from the same effective
//! policies the data plane was configured with and from the readiness of
//! the resources that enforce them.

use crate::conditions::Enforcement;
use kuadrant_policy_controller_core::{
    wasm, EffectivePolicy, GatewayControllers, GatewayProvider, Locator, PathId, PolicyError,
    PolicyKind, ResourceId,
};
use kuadrant_policy_controller_k8s_api::{
    authorino::AUTHORINO_NAME, limitador::LIMITADOR_NAME, ResourceExt,
};
use kuadrant_policy_controller_k8s_dataplane::{
    auth_cluster_name, dns, extension_name, ratelimit_cluster_name, tls,
};
use kuadrant_policy_controller_k8s_index::{
    effective, Artifact, KuadrantPolicy, PathScope, State, Topology,
};
use std::collections::BTreeSet;

/// What the status stage reads from a reconciliation pass.
pub struct Context<'a> {
    pub topology: &'a Topology,
    pub state: &'a State,
    pub controllers: &'a GatewayControllers,
}

/// Problems are reported in this order: a missing system resource, the
/// policy being fully overridden, no routes, CEL issues, conflicting wasm
/// actions, and finally components that haven't caught up yet.
pub fn enforcement<P: KuadrantPolicy>(
    ctx: &Context<'_>,
    policy: &P,
) -> Result<Enforcement, PolicyError> {
    let kind = P::KIND;
    if let Some(resource) = missing_system_resource(ctx.topology, kind) {
        return Err(PolicyError::SystemResourceMissing {
            kind,
            resource: resource.to_string(),
        });
    }

    let effective = P::state(ctx.state)
        .effective
        .as_ref()
        .ok_or_else(|| PolicyError::Unknown {
            kind,
            message: "effective policies were not computed".to_string(),
        })?;
    let namespace = policy.namespace().unwrap_or_default();
    let Some(target) = ctx.topology.target_locator(policy.target_ref(), &namespace) else {
        return Err(PolicyError::NoRoutes { kind });
    };

    let locator = policy.locator();
    let (_, rules) = policy.rules();
    let enforced_on = effective::sourced_from(effective, &locator)
        .map(EffectivePolicy::path_id)
        .collect::<BTreeSet<_>>();
    let overridden_by = overriding_policies(
        effective::through(effective, &target),
        &locator,
        rules.keys(),
    );

    if enforced_on.is_empty() && !rules.is_empty() && !overridden_by.is_empty() {
        return Err(PolicyError::Overridden {
            kind,
            by: overridden_by,
        });
    }
    let unreachable = enforced_on.is_empty() && !rules.is_empty();
    if unreachable || !has_paths(ctx.topology, P::SCOPE, &target) {
        return Err(PolicyError::NoRoutes { kind });
    }

    let issues = enforced_on
        .iter()
        .flat_map(|path| ctx.state.cel_issues.get(kind, path))
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>();
    if !issues.is_empty() {
        return Err(PolicyError::CelValidation {
            kind,
            issues: issues.into_iter().collect(),
        });
    }

    if kind.is_wasm_enforced() {
        let conflicts = enforced_on
            .iter()
            .filter_map(|path| ctx.state.wasm_conflicts.get(path))
            .map(ToString::to_string)
            .collect::<BTreeSet<_>>();
        if !conflicts.is_empty() {
            return Err(PolicyError::Unknown {
                kind,
                message: conflicts.into_iter().collect::<Vec<_>>().join("; "),
            });
        }
    }

    let components = out_of_sync(ctx, kind, &enforced_on);
    if !components.is_empty() {
        return Err(PolicyError::OutOfSync { kind, components });
    }

    if overridden_by.is_empty() {
        Ok(Enforcement::Full)
    } else {
        Ok(Enforcement::Partial { overridden_by })
    }
}

fn missing_system_resource(topology: &Topology, kind: PolicyKind) -> Option<&'static str> {
    let Some(kuadrant) = topology.kuadrant() else {
        return Some("Kuadrant");
    };
    let namespace = kuadrant.namespace().unwrap_or_default();
    let resources = topology.resources();
    match kind {
        PolicyKind::Auth => (!resources
            .authorinos
            .contains_key(&ResourceId::new(namespace, AUTHORINO_NAME)))
        .then_some("Authorino"),
        PolicyKind::RateLimit | PolicyKind::TokenRateLimit => (!resources
            .limitadors
            .contains_key(&ResourceId::new(namespace, LIMITADOR_NAME)))
        .then_some("Limitador"),
        PolicyKind::Tls | PolicyKind::Dns => None,
    }
}

/// The policies whose rules took the place of the given policy's rules on
/// paths through its target.
fn overriding_policies<'e, 'k, R: 'e>(
    through: impl Iterator<Item = &'e EffectivePolicy<R>>,
    policy: &Locator,
    keys: impl Iterator<Item = &'k String> + Clone,
) -> Vec<String> {
    let mut by = BTreeSet::new();
    for effective in through {
        for key in keys.clone() {
            match effective.rules.get(key) {
                Some(rule) if rule.source != *policy => {
                    by.insert(rule.source.namespaced_name().to_string());
                }
                Some(_) => {}
                // TODO(guicassolato): record the replaced sources when an atomic strategy
                // drops a rule set, so that only the replacing policy is
                // reported here.
                None => by.extend(
                    effective
                        .source_policies
                        .iter()
                        .filter(|s| *s != policy)
                        .map(|s| s.namespaced_name().to_string()),
                ),
            }
        }
    }
    by.into_iter().collect()
}

fn has_paths(topology: &Topology, scope: PathScope, target: &Locator) -> bool {
    match scope {
        PathScope::Routes => topology
            .route_paths()
            .iter()
            .any(|p| p.locators.contains(target)),
        PathScope::Listeners => topology
            .listener_paths()
            .iter()
            .any(|p| p.locators.contains(target)),
    }
}

/// The components enforcing the policy on the given paths that are not
/// ready, or were written to in this pass.
fn out_of_sync(ctx: &Context<'_>, kind: PolicyKind, paths: &BTreeSet<PathId>) -> Vec<String> {
    let resources = ctx.topology.resources();
    let namespace = ctx
        .topology
        .kuadrant()
        .and_then(|k| k.namespace())
        .unwrap_or_default();
    let mut components = BTreeSet::new();

    match kind {
        PolicyKind::Auth => {
            let authorino = resources
                .authorinos
                .get(&ResourceId::new(namespace.clone(), AUTHORINO_NAME));
            if !authorino.is_some_and(|a| a.is_ready()) {
                components.insert("Authorino".to_string());
            }
            for path in paths {
                let id = ResourceId::new(namespace.clone(), wasm::auth_config_name(path));
                if !resources.auth_configs.get(&id).is_some_and(|c| c.is_ready()) {
                    components.insert(format!("AuthConfig ({id})"));
                }
            }
        }
        PolicyKind::RateLimit | PolicyKind::TokenRateLimit => {
            let limitador = resources
                .limitadors
                .get(&ResourceId::new(namespace.clone(), LIMITADOR_NAME));
            if !limitador.is_some_and(|l| l.is_ready()) || ctx.state.modified.limitador_limits {
                components.insert("Limitador".to_string());
            }
        }
        PolicyKind::Tls => {
            for path in ctx.topology.listener_paths() {
                if !paths.contains(&path.id()) {
                    continue;
                }
                for secret in tls::secrets(path) {
                    if !resources.certificates.get(&secret).is_some_and(|c| c.is_ready()) {
                        components.insert(format!("Certificate ({secret})"));
                    }
                }
            }
        }
        PolicyKind::Dns => {
            for path in ctx.topology.listener_paths() {
                if !paths.contains(&path.id()) || path.listener.hostname.is_none() {
                    continue;
                }
                let id = ResourceId::new(path.gateway_id().namespace, dns::record_name(path));
                if !resources.dns_records.get(&id).is_some_and(|r| r.is_ready()) {
                    components.insert(format!("DNSRecord ({id})"));
                }
            }
        }
    }

    if kind.is_wasm_enforced() {
        for path in ctx.topology.route_paths() {
            if !paths.contains(&path.id()) {
                continue;
            }
            let Some(provider) = ctx.controllers.provider_for(path.controller_name()) else {
                continue;
            };
            let gw = path.gateway_id();
            if !gateway_in_sync(ctx, kind, provider, &gw) {
                components.insert(format!("{} ({gw})", provider.as_str()));
            }
        }
    }

    components.into_iter().collect()
}

/// Whether the gateway's extension and the cluster the policy kind calls
/// exist and were left untouched by this pass.
fn gateway_in_sync(
    ctx: &Context<'_>,
    kind: PolicyKind,
    provider: GatewayProvider,
    gw: &ResourceId,
) -> bool {
    let auth = kind == PolicyKind::Auth;
    let resources = ctx.topology.resources();
    let extension = ResourceId::new(gw.namespace.clone(), extension_name(gw));
    let cluster = ResourceId::new(
        gw.namespace.clone(),
        if auth {
            auth_cluster_name(gw)
        } else {
            ratelimit_cluster_name(gw)
        },
    );
    let (present, artifacts) = match provider {
        GatewayProvider::Istio => (
            resources.wasm_plugins.contains_key(&extension)
                && resources.envoy_filters.contains_key(&cluster),
            [
                Artifact::IstioExtension,
                if auth {
                    Artifact::IstioAuthCluster
                } else {
                    Artifact::IstioRateLimitCluster
                },
            ],
        ),
        GatewayProvider::EnvoyGateway => (
            resources.envoy_extension_policies.contains_key(&extension)
                && resources.envoy_patch_policies.contains_key(&cluster),
            [
                Artifact::EnvoyGatewayExtension,
                if auth {
                    Artifact::EnvoyGatewayAuthCluster
                } else {
                    Artifact::EnvoyGatewayRateLimitCluster
                },
            ],
        ),
    };
    present
        && !artifacts
            .into_iter()
            .any(|a| ctx.state.modified.is_modified(a, gw))
}

//! Configures Limitador with the limits of every effective RateLimitPolicy
//! and TokenRateLimitPolicy.

use crate::{client::ResourceClient, ReconcileError};
use kuadrant_policy_controller_core::{
    limitador::{self, RateLimitIndex},
    ResourceId, Rules,
};
use kuadrant_policy_controller_k8s_api::{
    limitador::{Limitador, LIMITADOR_NAME},
    ResourceExt,
};
use kuadrant_policy_controller_k8s_index::{
    policy::{self, RateLimitRule},
    PolicyState, State, Topology,
};

/// Every limit the effective policies call for. Limits of a route share the
/// route's Limitador namespace.
pub fn desired_limits(topology: &Topology, state: &State) -> RateLimitIndex {
    let mut index = RateLimitIndex::default();
    for path in topology.route_paths() {
        let route = path.route.as_ref();
        let namespace = limitador::limits_namespace(
            &route.namespace().unwrap_or_default(),
            &route.name_unchecked(),
        );
        let id = path.id();
        for policies in [&state.ratelimit, &state.token_ratelimit] {
            if let Some(effective) = effective_rules(policies, &id) {
                add_limits(&mut index, &namespace, effective);
            }
        }
    }
    index
}

fn effective_rules<'s>(
    state: &'s PolicyState<RateLimitRule>,
    path: &kuadrant_policy_controller_core::PathId,
) -> Option<&'s Rules<RateLimitRule>> {
    state.effective.as_ref()?.get(path).map(|e| &e.rules)
}

fn add_limits(index: &mut RateLimitIndex, namespace: &str, rules: &Rules<RateLimitRule>) {
    for (name, limit, source) in policy::limits(rules) {
        let identifier = limitador::limit_name_to_limitador_identifier(&source.resource_id(), name);
        let counters = limit
            .counters
            .iter()
            .map(|c| c.expression.clone())
            .collect::<Vec<_>>();
        let limits = limitador::rate_limits(&identifier, namespace, &limit.rates, &counters);
        index.set(namespace.to_string(), identifier, limits);
    }
}

/// Replaces the limits of the Kuadrant namespace's Limitador when they
/// differ, as a set, from the desired ones.
pub async fn reconcile<C: ResourceClient<Limitador> + ?Sized>(
    client: &C,
    topology: &Topology,
    state: &mut State,
) -> Result<(), ReconcileError> {
    if !topology.dependencies().limitador {
        return Ok(());
    }
    let Some(namespace) = topology.kuadrant().and_then(|k| k.namespace()) else {
        return Ok(());
    };
    let id = ResourceId::new(namespace, LIMITADOR_NAME);
    let Some(current) = topology.resources().limitadors.get(&id) else {
        tracing::debug!(namespace = %id.namespace, name = %id.name, "Limitador not found");
        return Ok(());
    };

    let desired = desired_limits(topology, state).to_rate_limits();
    if limitador::limits_equal(&current.spec.limits, &desired) {
        return Ok(());
    }

    let mut updated = current.as_ref().clone();
    updated.spec.limits = desired;
    tracing::debug!(namespace = %id.namespace, name = %id.name, limits = updated.spec.limits.len(), "Updating limits");
    match client.update(&updated).await {
        Ok(()) => {
            state.modified.limitador_limits = true;
            Ok(())
        }
        Err(error) if error.is_removed() => Ok(()),
        Err(error) => Err(error.into()),
    }
}

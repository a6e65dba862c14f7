//! Computes, for every path of the topology, the single policy of each kind
//! that applies to it.

use crate::{
    policy::{age_key, KuadrantPolicy, PathScope},
    validate::Validations,
    Topology,
};
use kuadrant_policy_controller_core::{
    merge::effective_policy, EffectivePolicy, Locator, MergeablePolicy, PathId,
};
use std::collections::BTreeMap;

pub type EffectivePolicies<R> = BTreeMap<PathId, EffectivePolicy<R>>;

/// Merges the accepted policies of kind `P` along every path of the kind's
/// scope. Policies that are being deleted are ignored.
pub fn calculate<P: KuadrantPolicy>(
    topology: &Topology,
    validations: &Validations,
) -> EffectivePolicies<P::Rule> {
    let by_target = policies_by_target::<P>(topology, validations);
    if by_target.is_empty() {
        return EffectivePolicies::new();
    }

    let paths: Vec<&[Locator]> = match P::SCOPE {
        PathScope::Routes => topology
            .route_paths()
            .iter()
            .map(|p| p.locators.as_slice())
            .collect(),
        PathScope::Listeners => topology
            .listener_paths()
            .iter()
            .map(|p| p.locators.as_slice())
            .collect(),
    };

    let mut effective = EffectivePolicies::new();
    for path in paths {
        let chain = path
            .iter()
            .filter_map(|l| by_target.get(l))
            .flatten()
            .cloned()
            .collect::<Vec<_>>();
        if chain.is_empty() {
            continue;
        }
        if let Some(policy) = effective_policy(path, &chain) {
            tracing::trace!(
                kind = %P::KIND,
                path = %policy.path_id(),
                sources = ?policy.source_policies,
                "Effective policy",
            );
            effective.insert(policy.path_id(), policy);
        }
    }
    effective
}

/// Groups the accepted policies by the targetable they attach to. Within a
/// targetable, the oldest policy ends up closest to the leaf.
fn policies_by_target<P: KuadrantPolicy>(
    topology: &Topology,
    validations: &Validations,
) -> BTreeMap<Locator, Vec<MergeablePolicy<P::Rule>>> {
    let mut by_target = BTreeMap::<Locator, Vec<_>>::new();
    for policy in P::policies(topology.resources()).values() {
        let locator = policy.locator();
        if !validations.is_accepted(&locator) || policy.is_deleting() {
            continue;
        }

        let span = crate::policy::span(policy.as_ref(), "effective");
        let _enter = span.enter();

        let namespace = policy.namespace().unwrap_or_default();
        let Some(target) = topology.target_locator(policy.target_ref(), &namespace) else {
            continue;
        };
        let (strategy, rules) = policy.rules();
        tracing::trace!(%target, rules = rules.len(), ?strategy, "Attached");
        by_target
            .entry(target)
            .or_default()
            .push((age_key(policy.as_ref()), MergeablePolicy::new(locator, strategy, rules)));
    }

    by_target
        .into_iter()
        .map(|(target, mut policies)| {
            policies.sort_by(|(a, _), (b, _)| b.cmp(a));
            let policies = policies.into_iter().map(|(_, p)| p).collect::<Vec<_>>();
            (target, policies)
        })
        .collect()
}

/// The effective policies that contain rules from `policy`.
pub fn sourced_from<'e, R>(
    effective: &'e EffectivePolicies<R>,
    policy: &'e Locator,
) -> impl Iterator<Item = &'e EffectivePolicy<R>> + 'e {
    effective.values().filter(move |e| e.has_source(policy))
}

/// The effective policies of paths going through `target`.
pub fn through<'e, R>(
    effective: &'e EffectivePolicies<R>,
    target: &'e Locator,
) -> impl Iterator<Item = &'e EffectivePolicy<R>> + 'e {
    effective.values().filter(move |e| e.path.contains(target))
}

//! Defaults/overrides semantics for policies attached at different levels
//! of the Gateway API hierarchy.
//!
//! A policy is decomposed into named rules, each remembering the policy it
//! came from. Policies found along a path are ordered from the root
//! (GatewayClass) to the leaf (route rule or listener) and folded from the
//! leaf upwards: every policy is merged, as the source, onto the result
//! accumulated from the more specific policies below it, as the target.

use crate::{Locator, PathId};
use kuadrant_policy_controller_k8s_api::policy::MergeStrategy;
use std::collections::BTreeMap;

/// A rule payload and the policy that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule<T> {
    pub spec: T,
    pub source: Locator,
}

pub type Rules<T> = BTreeMap<String, Rule<T>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Applies unless a more specific policy says otherwise.
    Defaults(MergeStrategy),
    /// Applies regardless of what more specific policies say.
    Overrides(MergeStrategy),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MergeablePolicy<T> {
    pub locator: Locator,
    pub strategy: Strategy,
    pub rules: Rules<T>,
}

/// The single policy that applies to a path, for one policy kind.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectivePolicy<T> {
    pub path: Vec<Locator>,
    pub rules: Rules<T>,
    /// Every policy that contributed a surviving rule, sorted.
    pub source_policies: Vec<Locator>,
}

// === impl Strategy ===

impl Default for Strategy {
    fn default() -> Self {
        Self::Defaults(MergeStrategy::Atomic)
    }
}

// === impl MergeablePolicy ===

impl<T: Clone> MergeablePolicy<T> {
    pub fn new(locator: Locator, strategy: Strategy, specs: BTreeMap<String, T>) -> Self {
        let rules = specs
            .into_iter()
            .map(|(key, spec)| {
                let rule = Rule {
                    spec,
                    source: locator.clone(),
                };
                (key, rule)
            })
            .collect();
        Self {
            locator,
            strategy,
            rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Merges `self`, as the less specific policy, onto `target`.
    pub fn merge_onto(&self, target: Option<Self>) -> Self {
        let Some(target) = target else {
            return self.clone();
        };

        match self.strategy {
            Strategy::Defaults(MergeStrategy::Atomic) => {
                if target.is_empty() {
                    self.clone()
                } else {
                    target
                }
            }
            Strategy::Overrides(MergeStrategy::Atomic) => self.clone(),
            Strategy::Defaults(MergeStrategy::Merge) => {
                let mut rules = target.rules;
                for (key, rule) in &self.rules {
                    rules.entry(key.clone()).or_insert_with(|| rule.clone());
                }
                Self { rules, ..target }
            }
            Strategy::Overrides(MergeStrategy::Merge) => {
                let mut rules = self.rules.clone();
                for (key, rule) in target.rules.iter() {
                    rules.entry(key.clone()).or_insert_with(|| rule.clone());
                }
                Self { rules, ..target }
            }
        }
    }
}

/// Folds the policies of a path, ordered from root to leaf, into the
/// effective policy of that path. Returns `None` when no policy applies or
/// the merged result carries no rules.
pub fn effective_policy<T: Clone>(
    path: &[Locator],
    policies: &[MergeablePolicy<T>],
) -> Option<EffectivePolicy<T>> {
    let merged = policies
        .iter()
        .rev()
        .fold(None, |agg, policy| Some(policy.merge_onto(agg)))?;
    if merged.is_empty() {
        return None;
    }

    let mut source_policies = merged
        .rules
        .values()
        .map(|r| r.source.clone())
        .collect::<Vec<_>>();
    source_policies.sort();
    source_policies.dedup();

    Some(EffectivePolicy {
        path: path.to_vec(),
        rules: merged.rules,
        source_policies,
    })
}

// === impl EffectivePolicy ===

impl<T> EffectivePolicy<T> {
    pub fn path_id(&self) -> PathId {
        PathId::new(self.path.iter())
    }

    pub fn has_source(&self, policy: &Locator) -> bool {
        self.source_policies.binary_search(policy).is_ok()
    }

    pub fn rules_from<'p>(&'p self, policy: &'p Locator) -> impl Iterator<Item = (&'p String, &'p T)> {
        self.rules
            .iter()
            .filter(move |(_, r)| r.source == *policy)
            .map(|(k, r)| (k, &r.spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn policy(
        name: &str,
        strategy: Strategy,
        rules: BTreeMap<String, &'static str>,
    ) -> MergeablePolicy<&'static str> {
        MergeablePolicy::new(Locator::from(name), strategy, rules)
    }

    fn specs(rules: &Rules<&'static str>) -> BTreeMap<String, (&'static str, String)> {
        rules
            .iter()
            .map(|(k, r)| (k.clone(), (r.spec, r.source.to_string())))
            .collect()
    }

    const ATOMIC_DEFAULTS: Strategy = Strategy::Defaults(MergeStrategy::Atomic);
    const MERGE_DEFAULTS: Strategy = Strategy::Defaults(MergeStrategy::Merge);
    const ATOMIC_OVERRIDES: Strategy = Strategy::Overrides(MergeStrategy::Atomic);
    const MERGE_OVERRIDES: Strategy = Strategy::Overrides(MergeStrategy::Merge);

    #[test]
    fn atomic_defaults_prefer_the_more_specific_policy() {
        let gw = policy("gw", ATOMIC_DEFAULTS, btreemap! { "a".into() => "gw-a", "b".into() => "gw-b" });
        let route = policy("route", ATOMIC_DEFAULTS, btreemap! { "a".into() => "route-a" });

        let effective = effective_policy(&[], &[gw.clone(), route]).unwrap();
        assert_eq!(
            specs(&effective.rules),
            btreemap! { "a".to_string() => ("route-a", "route".to_string()) }
        );
        assert_eq!(effective.source_policies, vec![Locator::from("route")]);

        // An empty, more specific policy does not shadow the defaults.
        let empty = policy("route", ATOMIC_DEFAULTS, BTreeMap::new());
        let effective = effective_policy(&[], &[gw, empty]).unwrap();
        assert_eq!(effective.source_policies, vec![Locator::from("gw")]);
    }

    #[test]
    fn merge_defaults_fill_in_missing_rules() {
        let gw = policy("gw", MERGE_DEFAULTS, btreemap! { "a".into() => "gw-a", "b".into() => "gw-b" });
        let route = policy("route", ATOMIC_DEFAULTS, btreemap! { "a".into() => "route-a" });

        let effective = effective_policy(&[], &[gw, route]).unwrap();
        assert_eq!(
            specs(&effective.rules),
            btreemap! {
                "a".to_string() => ("route-a", "route".to_string()),
                "b".to_string() => ("gw-b", "gw".to_string()),
            }
        );
        assert_eq!(
            effective.source_policies,
            vec![Locator::from("gw"), Locator::from("route")]
        );
    }

    #[test]
    fn atomic_overrides_replace_everything_below() {
        let gw = policy("gw", ATOMIC_OVERRIDES, btreemap! { "a".into() => "gw-a" });
        let route = policy("route", ATOMIC_DEFAULTS, btreemap! { "a".into() => "route-a", "b".into() => "route-b" });

        let effective = effective_policy(&[], &[gw, route]).unwrap();
        assert_eq!(
            specs(&effective.rules),
            btreemap! { "a".to_string() => ("gw-a", "gw".to_string()) }
        );
    }

    #[test]
    fn merge_overrides_win_per_rule() {
        let gw = policy("gw", MERGE_OVERRIDES, btreemap! { "a".into() => "gw-a" });
        let route = policy("route", ATOMIC_DEFAULTS, btreemap! { "a".into() => "route-a", "b".into() => "route-b" });

        let effective = effective_policy(&[], &[gw, route]).unwrap();
        assert_eq!(
            specs(&effective.rules),
            btreemap! {
                "a".to_string() => ("gw-a", "gw".to_string()),
                "b".to_string() => ("route-b", "route".to_string()),
            }
        );
    }

    #[test]
    fn overrides_and_defaults_across_three_levels() {
        // Gateway overrides authentication, the route sets an authorization
        // default, and rule-1 replaces the authorization.
        let gw = policy(
            "gw",
            MERGE_OVERRIDES,
            btreemap! { "authentication#jwt".into() => "jwt" },
        );
        let route = policy(
            "route",
            ATOMIC_DEFAULTS,
            btreemap! { "authorization#admins".into() => "admins-only" },
        );
        let rule1 = policy(
            "rule-1",
            MERGE_DEFAULTS,
            btreemap! { "authorization#admins".into() => "admins-or-privileged" },
        );

        let rule1_path = effective_policy(&[], &[gw.clone(), route.clone(), rule1]).unwrap();
        assert_eq!(
            specs(&rule1_path.rules),
            btreemap! {
                "authentication#jwt".to_string() => ("jwt", "gw".to_string()),
                "authorization#admins".to_string() => ("admins-or-privileged", "rule-1".to_string()),
            }
        );

        let rule2_path = effective_policy(&[], &[gw, route]).unwrap();
        assert_eq!(
            specs(&rule2_path.rules),
            btreemap! {
                "authentication#jwt".to_string() => ("jwt", "gw".to_string()),
                "authorization#admins".to_string() => ("admins-only", "route".to_string()),
            }
        );
    }

    #[test]
    fn no_policies_no_effective_policy() {
        assert!(effective_policy::<&str>(&[], &[]).is_none());
        let empty = policy("gw", ATOMIC_DEFAULTS, BTreeMap::new());
        assert!(effective_policy(&[], &[empty]).is_none());
    }
}

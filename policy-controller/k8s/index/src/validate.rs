//! Admission-like checks run on every policy at the start of a pass. A
//! failed check never aborts the pass: it is recorded by policy locator and
//! surfaces in the policy's `Accepted` condition.

use crate::{
    policy::{age_key, KuadrantPolicy},
    Topology,
};
use kuadrant_policy_controller_core::{Locator, PolicyError};
use kuadrant_policy_controller_k8s_api::{
    gateway,
    policy::{tls_policy::IssuerRef, DNSPolicy, DNSPolicySpec, TLSPolicy},
    ResourceExt,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{collections::BTreeMap, net::IpAddr};

/// The outcome of validating each policy of a kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Validations(BTreeMap<Locator, Option<PolicyError>>);

static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?([a-z0-9]([-a-z0-9]*[a-z0-9])?\.)*[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .expect("hostname regex must compile")
});

// === impl Validations ===

impl Validations {
    pub fn insert(&mut self, policy: Locator, error: Option<PolicyError>) {
        self.0.insert(policy, error);
    }

    /// Policies that weren't validated are not accepted.
    pub fn is_accepted(&self, policy: &Locator) -> bool {
        matches!(self.0.get(policy), Some(None))
    }

    pub fn error(&self, policy: &Locator) -> Option<&PolicyError> {
        self.0.get(policy)?.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Locator, Option<&PolicyError>)> {
        self.0.iter().map(|(l, e)| (l, e.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Validates every policy of kind `P` in the topology.
pub fn validate<P: KuadrantPolicy + ValidateSpec>(topology: &Topology) -> Validations {
    let mut validations = Validations::default();
    for policy in P::policies(topology.resources()).values() {
        let span = crate::policy::span(policy.as_ref(), "validate");
        let _enter = span.enter();

        let result = validate_policy(topology, policy.as_ref());
        if let Err(error) = &result {
            tracing::debug!(%error, "Policy not accepted");
        }
        validations.insert(policy.locator(), result.err());
    }
    validations
}

fn validate_policy<P: KuadrantPolicy + ValidateSpec>(
    topology: &Topology,
    policy: &P,
) -> Result<(), PolicyError> {
    if let Some(dependency) = P::missing_dependency(topology.dependencies()) {
        return Err(PolicyError::DependencyNotInstalled {
            kind: P::KIND,
            dependency: dependency.to_string(),
        });
    }

    let namespace = policy.namespace().unwrap_or_default();
    let target = policy.target_ref();
    if topology.target_locator(target, &namespace).is_none() {
        return Err(PolicyError::TargetNotFound {
            kind: P::KIND,
            target: target.name.clone(),
        });
    }

    if P::EXCLUSIVE {
        // The oldest policy on a target wins.
        let key = age_key(policy);
        let oldest = P::policies(topology.resources())
            .values()
            .filter(|other| {
                other.namespace().as_deref() == Some(namespace.as_str())
                    && other.target_ref() == target
                    && !other.is_deleting()
            })
            .map(|other| age_key(other.as_ref()))
            .filter(|other| *other < key)
            .min();
        if let Some((_, existing)) = oldest {
            return Err(PolicyError::Conflict {
                kind: P::KIND,
                existing: existing.to_string(),
            });
        }
    }

    if policy.is_ambiguous() {
        return Err(PolicyError::Invalid {
            kind: P::KIND,
            reason: "only one of the implicit defaults, explicit defaults or overrides may be set"
                .to_string(),
        });
    }

    policy
        .validate_spec(topology)
        .map_err(|reason| PolicyError::Invalid {
            kind: P::KIND,
            reason,
        })
}

/// Structural checks specific to a policy kind.
pub trait ValidateSpec {
    fn validate_spec(&self, _topology: &Topology) -> Result<(), String> {
        Ok(())
    }
}

impl ValidateSpec for kuadrant_policy_controller_k8s_api::policy::AuthPolicy {}
impl ValidateSpec for kuadrant_policy_controller_k8s_api::policy::RateLimitPolicy {}
impl ValidateSpec for kuadrant_policy_controller_k8s_api::policy::TokenRateLimitPolicy {}

impl ValidateSpec for TLSPolicy {
    fn validate_spec(&self, topology: &Topology) -> Result<(), String> {
        if !self.spec.target_ref.targets_kind::<gateway::Gateway>() {
            return Err("TLSPolicy must target a Gateway or one of its listeners".to_string());
        }

        let issuer = &self.spec.issuer_ref;
        if let Some(group) = issuer.group.as_deref().filter(|g| !g.is_empty()) {
            if group != IssuerRef::GROUP {
                return Err(format!("invalid issuer group {group:?}"));
            }
        }
        let found = match issuer.kind() {
            IssuerRef::ISSUER => {
                let namespace = self.namespace().unwrap_or_default();
                topology
                    .resources()
                    .issuers
                    .keys()
                    .any(|id| id.namespace == namespace && id.name == issuer.name)
            }
            IssuerRef::CLUSTER_ISSUER => topology
                .resources()
                .cluster_issuers
                .keys()
                .any(|id| id.name == issuer.name),
            kind => return Err(format!("invalid issuer kind {kind:?}")),
        };
        if !found {
            return Err(format!(
                "unable to find issuer {}/{}",
                issuer.kind(),
                issuer.name
            ));
        }
        Ok(())
    }
}

impl ValidateSpec for DNSPolicy {
    fn validate_spec(&self, _topology: &Topology) -> Result<(), String> {
        if !self.spec.target_ref.targets_kind::<gateway::Gateway>() {
            return Err("DNSPolicy must target a Gateway or one of its listeners".to_string());
        }
        validate_dns_spec(&self.spec)
    }
}

/// The checks a DNSPolicy applies to itself.
pub fn validate_dns_spec(spec: &DNSPolicySpec) -> Result<(), String> {
    if spec.provider_refs.len() > 1 {
        return Err("multiple provider references are not supported".to_string());
    }

    for address in &spec.exclude_addresses {
        let valid = address.parse::<IpAddr>().is_ok()
            || address.parse::<ipnet::IpNet>().is_ok()
            || HOSTNAME.is_match(address);
        if !valid {
            return Err(format!(
                "could not parse the CIDR from the excludeAddresses field: {address:?}"
            ));
        }
    }

    if let Some(lb) = &spec.load_balancing {
        if lb.weight < 0 {
            return Err("load balancing weight must not be negative".to_string());
        }
        if lb.default_geo && lb.geo.is_empty() {
            return Err("defaultGeo requires a geo to be set".to_string());
        }
    }
    Ok(())
}

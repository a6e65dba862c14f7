//! State threaded through the stages of one reconciliation pass.
//!
//! Every field is written by exactly one stage. `None` means the stage that
//! computes it did not run in this pass, which downstream stages treat as
//! "no policy of this kind affects anything".

use crate::{
    effective::{self, EffectivePolicies},
    policy::{KuadrantPolicy, RateLimitRule},
    validate::{self, ValidateSpec, Validations},
    Topology,
};
use kuadrant_policy_controller_core::{
    cel::CelIssues, wasm::MergeError, EffectivePolicy, PathId, ResourceId,
};
use kuadrant_policy_controller_k8s_api::policy::{
    AuthPolicy, DNSPolicy, DNSPolicySpec, RateLimitPolicy, TLSPolicy, TLSPolicySpec,
    TokenRateLimitPolicy,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default)]
pub struct State {
    pub auth: PolicyState<Value>,
    pub ratelimit: PolicyState<RateLimitRule>,
    pub token_ratelimit: PolicyState<RateLimitRule>,
    pub tls: PolicyState<TLSPolicySpec>,
    pub dns: PolicyState<DNSPolicySpec>,

    /// Wasm actions excluded for failing CEL validation.
    pub cel_issues: CelIssues,

    /// Paths left without wasm actions because their actions could not be
    /// merged.
    pub wasm_conflicts: BTreeMap<PathId, MergeError>,

    pub modified: Modified,
}

#[derive(Clone, Debug)]
pub struct PolicyState<R> {
    pub validations: Option<Validations>,
    pub effective: Option<EffectivePolicies<R>>,
}

/// Per-gateway resources the controller generates.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Artifact {
    IstioAuthCluster,
    IstioRateLimitCluster,
    IstioTracingCluster,
    IstioExtension,
    EnvoyGatewayAuthCluster,
    EnvoyGatewayRateLimitCluster,
    EnvoyGatewayTracingCluster,
    EnvoyGatewayExtension,
}

/// Writes issued in this pass that the affected components have yet to pick
/// up. Only creations are recorded for per-gateway artifacts, since only
/// they flip a condition that status updaters wait on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Modified {
    pub gateways: BTreeMap<Artifact, BTreeSet<ResourceId>>,
    pub limitador_limits: bool,
}

// === impl State ===

impl State {
    /// Runs the validation and effective-policy stages for every kind.
    pub fn compute(topology: &Topology) -> Self {
        let mut state = Self::default();
        state.compute_kind::<AuthPolicy>(topology);
        state.compute_kind::<RateLimitPolicy>(topology);
        state.compute_kind::<TokenRateLimitPolicy>(topology);
        state.compute_kind::<TLSPolicy>(topology);
        state.compute_kind::<DNSPolicy>(topology);
        state
    }

    fn compute_kind<P: KuadrantPolicy + ValidateSpec>(&mut self, topology: &Topology) {
        let validations = validate::validate::<P>(topology);
        let effective = effective::calculate::<P>(topology, &validations);
        let state = P::state_mut(self);
        state.validations = Some(validations);
        state.effective = Some(effective);
    }

    pub fn policy<P: KuadrantPolicy>(&self) -> &PolicyState<P::Rule> {
        P::state(self)
    }
}

// === impl PolicyState ===

impl<R> Default for PolicyState<R> {
    fn default() -> Self {
        Self {
            validations: None,
            effective: None,
        }
    }
}

impl<R> PolicyState<R> {
    pub fn effective_policies(&self) -> impl Iterator<Item = &EffectivePolicy<R>> {
        self.effective.iter().flat_map(|e| e.values())
    }

    pub fn has_effective(&self) -> bool {
        self.effective.as_ref().is_some_and(|e| !e.is_empty())
    }
}

// === impl Modified ===

impl Modified {
    pub fn mark(&mut self, artifact: Artifact, gateway: ResourceId) {
        self.gateways.entry(artifact).or_default().insert(gateway);
    }

    pub fn is_modified(&self, artifact: Artifact, gateway: &ResourceId) -> bool {
        self.gateways
            .get(&artifact)
            .is_some_and(|gws| gws.contains(gateway))
    }
}

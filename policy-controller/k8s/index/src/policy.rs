//! The policy kinds the controller reconciles, decomposed into named rules
//! that the merge engine combines along topology paths.

use crate::{
    resources::{resource_id, Indexed, Store},
    state::{PolicyState, State},
    Dependencies, Resources,
};
use kuadrant_policy_controller_core::{Locator, PolicyKind, ResourceId, Rules, Strategy};
use kuadrant_policy_controller_k8s_api::{
    policy::{
        auth_policy::{AuthScheme, ResponseSpec},
        ratelimit_policy::{MergeableRateLimitPolicySpec, RateLimitPolicySpecProper},
        AuthPolicy, AuthPolicySpecProper, DNSPolicy, DNSPolicySpec, Limit,
        LocalPolicyTargetReference, RateLimitPolicy, TLSPolicy, TLSPolicySpec,
        TokenRateLimitPolicy, WhenPredicate,
    },
    ResourceExt, Time,
};
use serde_json::Value;
use std::{collections::BTreeMap, fmt::Debug};

/// The key of the pseudo-rule holding a rate limit policy's top-level
/// predicates.
pub const TOP_LEVEL_PREDICATES_KEY: &str = "___when___";

/// The key of the single rule TLS and DNS policies decompose into.
pub const SPEC_KEY: &str = "spec";

/// The targetables whose paths a policy kind is evaluated on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathScope {
    /// Paths ending at an HTTPRoute rule.
    Routes,
    /// Paths ending at a Gateway listener.
    Listeners,
}

/// A rule of a RateLimitPolicy or TokenRateLimitPolicy.
#[derive(Clone, Debug, PartialEq)]
pub enum RateLimitRule {
    Limit(Limit),
    Predicates(Vec<WhenPredicate>),
}

pub trait KuadrantPolicy: Indexed + ResourceExt + Debug {
    type Rule: Clone + Debug + PartialEq;

    const KIND: PolicyKind;
    const SCOPE: PathScope;

    /// Whether an older policy with the same target excludes this one.
    const EXCLUSIVE: bool = false;

    fn target_ref(&self) -> &LocalPolicyTargetReference;

    /// The strategy the policy is merged with and its rules, by key.
    fn rules(&self) -> (Strategy, BTreeMap<String, Self::Rule>);

    /// Set when more than one of the bare spec, `defaults` and `overrides`
    /// is present.
    fn is_ambiguous(&self) -> bool {
        false
    }

    /// The first component this kind needs that isn't installed.
    fn missing_dependency(deps: Dependencies) -> Option<&'static str>;

    fn state(state: &State) -> &PolicyState<Self::Rule>;

    fn state_mut(state: &mut State) -> &mut PolicyState<Self::Rule>;

    fn locator(&self) -> Locator {
        Locator::for_resource(self)
    }

    fn id(&self) -> ResourceId {
        resource_id(self)
    }

    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    fn policies(resources: &Resources) -> &Store<Self> {
        Self::store(resources)
    }
}

/// Orders policies oldest first, ties broken by namespace and name.
pub fn age_key<P: KuadrantPolicy>(policy: &P) -> (Option<Time>, ResourceId) {
    (policy.meta().creation_timestamp.clone(), policy.id())
}

/// The span a policy is validated or evaluated in.
pub(crate) fn span<P: KuadrantPolicy>(policy: &P, stage: &str) -> tracing::Span {
    let name = format!("policy.{}.{stage}", P::KIND);
    tracing::info_span!(
        "policy",
        otel.name = %name,
        policy.name = %policy.name_any(),
        policy.namespace = %policy.namespace().unwrap_or_default(),
        policy.kind = %P::KIND,
        policy.uid = %policy.uid().unwrap_or_default(),
    )
}

fn gateway_api_dependency(deps: Dependencies) -> Option<&'static str> {
    if !deps.gateway_api {
        return Some("Gateway API");
    }
    if !deps.any_gateway_provider() {
        return Some("Gateway API provider (istio / envoy gateway)");
    }
    None
}

// === AuthPolicy ===

impl KuadrantPolicy for AuthPolicy {
    type Rule = Value;

    const KIND: PolicyKind = PolicyKind::Auth;
    const SCOPE: PathScope = PathScope::Routes;

    fn target_ref(&self) -> &LocalPolicyTargetReference {
        &self.spec.target_ref
    }

    fn rules(&self) -> (Strategy, BTreeMap<String, Value>) {
        let (strategy, proper) = match (&self.spec.defaults, &self.spec.overrides) {
            (_, Some(overrides)) => (Strategy::Overrides(overrides.strategy), &overrides.proper),
            (Some(defaults), None) => (Strategy::Defaults(defaults.strategy), &defaults.proper),
            (None, None) => (Strategy::default(), &self.spec.proper),
        };
        (strategy, auth_rules(proper))
    }

    fn is_ambiguous(&self) -> bool {
        self.spec.is_ambiguous()
    }

    fn missing_dependency(deps: Dependencies) -> Option<&'static str> {
        gateway_api_dependency(deps).or((!deps.authorino).then_some("Authorino"))
    }

    fn state(state: &State) -> &PolicyState<Value> {
        &state.auth
    }

    fn state_mut(state: &mut State) -> &mut PolicyState<Value> {
        &mut state.auth
    }
}

/// Decomposes an auth spec into rules keyed by section and name.
pub fn auth_rules(proper: &AuthPolicySpecProper) -> BTreeMap<String, Value> {
    let mut rules = BTreeMap::new();
    for (name, patterns) in &proper.patterns {
        rules.insert(format!("patterns#{name}"), Value::Array(patterns.clone()));
    }
    for (i, condition) in proper.when.iter().enumerate() {
        rules.insert(format!("conditions#{i}"), condition.clone());
    }

    let Some(scheme) = &proper.rules else {
        return rules;
    };
    let sections = [
        ("authentication", &scheme.authentication),
        ("metadata", &scheme.metadata),
        ("authorization", &scheme.authorization),
        ("callbacks", &scheme.callbacks),
    ];
    for (section, named) in sections {
        for (name, rule) in named {
            rules.insert(format!("{section}#{name}"), rule.clone());
        }
    }
    if let Some(response) = &scheme.response {
        if let Some(r) = &response.unauthenticated {
            rules.insert("response.unauthenticated".to_string(), r.clone());
        }
        if let Some(r) = &response.unauthorized {
            rules.insert("response.unauthorized".to_string(), r.clone());
        }
        for (name, r) in &response.success.headers {
            rules.insert(format!("response.success.headers#{name}"), r.clone());
        }
        for (name, r) in &response.success.filters {
            rules.insert(format!("response.success.filters#{name}"), r.clone());
        }
    }
    rules
}

/// Reassembles an auth spec from merged rules.
pub fn auth_spec(rules: &Rules<Value>) -> AuthPolicySpecProper {
    let mut proper = AuthPolicySpecProper::default();
    let mut scheme = AuthScheme::default();
    let mut response = ResponseSpec::default();

    for (key, rule) in rules {
        let spec = rule.spec.clone();
        let (section, name) = key
            .split_once('#')
            .map(|(s, n)| (s, n.to_string()))
            .unwrap_or((key.as_str(), String::new()));
        match section {
            "patterns" => {
                let patterns = match spec {
                    Value::Array(patterns) => patterns,
                    other => vec![other],
                };
                proper.patterns.insert(name, patterns);
            }
            "conditions" => proper.when.push(spec),
            "authentication" => {
                scheme.authentication.insert(name, spec);
            }
            "metadata" => {
                scheme.metadata.insert(name, spec);
            }
            "authorization" => {
                scheme.authorization.insert(name, spec);
            }
            "callbacks" => {
                scheme.callbacks.insert(name, spec);
            }
            "response.unauthenticated" => response.unauthenticated = Some(spec),
            "response.unauthorized" => response.unauthorized = Some(spec),
            "response.success.headers" => {
                response.success.headers.insert(name, spec);
            }
            "response.success.filters" => {
                response.success.filters.insert(name, spec);
            }
            _ => tracing::debug!(%key, "Ignoring unknown auth rule"),
        }
    }

    if response != ResponseSpec::default() {
        scheme.response = Some(response);
    }
    if scheme != AuthScheme::default() {
        proper.rules = Some(scheme);
    }
    proper
}

/// The `when` entries of an auth spec that are CEL predicates, enforced by
/// the gateway rather than by Authorino.
pub fn auth_predicates(proper: &AuthPolicySpecProper) -> Vec<String> {
    proper
        .when
        .iter()
        .filter_map(|w| w.get("predicate")?.as_str().map(str::to_string))
        .collect()
}

// === RateLimitPolicy and TokenRateLimitPolicy ===

impl KuadrantPolicy for RateLimitPolicy {
    type Rule = RateLimitRule;

    const KIND: PolicyKind = PolicyKind::RateLimit;
    const SCOPE: PathScope = PathScope::Routes;

    fn target_ref(&self) -> &LocalPolicyTargetReference {
        &self.spec.target_ref
    }

    fn rules(&self) -> (Strategy, BTreeMap<String, RateLimitRule>) {
        ratelimit_rules(
            &self.spec.defaults,
            &self.spec.overrides,
            &self.spec.proper,
        )
    }

    fn is_ambiguous(&self) -> bool {
        self.spec.is_ambiguous()
    }

    fn missing_dependency(deps: Dependencies) -> Option<&'static str> {
        gateway_api_dependency(deps).or((!deps.limitador).then_some("Limitador"))
    }

    fn state(state: &State) -> &PolicyState<RateLimitRule> {
        &state.ratelimit
    }

    fn state_mut(state: &mut State) -> &mut PolicyState<RateLimitRule> {
        &mut state.ratelimit
    }
}

impl KuadrantPolicy for TokenRateLimitPolicy {
    type Rule = RateLimitRule;

    const KIND: PolicyKind = PolicyKind::TokenRateLimit;
    const SCOPE: PathScope = PathScope::Routes;

    fn target_ref(&self) -> &LocalPolicyTargetReference {
        &self.spec.target_ref
    }

    fn rules(&self) -> (Strategy, BTreeMap<String, RateLimitRule>) {
        ratelimit_rules(
            &self.spec.defaults,
            &self.spec.overrides,
            &self.spec.proper,
        )
    }

    fn is_ambiguous(&self) -> bool {
        self.spec.is_ambiguous()
    }

    fn missing_dependency(deps: Dependencies) -> Option<&'static str> {
        gateway_api_dependency(deps).or((!deps.limitador).then_some("Limitador"))
    }

    fn state(state: &State) -> &PolicyState<RateLimitRule> {
        &state.token_ratelimit
    }

    fn state_mut(state: &mut State) -> &mut PolicyState<RateLimitRule> {
        &mut state.token_ratelimit
    }
}

fn ratelimit_rules(
    defaults: &Option<MergeableRateLimitPolicySpec>,
    overrides: &Option<MergeableRateLimitPolicySpec>,
    proper: &RateLimitPolicySpecProper,
) -> (Strategy, BTreeMap<String, RateLimitRule>) {
    let (strategy, proper) = match (defaults, overrides) {
        (_, Some(overrides)) => (Strategy::Overrides(overrides.strategy), &overrides.proper),
        (Some(defaults), None) => (Strategy::Defaults(defaults.strategy), &defaults.proper),
        (None, None) => (Strategy::default(), proper),
    };

    let mut rules = proper
        .limits
        .iter()
        .map(|(name, limit)| (name.clone(), RateLimitRule::Limit(limit.clone())))
        .collect::<BTreeMap<_, _>>();
    if !proper.when.is_empty() {
        rules.insert(
            TOP_LEVEL_PREDICATES_KEY.to_string(),
            RateLimitRule::Predicates(proper.when.clone()),
        );
    }
    (strategy, rules)
}

/// The merged top-level predicates, gating every limit.
pub fn top_level_predicates(rules: &Rules<RateLimitRule>) -> &[WhenPredicate] {
    match rules.get(TOP_LEVEL_PREDICATES_KEY).map(|r| &r.spec) {
        Some(RateLimitRule::Predicates(predicates)) => predicates,
        _ => &[],
    }
}

/// The merged limits with the policy each one came from.
pub fn limits(rules: &Rules<RateLimitRule>) -> impl Iterator<Item = (&str, &Limit, &Locator)> {
    rules.iter().filter_map(|(name, rule)| match &rule.spec {
        RateLimitRule::Limit(limit) => Some((name.as_str(), limit, &rule.source)),
        RateLimitRule::Predicates(_) => None,
    })
}

// === TLSPolicy and DNSPolicy ===

impl KuadrantPolicy for TLSPolicy {
    type Rule = TLSPolicySpec;

    const KIND: PolicyKind = PolicyKind::Tls;
    const SCOPE: PathScope = PathScope::Listeners;
    const EXCLUSIVE: bool = true;

    fn target_ref(&self) -> &LocalPolicyTargetReference {
        &self.spec.target_ref
    }

    fn rules(&self) -> (Strategy, BTreeMap<String, TLSPolicySpec>) {
        (
            Strategy::default(),
            BTreeMap::from([(SPEC_KEY.to_string(), self.spec.clone())]),
        )
    }

    fn missing_dependency(deps: Dependencies) -> Option<&'static str> {
        if !deps.gateway_api {
            return Some("Gateway API");
        }
        (!deps.cert_manager).then_some("cert-manager")
    }

    fn state(state: &State) -> &PolicyState<TLSPolicySpec> {
        &state.tls
    }

    fn state_mut(state: &mut State) -> &mut PolicyState<TLSPolicySpec> {
        &mut state.tls
    }
}

impl KuadrantPolicy for DNSPolicy {
    type Rule = DNSPolicySpec;

    const KIND: PolicyKind = PolicyKind::Dns;
    const SCOPE: PathScope = PathScope::Listeners;
    const EXCLUSIVE: bool = true;

    fn target_ref(&self) -> &LocalPolicyTargetReference {
        &self.spec.target_ref
    }

    fn rules(&self) -> (Strategy, BTreeMap<String, DNSPolicySpec>) {
        (
            Strategy::default(),
            BTreeMap::from([(SPEC_KEY.to_string(), self.spec.clone())]),
        )
    }

    fn missing_dependency(deps: Dependencies) -> Option<&'static str> {
        if !deps.gateway_api {
            return Some("Gateway API");
        }
        (!deps.dns_operator).then_some("DNS Operator")
    }

    fn state(state: &State) -> &PolicyState<DNSPolicySpec> {
        &state.dns
    }

    fn state_mut(state: &mut State) -> &mut PolicyState<DNSPolicySpec> {
        &mut state.dns
    }
}

/// The spec of a TLS or DNS effective policy.
pub fn whole_spec<R>(rules: &Rules<R>) -> Option<&R> {
    rules.get(SPEC_KEY).map(|r| &r.spec)
}

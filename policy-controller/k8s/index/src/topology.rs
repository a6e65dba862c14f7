//! An immutable snapshot of the watched resources, linked into the Gateway
//! API hierarchy that policies attach to:
//!
//! ```text
//! [ GatewayClass ] -> [ Gateway ] -> [ Listener ] -> [ HTTPRoute ] -> [ HTTPRouteRule ]
//! ```
//!
//! Every path from a GatewayClass down to an HTTPRouteRule (or, for policies
//! that only apply to gateways, to a Listener) is enumerated up front. The
//! enumeration is combinatorial in the number of gateways and routes; paths
//! are recomputed from scratch for every pass.

use crate::{
    policy::KuadrantPolicy,
    resources::{resource_id, Resources},
    Dependencies,
};
use kuadrant_policy_controller_core::{
    route_match::{self, HttpRouteMatch},
    GatewayControllers, GatewayProvider, Locator, PathId, ResourceId,
};
use kuadrant_policy_controller_k8s_api::{
    gateway,
    kuadrant::Kuadrant,
    policy::{
        AuthPolicy, DNSPolicy, LocalPolicyTargetReference, RateLimitPolicy, TLSPolicy,
        TokenRateLimitPolicy,
    },
    ResourceExt,
};
use std::{
    collections::BTreeSet,
    fmt::{self, Write},
    sync::Arc,
};

#[derive(Clone, Debug)]
pub struct Topology {
    resources: Resources,
    dependencies: Dependencies,
    listener_paths: Vec<ListenerPath>,
    route_paths: Vec<RoutePath>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub name: String,
    pub port: i32,
    pub protocol: String,
    pub hostname: Option<String>,
    pub certificate_refs: Vec<CertificateRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayAddress {
    pub type_: Option<String>,
    pub value: String,
}

/// A path from a GatewayClass to one of its gateways' listeners.
#[derive(Clone, Debug)]
pub struct ListenerPath {
    pub class: Arc<gateway::GatewayClass>,
    pub gateway: Arc<gateway::Gateway>,
    pub listener: Listener,
    pub locators: Vec<Locator>,
}

/// A path from a GatewayClass to a rule of a route attached to one of its
/// gateways' listeners.
#[derive(Clone, Debug)]
pub struct RoutePath {
    pub class: Arc<gateway::GatewayClass>,
    pub gateway: Arc<gateway::Gateway>,
    pub listener: Listener,
    pub route: Arc<gateway::HTTPRoute>,
    pub rule_index: usize,
    pub locators: Vec<Locator>,
}

// === impl Topology ===

impl Topology {
    pub fn new(resources: Resources, dependencies: Dependencies) -> Self {
        let mut listener_paths = Vec::new();
        let mut route_paths = Vec::new();

        for class in resources.gateway_classes.values() {
            let class_name = class.name_unchecked();
            let class_locator = gateway_class_locator(&class_name);

            for gw in resources
                .gateways
                .values()
                .filter(|gw| gw.spec.gateway_class_name == class_name)
            {
                let gw_locator = Locator::for_resource(gw.as_ref());

                for listener in listeners(gw) {
                    let listener_locator = gw_locator.section(&listener.name);
                    let locators = vec![
                        class_locator.clone(),
                        gw_locator.clone(),
                        listener_locator.clone(),
                    ];

                    for route in resources.http_routes.values() {
                        if !attaches(route, gw, &listener) {
                            continue;
                        }
                        let hostnames = route_match::hostnames(
                            listener.hostname.as_deref(),
                            route.spec.hostnames.as_deref().unwrap_or_default(),
                        );
                        if hostnames.is_empty() {
                            continue;
                        }

                        let route_locator = Locator::for_resource(route.as_ref());
                        let rules = route.spec.rules.as_deref().unwrap_or_default();
                        for (rule_index, rule) in rules.iter().enumerate() {
                            let mut locators = locators.clone();
                            locators.push(route_locator.clone());
                            locators.push(route_locator.section(&rule_section_name(rule, rule_index)));
                            route_paths.push(RoutePath {
                                class: class.clone(),
                                gateway: gw.clone(),
                                listener: listener.clone(),
                                route: route.clone(),
                                rule_index,
                                locators,
                            });
                        }
                    }

                    listener_paths.push(ListenerPath {
                        class: class.clone(),
                        gateway: gw.clone(),
                        listener,
                        locators,
                    });
                }
            }
        }

        Self {
            resources,
            dependencies,
            listener_paths,
            route_paths,
        }
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn dependencies(&self) -> Dependencies {
        self.dependencies
    }

    /// The Kuadrant CR. When several exist, the oldest one.
    pub fn kuadrant(&self) -> Option<&Arc<Kuadrant>> {
        self.resources
            .kuadrants
            .values()
            .min_by_key(|k| (k.metadata.creation_timestamp.clone(), resource_id(k.as_ref())))
    }

    pub fn route_paths(&self) -> &[RoutePath] {
        &self.route_paths
    }

    pub fn listener_paths(&self) -> &[ListenerPath] {
        &self.listener_paths
    }

    /// Gateways whose class is handled by the given provider.
    pub fn gateways_for<'t>(
        &'t self,
        provider: GatewayProvider,
        controllers: &'t GatewayControllers,
    ) -> impl Iterator<Item = &'t Arc<gateway::Gateway>> + 't {
        self.resources.gateways.values().filter(move |gw| {
            self.gateway_class_of(gw)
                .and_then(|class| controllers.provider_for(&class.spec.controller_name))
                == Some(provider)
        })
    }

    pub fn gateway_class_of(&self, gw: &gateway::Gateway) -> Option<&Arc<gateway::GatewayClass>> {
        self.resources
            .gateway_classes
            .get(&ResourceId::new("", gw.spec.gateway_class_name.clone()))
    }

    /// Resolves a policy target reference to the locator of the targeted
    /// gateway, listener, route or route rule.
    pub fn target_locator(
        &self,
        target: &LocalPolicyTargetReference,
        namespace: &str,
    ) -> Option<Locator> {
        let id = ResourceId::new(namespace, target.name.clone());
        if target.targets_kind::<gateway::Gateway>() {
            let gw = self.resources.gateways.get(&id)?;
            let locator = Locator::for_resource(gw.as_ref());
            return match target.section_name.as_deref() {
                None => Some(locator),
                Some(section) => listeners(gw)
                    .iter()
                    .any(|l| l.name == section)
                    .then(|| locator.section(section)),
            };
        }

        if target.targets_kind::<gateway::HTTPRoute>() {
            let route = self.resources.http_routes.get(&id)?;
            let locator = Locator::for_resource(route.as_ref());
            return match target.section_name.as_deref() {
                None => Some(locator),
                Some(section) => route
                    .spec
                    .rules
                    .iter()
                    .flatten()
                    .enumerate()
                    .any(|(i, rule)| rule_section_name(rule, i) == section)
                    .then(|| locator.section(section)),
            };
        }

        None
    }

    /// Renders the topology, including the policies attached to it, as a
    /// GraphViz digraph.
    pub fn to_dot(&self) -> Result<String, fmt::Error> {
        let mut nodes = BTreeSet::new();
        let mut edges = BTreeSet::new();

        if let Some(kuadrant) = self.kuadrant() {
            let root = Locator::for_resource(kuadrant.as_ref());
            for class in self.resources.gateway_classes.values() {
                edges.insert((
                    root.to_string(),
                    gateway_class_locator(&class.name_unchecked()).to_string(),
                ));
            }
            nodes.insert((root.to_string(), "house"));
        }

        for path in &self.listener_paths {
            for l in &path.locators {
                nodes.insert((l.to_string(), "box"));
            }
            for pair in path.locators.windows(2) {
                edges.insert((pair[0].to_string(), pair[1].to_string()));
            }
        }
        for path in &self.route_paths {
            for l in &path.locators {
                nodes.insert((l.to_string(), "box"));
            }
            for pair in path.locators[2..].windows(2) {
                edges.insert((pair[0].to_string(), pair[1].to_string()));
            }
        }

        let mut attach = |locator: Locator, target: Option<Locator>| {
            nodes.insert((locator.to_string(), "note"));
            if let Some(target) = target {
                edges.insert((locator.to_string(), target.to_string()));
            }
        };
        self.policy_edges::<AuthPolicy>(&mut attach);
        self.policy_edges::<RateLimitPolicy>(&mut attach);
        self.policy_edges::<TokenRateLimitPolicy>(&mut attach);
        self.policy_edges::<TLSPolicy>(&mut attach);
        self.policy_edges::<DNSPolicy>(&mut attach);

        let mut dot = String::from("digraph {\n");
        for (node, shape) in &nodes {
            writeln!(dot, "  \"{node}\" [shape={shape}];")?;
        }
        for (from, to) in &edges {
            writeln!(dot, "  \"{from}\" -> \"{to}\";")?;
        }
        dot.push_str("}\n");
        Ok(dot)
    }

    fn policy_edges<P: KuadrantPolicy>(&self, attach: &mut impl FnMut(Locator, Option<Locator>)) {
        for policy in P::store(&self.resources).values() {
            let namespace = policy.namespace().unwrap_or_default();
            attach(
                Locator::for_resource(policy.as_ref()),
                self.target_locator(policy.target_ref(), &namespace),
            );
        }
    }
}

// === impl ListenerPath ===

impl ListenerPath {
    pub fn id(&self) -> PathId {
        PathId::new(&self.locators)
    }

    pub fn gateway_id(&self) -> ResourceId {
        resource_id(self.gateway.as_ref())
    }
}

// === impl RoutePath ===

impl RoutePath {
    pub fn id(&self) -> PathId {
        PathId::new(&self.locators)
    }

    pub fn gateway_id(&self) -> ResourceId {
        resource_id(self.gateway.as_ref())
    }

    pub fn route_id(&self) -> ResourceId {
        resource_id(self.route.as_ref())
    }

    pub fn controller_name(&self) -> &str {
        &self.class.spec.controller_name
    }

    pub fn rule(&self) -> Option<&gateway::HTTPRouteRules> {
        self.route.spec.rules.as_ref()?.get(self.rule_index)
    }

    /// The hostnames this path serves.
    pub fn hostnames(&self) -> Vec<String> {
        route_match::hostnames(
            self.listener.hostname.as_deref(),
            self.route.spec.hostnames.as_deref().unwrap_or_default(),
        )
    }

    /// The rule's matches. A rule without matches matches every request.
    pub fn matches(&self) -> Vec<HttpRouteMatch> {
        let matches = self
            .rule()
            .and_then(|r| r.matches.as_ref())
            .into_iter()
            .flatten()
            .filter_map(|m| serde_json::to_value(m).ok())
            .map(|m| HttpRouteMatch::from_json(&m))
            .collect::<Vec<_>>();
        if matches.is_empty() {
            return vec![HttpRouteMatch::default()];
        }
        matches
    }
}

// === impl Listener ===

impl Listener {
    pub fn is_tls(&self) -> bool {
        matches!(self.protocol.as_str(), "HTTPS" | "TLS")
    }
}

pub fn gateway_class_locator(name: &str) -> Locator {
    Locator::new("GatewayClass", gateway::GROUP, None, name)
}

pub fn listeners(gw: &gateway::Gateway) -> Vec<Listener> {
    gw.spec
        .listeners
        .iter()
        .map(|l| {
            let certificate_refs = l
                .tls
                .as_ref()
                .and_then(|tls| tls.certificate_refs.as_ref())
                .into_iter()
                .flatten()
                .map(|r| CertificateRef {
                    name: r.name.clone(),
                    namespace: r.namespace.clone(),
                    kind: r.kind.clone().unwrap_or_else(|| "Secret".to_string()),
                    group: r.group.clone().unwrap_or_default(),
                })
                .collect();
            Listener {
                name: l.name.clone(),
                port: l.port,
                protocol: l.protocol.clone(),
                hostname: l.hostname.clone().filter(|h| !h.is_empty()),
                certificate_refs,
            }
        })
        .collect()
}

/// The addresses a gateway's status reports.
pub fn gateway_addresses(gw: &gateway::Gateway) -> Vec<GatewayAddress> {
    gw.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .into_iter()
        .flatten()
        .map(|a| GatewayAddress {
            type_: a.r#type.clone(),
            value: a.value.clone(),
        })
        .collect()
}

/// Rules are targeted by their name, or by `rule-<n>` (1-based) when they
/// have none.
fn rule_section_name(rule: &gateway::HTTPRouteRules, index: usize) -> String {
    rule.name
        .clone()
        .unwrap_or_else(|| format!("rule-{}", index + 1))
}

fn attaches(route: &gateway::HTTPRoute, gw: &gateway::Gateway, listener: &Listener) -> bool {
    let route_ns = route.namespace().unwrap_or_default();
    let gw_ns = gw.namespace().unwrap_or_default();
    let gw_name = gw.name_unchecked();
    route.spec.parent_refs.iter().flatten().any(|parent| {
        parent.group.as_deref().unwrap_or(gateway::GROUP) == gateway::GROUP
            && parent.kind.as_deref().unwrap_or("Gateway") == "Gateway"
            && parent.namespace.as_deref().unwrap_or(&route_ns) == gw_ns
            && parent.name == gw_name
            && parent
                .section_name
                .as_deref()
                .map_or(true, |s| s == listener.name)
            && parent.port.map_or(true, |p| p == listener.port)
    })
}

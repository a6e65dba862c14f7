//! What each gateway of a provider needs, shared by the Istio and Envoy
//! Gateway reconcilers.

use crate::{cluster::ClusterEndpoint, wasm as builder};
use kuadrant_policy_controller_core::{wasm, GatewayControllers, GatewayProvider, ResourceId};
use kuadrant_policy_controller_k8s_api::{labels, ResourceExt};
use kuadrant_policy_controller_k8s_index::{State, Topology};
use std::{collections::BTreeMap, sync::Arc};

pub(crate) const AUTH_PREFIX: &str = "kuadrant-auth-";
pub(crate) const RATELIMIT_PREFIX: &str = "kuadrant-ratelimiting-";
pub(crate) const TRACING_PREFIX: &str = "kuadrant-tracing-";
pub(crate) const EXTENSION_PREFIX: &str = "kuadrant-";

pub(crate) struct Plan {
    kuadrant_namespace: Option<String>,
    pub mtls: bool,
    tracing: Option<ClusterEndpoint>,
    pub gateways: BTreeMap<ResourceId, wasm::Config>,
}

// === impl Plan ===

impl Plan {
    pub fn new(
        topology: &Topology,
        state: &mut State,
        provider: GatewayProvider,
        controllers: &GatewayControllers,
    ) -> Self {
        let kuadrant = topology.kuadrant();
        Self {
            kuadrant_namespace: kuadrant.and_then(|k| k.namespace()),
            mtls: kuadrant.is_some_and(|k| k.spec.mtls_enabled()),
            tracing: kuadrant
                .and_then(|k| k.spec.tracing_endpoint())
                .and_then(ClusterEndpoint::tracing),
            gateways: builder::gateway_configs(topology, state, provider, controllers),
        }
    }

    /// The auth cluster, when the gateway has auth actions.
    pub fn auth_cluster(&self, config: &wasm::Config) -> Option<ClusterEndpoint> {
        let ns = self.kuadrant_namespace.as_deref()?;
        builder::uses_service(config, &[wasm::AUTH_SERVICE_NAME]).then(|| ClusterEndpoint::auth(ns))
    }

    /// The rate limiting cluster, when the gateway has rate limit actions.
    pub fn ratelimit_cluster(&self, config: &wasm::Config) -> Option<ClusterEndpoint> {
        let ns = self.kuadrant_namespace.as_deref()?;
        let services = [
            wasm::RATELIMIT_SERVICE_NAME,
            wasm::RATELIMIT_CHECK_SERVICE_NAME,
            wasm::RATELIMIT_REPORT_SERVICE_NAME,
        ];
        builder::uses_service(config, &services).then(|| ClusterEndpoint::ratelimit(ns))
    }

    /// The tracing cluster, when Kuadrant sets a collector.
    pub fn tracing_cluster(&self) -> Option<ClusterEndpoint> {
        self.kuadrant_namespace.as_ref()?;
        self.tracing.clone()
    }
}

/// The name of the resource loading the wasm shim into a gateway.
pub fn extension_name(gw: &ResourceId) -> String {
    prefixed(EXTENSION_PREFIX, gw)
}

/// The name of the resource adding the Authorino cluster to a gateway.
pub fn auth_cluster_name(gw: &ResourceId) -> String {
    prefixed(AUTH_PREFIX, gw)
}

/// The name of the resource adding the Limitador cluster to a gateway.
pub fn ratelimit_cluster_name(gw: &ResourceId) -> String {
    prefixed(RATELIMIT_PREFIX, gw)
}

pub(crate) fn prefixed(prefix: &str, gw: &ResourceId) -> String {
    format!("{prefix}{}", gw.name)
}

pub(crate) fn gateway_labels(gw: &ResourceId) -> labels::Map {
    labels::gateway_labels(&gw.namespace, &gw.name)
}

/// Existing resources of one generated family, told apart by name.
pub(crate) fn named_with<'s, T: ResourceExt>(
    store: &'s BTreeMap<ResourceId, Arc<T>>,
    prefix: &'s str,
) -> impl Iterator<Item = &'s T> + 's {
    store
        .values()
        .map(Arc::as_ref)
        .filter(move |r| r.name_any().starts_with(prefix))
}

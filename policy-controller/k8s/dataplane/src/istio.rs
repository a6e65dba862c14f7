//! Istio integration: the wasm shim is loaded with a `WasmPlugin` per
//! gateway, and the clusters it calls are added with `EnvoyFilter`s.

use crate::{
    client::Clients,
    cluster::ClusterEndpoint,
    gateway::{self, Plan},
    reconcile::{meta, reconcile as reconcile_children, tag_for_deletion},
    ReconcileError,
};
use kuadrant_policy_controller_core::{
    config::WasmConfig, wasm, Config, GatewayProvider, ResourceId,
};
use kuadrant_policy_controller_k8s_api::istio::{
    EnvoyConfigObjectPatch, EnvoyFilter, EnvoyFilterSpec, Patch, PolicyTargetReference,
    WasmPlugin, WasmPluginSpec,
};
use kuadrant_policy_controller_k8s_index::{Artifact, State, Topology};
use serde_json::json;

const WASM_PLUGIN_PHASE: &str = "STATS";

pub async fn reconcile<C: Clients + ?Sized>(
    client: &C,
    topology: &Topology,
    state: &mut State,
    config: &Config,
) -> Result<(), ReconcileError> {
    if !topology.dependencies().istio {
        return Ok(());
    }

    let plan = Plan::new(
        topology,
        state,
        GatewayProvider::Istio,
        &config.gateway_controllers,
    );

    let mut auth = Vec::new();
    let mut ratelimit = Vec::new();
    let mut tracing = Vec::new();
    let mut plugins = Vec::new();
    for (gw, wasm_config) in &plan.gateways {
        let auth_cluster = plan.auth_cluster(wasm_config);
        auth.push(envoy_filter(gateway::AUTH_PREFIX, gw, auth_cluster.as_ref(), plan.mtls));
        let ratelimit_cluster = plan.ratelimit_cluster(wasm_config);
        ratelimit.push(envoy_filter(gateway::RATELIMIT_PREFIX, gw, ratelimit_cluster.as_ref(), plan.mtls));
        let tracing_cluster = plan.tracing_cluster();
        tracing.push(envoy_filter(gateway::TRACING_PREFIX, gw, tracing_cluster.as_ref(), plan.mtls));
        plugins.push(wasm_plugin(gw, wasm_config, &config.wasm)?);
    }

    let resources = topology.resources();
    let filters = &resources.envoy_filters;
    for (prefix, desired, artifact) in [
        (gateway::AUTH_PREFIX, auth, Artifact::IstioAuthCluster),
        (gateway::RATELIMIT_PREFIX, ratelimit, Artifact::IstioRateLimitCluster),
        (gateway::TRACING_PREFIX, tracing, Artifact::IstioTracingCluster),
    ] {
        reconcile_children(
            client,
            gateway::named_with(filters, prefix),
            desired,
            Some(artifact),
            &mut state.modified,
        )
        .await;
    }

    reconcile_children(
        client,
        gateway::named_with(&resources.wasm_plugins, gateway::EXTENSION_PREFIX),
        plugins,
        Some(Artifact::IstioExtension),
        &mut state.modified,
    )
    .await;

    Ok(())
}

/// Adds a cluster to the gateway's Envoy configuration. Without a cluster
/// the filter is tagged for deletion.
pub fn envoy_filter(
    prefix: &str,
    gw: &ResourceId,
    cluster: Option<&ClusterEndpoint>,
    mtls: bool,
) -> EnvoyFilter {
    let name = gateway::prefixed(prefix, gw);
    let mut filter = EnvoyFilter {
        metadata: meta(&gw.namespace, &name, gateway::gateway_labels(gw)),
        spec: EnvoyFilterSpec {
            target_refs: vec![PolicyTargetReference::gateway(&gw.name)],
            config_patches: vec![],
        },
    };

    match cluster {
        Some(cluster) => {
            filter.spec.config_patches.push(EnvoyConfigObjectPatch {
                apply_to: "CLUSTER".to_string(),
                match_: Some(json!({
                    "context": "GATEWAY",
                    "cluster": { "service": cluster.host },
                })),
                patch: Patch {
                    operation: "ADD".to_string(),
                    value: cluster.to_cluster(mtls),
                },
            });
        }
        None => tag_for_deletion(&mut filter.metadata),
    }
    filter
}

/// Loads the wasm shim with the gateway's configuration. A configuration
/// without action sets tags the plugin for deletion.
pub fn wasm_plugin(
    gw: &ResourceId,
    config: &wasm::Config,
    image: &WasmConfig,
) -> Result<WasmPlugin, ReconcileError> {
    let name = gateway::extension_name(gw);
    let mut plugin = WasmPlugin {
        metadata: meta(&gw.namespace, &name, gateway::gateway_labels(gw)),
        spec: WasmPluginSpec {
            target_refs: vec![PolicyTargetReference::gateway(&gw.name)],
            url: image.image.clone(),
            phase: Some(WASM_PLUGIN_PHASE.to_string()),
            plugin_config: Some(serde_json::to_value(config)?),
            image_pull_secret: image.pull_secret().map(str::to_string),
        },
    };
    if config.action_sets.is_empty() {
        tag_for_deletion(&mut plugin.metadata);
    }
    Ok(plugin)
}

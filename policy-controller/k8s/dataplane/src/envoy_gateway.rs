//! Envoy Gateway integration: the wasm shim is loaded with an
//! `EnvoyExtensionPolicy` per gateway, and the clusters it calls are added
//! with `EnvoyPatchPolicy`s.

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
use kuadrant_policy_controller_k8s_api::envoy_gateway::{
    EnvoyExtensionPolicy, EnvoyExtensionPolicySpec, EnvoyJsonPatchConfig, EnvoyPatchPolicy,
    EnvoyPatchPolicySpec, ImageWasmCodeSource, JsonPatchOperation, PolicyTargetReference,
    SecretObjectReference, Wasm, WasmCodeSource,
};
use kuadrant_policy_controller_k8s_index::{Artifact, State, Topology};

const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
const WASM_NAME: &str = "kuadrant-wasm-shim";
const WASM_ROOT_ID: &str = "kuadrant_wasm_shim";

pub async fn reconcile<C: Clients + ?Sized>(
    client: &C,
    topology: &Topology,
    state: &mut State,
    config: &Config,
) -> Result<(), ReconcileError> {
    if !topology.dependencies().envoy_gateway {
        return Ok(());
    }

    let plan = Plan::new(
        topology,
        state,
        GatewayProvider::EnvoyGateway,
        &config.gateway_controllers,
    );

    let mut auth = Vec::new();
    let mut ratelimit = Vec::new();
    let mut tracing = Vec::new();
    let mut extensions = Vec::new();
    for (gw, wasm_config) in &plan.gateways {
        let auth_cluster = plan.auth_cluster(wasm_config);
        auth.push(patch_policy(gateway::AUTH_PREFIX, gw, auth_cluster.as_ref(), plan.mtls));
        let ratelimit_cluster = plan.ratelimit_cluster(wasm_config);
        ratelimit.push(patch_policy(gateway::RATELIMIT_PREFIX, gw, ratelimit_cluster.as_ref(), plan.mtls));
        let tracing_cluster = plan.tracing_cluster();
        tracing.push(patch_policy(gateway::TRACING_PREFIX, gw, tracing_cluster.as_ref(), plan.mtls));
        extensions.push(extension_policy(gw, wasm_config, &config.wasm)?);
    }

    let resources = topology.resources();
    let patches = &resources.envoy_patch_policies;
    for (prefix, desired, artifact) in [
        (gateway::AUTH_PREFIX, auth, Artifact::EnvoyGatewayAuthCluster),
        (gateway::RATELIMIT_PREFIX, ratelimit, Artifact::EnvoyGatewayRateLimitCluster),
        (gateway::TRACING_PREFIX, tracing, Artifact::EnvoyGatewayTracingCluster),
    ] {
        reconcile_children(
            client,
            gateway::named_with(patches, prefix),
            desired,
            Some(artifact),
            &mut state.modified,
        )
        .await;
    }

    reconcile_children(
        client,
        gateway::named_with(&resources.envoy_extension_policies, gateway::EXTENSION_PREFIX),
        extensions,
        Some(Artifact::EnvoyGatewayExtension),
        &mut state.modified,
    )
    .await;

    Ok(())
}

/// Adds a cluster to the gateway's xDS configuration. Without a cluster the
/// policy is tagged for deletion.
pub fn patch_policy(
    prefix: &str,
    gw: &ResourceId,
    cluster: Option<&ClusterEndpoint>,
    mtls: bool,
) -> EnvoyPatchPolicy {
    let name = gateway::prefixed(prefix, gw);
    let mut policy = EnvoyPatchPolicy {
        metadata: meta(&gw.namespace, &name, gateway::gateway_labels(gw)),
        spec: EnvoyPatchPolicySpec {
            target_ref: PolicyTargetReference::gateway(&gw.name),
            type_: "JSONPatch".to_string(),
            json_patches: vec![],
            priority: None,
        },
    };

    match cluster {
        Some(cluster) => policy.spec.json_patches.push(EnvoyJsonPatchConfig {
            type_: CLUSTER_TYPE_URL.to_string(),
            name: cluster.cluster_name.to_string(),
            operation: JsonPatchOperation {
                op: "add".to_string(),
                path: String::new(),
                value: Some(cluster.to_cluster(mtls)),
            },
        }),
        None => tag_for_deletion(&mut policy.metadata),
    }
    policy
}

/// Loads the wasm shim with the gateway's configuration. A configuration
/// without action sets tags the policy for deletion.
pub fn extension_policy(
    gw: &ResourceId,
    config: &wasm::Config,
    image: &WasmConfig,
) -> Result<EnvoyExtensionPolicy, ReconcileError> {
    let name = gateway::extension_name(gw);
    let url = image.image.strip_prefix("oci://").unwrap_or(&image.image);
    let mut policy = EnvoyExtensionPolicy {
        metadata: meta(&gw.namespace, &name, gateway::gateway_labels(gw)),
        spec: EnvoyExtensionPolicySpec {
            target_refs: vec![PolicyTargetReference::gateway(&gw.name)],
            wasm: vec![Wasm {
                name: WASM_NAME.to_string(),
                root_id: Some(WASM_ROOT_ID.to_string()),
                code: WasmCodeSource {
                    type_: "Image".to_string(),
                    image: Some(ImageWasmCodeSource {
                        url: url.to_string(),
                        pull_secret_ref: image.pull_secret().map(|name| SecretObjectReference {
                            name: name.to_string(),
                        }),
                    }),
                },
                config: Some(serde_json::to_value(config)?),
            }],
        },
    };
    if config.action_sets.is_empty() {
        tag_for_deletion(&mut policy.metadata);
    }
    Ok(policy)
}

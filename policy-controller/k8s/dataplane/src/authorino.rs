//! Authorino integration: the Authorino and Limitador instances of the
//! Kuadrant namespace, and one `AuthConfig` per path with an effective
//! AuthPolicy.

use crate::{
    client::{self, ResourceClient},
    reconcile::{meta, reconcile as reconcile_children},
    ReconcileError,
};
use kuadrant_policy_controller_core::{wasm, ResourceId};
use kuadrant_policy_controller_k8s_api::{
    authorino::{AuthConfig, AuthConfigSpec, Authorino, AuthorinoSpec, AUTHORINO_NAME},
    labels,
    limitador::{Limitador, LimitadorSpec, LIMITADOR_NAME},
    ResourceExt,
};
use kuadrant_policy_controller_k8s_index::{policy, KuadrantHistory, State, Topology};
use serde_json::json;

/// Creates the Authorino and Limitador of the Kuadrant namespace when they
/// are missing. Existing instances are left to their operators.
pub async fn ensure_components<C>(client: &C, topology: &Topology) -> Result<(), ReconcileError>
where
    C: ResourceClient<Authorino> + ResourceClient<Limitador> + ?Sized,
{
    let Some(namespace) = topology.kuadrant().and_then(|k| k.namespace()) else {
        return Ok(());
    };
    let deps = topology.dependencies();
    let resources = topology.resources();

    let authorino = ResourceId::new(namespace.clone(), AUTHORINO_NAME);
    if deps.authorino && !resources.authorinos.contains_key(&authorino) {
        tracing::info!(%namespace, name = AUTHORINO_NAME, "Creating Authorino");
        let spec = AuthorinoSpec {
            cluster_wide: Some(true),
            other: json!({
                "listener": { "tls": { "enabled": false } },
                "oidcServer": { "tls": { "enabled": false } },
                "supersedingHostSubsets": true,
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
        };
        let authorino = Authorino {
            metadata: meta(&namespace, AUTHORINO_NAME, labels::managed_labels()),
            spec,
            status: None,
        };
        client::created(ResourceClient::<Authorino>::create(client, &authorino).await)?;
    }

    let limitador = ResourceId::new(namespace.clone(), LIMITADOR_NAME);
    if deps.limitador && !resources.limitadors.contains_key(&limitador) {
        tracing::info!(%namespace, name = LIMITADOR_NAME, "Creating Limitador");
        let limitador = Limitador {
            metadata: meta(&namespace, LIMITADOR_NAME, labels::managed_labels()),
            spec: LimitadorSpec::default(),
            status: None,
        };
        client::created(ResourceClient::<Limitador>::create(client, &limitador).await)?;
    }

    Ok(())
}

/// One AuthConfig per path with an effective AuthPolicy, in `namespace`.
pub fn auth_configs(
    topology: &Topology,
    state: &State,
    namespace: &str,
) -> Result<Vec<AuthConfig>, ReconcileError> {
    let effective = state
        .auth
        .effective
        .as_ref()
        .ok_or(ReconcileError::MissingState("effective AuthPolicies"))?;

    let mut configs = Vec::new();
    for path in topology.route_paths() {
        let id = path.id();
        let Some(policy) = effective.get(&id) else {
            continue;
        };

        let spec = policy::auth_spec(&policy.rules);
        let rules = spec.rules.unwrap_or_default();
        let response = rules
            .response
            .map(serde_json::to_value)
            .transpose()?;

        configs.push(AuthConfig {
            metadata: meta(namespace, &wasm::auth_config_name(&id), labels::managed_labels()),
            spec: AuthConfigSpec {
                hosts: path.hostnames(),
                patterns: spec.patterns,
                // Predicates are evaluated by the wasm shim.
                when: spec
                    .when
                    .into_iter()
                    .filter(|w| w.get("predicate").is_none())
                    .collect(),
                authentication: rules.authentication,
                metadata: rules.metadata,
                authorization: rules.authorization,
                response,
                callbacks: rules.callbacks,
            },
            status: None,
        });
    }
    Ok(configs)
}

/// Reconciles the AuthConfigs of the Kuadrant namespace. Once the Kuadrant
/// CR is gone, the AuthConfigs left in its last namespace are deleted.
pub async fn reconcile_auth_configs<C: ResourceClient<AuthConfig> + ?Sized>(
    client: &C,
    topology: &Topology,
    history: &KuadrantHistory,
    state: &mut State,
) -> Result<(), ReconcileError> {
    if !topology.dependencies().authorino {
        return Ok(());
    }

    let (namespace, desired) = match topology.kuadrant().and_then(|k| k.namespace()) {
        Some(ns) => {
            let desired = auth_configs(topology, state, &ns)?;
            (ns, desired)
        }
        None => match history.namespace() {
            Some(ns) => (ns, Vec::new()),
            None => return Ok(()),
        },
    };

    let existing = topology
        .resources()
        .in_namespace::<AuthConfig>(&namespace)
        .map(AsRef::as_ref);
    reconcile_children(client, existing, desired, None, &mut state.modified).await;
    Ok(())
}

//! Publishes the topology as a Graphviz document in a ConfigMap of the
//! operator namespace.

use crate::{
    client::ResourceClient,
    reconcile::{meta, reconcile as reconcile_children},
    ReconcileError,
};
use kuadrant_policy_controller_k8s_api::{labels, ConfigMap};
use kuadrant_policy_controller_k8s_index::{State, Topology};
use std::collections::BTreeMap;

pub const CONFIG_MAP_NAME: &str = "topology";
pub const CONFIG_MAP_KEY: &str = "topology";

pub fn config_map(namespace: &str, topology: &Topology) -> Result<ConfigMap, ReconcileError> {
    Ok(ConfigMap {
        metadata: meta(namespace, CONFIG_MAP_NAME, labels::managed_labels()),
        data: Some(BTreeMap::from([(
            CONFIG_MAP_KEY.to_string(),
            topology.to_dot()?,
        )])),
        ..Default::default()
    })
}

pub async fn reconcile<C: ResourceClient<ConfigMap> + ?Sized>(
    client: &C,
    topology: &Topology,
    namespace: &str,
    state: &mut State,
) -> Result<(), ReconcileError> {
    // ConfigMaps aren't watched.
    let existing = client.get(namespace, CONFIG_MAP_NAME).await?;
    let desired = config_map(namespace, topology)?;
    reconcile_children(client, existing.as_ref(), vec![desired], None, &mut state.modified).await;
    Ok(())
}

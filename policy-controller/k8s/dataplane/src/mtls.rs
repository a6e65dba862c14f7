//! Strict mTLS between the gateways and the Kuadrant components, enforced
//! by Istio for the whole Kuadrant namespace.

use crate::{
    client::ResourceClient,
    reconcile::{meta, reconcile as reconcile_children, tag_for_deletion},
    ReconcileError,
};
use kuadrant_policy_controller_k8s_api::{
    istio::{PeerAuthentication, PeerAuthenticationMtls, PeerAuthenticationSpec},
    labels, ResourceExt,
};
use kuadrant_policy_controller_k8s_index::{KuadrantHistory, State, Topology};

pub const PEER_AUTHENTICATION_NAME: &str = "kuadrant-mtls";
const STRICT: &str = "STRICT";

/// The PeerAuthentication of the Kuadrant namespace, tagged for deletion
/// unless Kuadrant enables mTLS.
pub fn peer_authentication(namespace: &str, enabled: bool) -> PeerAuthentication {
    let mut peer = PeerAuthentication {
        metadata: meta(namespace, PEER_AUTHENTICATION_NAME, labels::managed_labels()),
        spec: PeerAuthenticationSpec {
            selector: None,
            mtls: Some(PeerAuthenticationMtls {
                mode: STRICT.to_string(),
            }),
        },
    };
    if !enabled {
        tag_for_deletion(&mut peer.metadata);
    }
    peer
}

/// Once the Kuadrant CR is gone, the PeerAuthentication left in its last
/// namespace is deleted.
pub async fn reconcile<C: ResourceClient<PeerAuthentication> + ?Sized>(
    client: &C,
    topology: &Topology,
    history: &KuadrantHistory,
    state: &mut State,
) -> Result<(), ReconcileError> {
    if !topology.dependencies().istio {
        return Ok(());
    }
    let (namespace, enabled) = match topology.kuadrant() {
        Some(kuadrant) => (kuadrant.namespace(), kuadrant.spec.mtls_enabled()),
        None => (history.namespace(), false),
    };
    let Some(namespace) = namespace else {
        return Ok(());
    };

    let desired = peer_authentication(&namespace, enabled);
    let existing = topology
        .resources()
        .in_namespace::<PeerAuthentication>(&namespace)
        .map(AsRef::as_ref);
    reconcile_children(client, existing, vec![desired], None, &mut state.modified).await;
    Ok(())
}

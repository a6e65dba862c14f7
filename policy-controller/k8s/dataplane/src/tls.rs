//! cert-manager Certificates for the TLS listeners targeted by a
//! TLSPolicy.

use crate::{
    client::ResourceClient,
    reconcile::{meta, reconcile as reconcile_children},
    ReconcileError,
};
use kuadrant_policy_controller_core::ResourceId;
use kuadrant_policy_controller_k8s_api::{
    cert_manager::{Certificate, CertificateSpec, ObjectReference},
    labels,
    policy::{tls_policy::IssuerRef, TLSPolicySpec},
    ResourceExt,
};
use kuadrant_policy_controller_k8s_index::{policy, ListenerPath, State, Topology};
use std::collections::BTreeMap;

/// One Certificate per Secret referenced by a TLS listener with an effective
/// TLSPolicy. Listeners sharing a Secret share its Certificate, which then
/// covers all of their hostnames.
pub fn certificates(topology: &Topology, state: &State) -> Vec<Certificate> {
    let Some(effective) = state.tls.effective.as_ref() else {
        return Vec::new();
    };

    let mut certs = BTreeMap::<ResourceId, Certificate>::new();
    for path in topology.listener_paths() {
        let Some(spec) = effective
            .get(&path.id())
            .and_then(|e| policy::whole_spec(&e.rules))
        else {
            continue;
        };
        if !path.listener.is_tls() {
            continue;
        }
        let Some(hostname) = path.listener.hostname.clone() else {
            tracing::debug!(listener = %path.listener.name, "TLS listener without hostname");
            continue;
        };

        for id in secrets(path) {
            let cert = certs
                .entry(id.clone())
                .or_insert_with(|| certificate(&id, spec));
            if !cert.spec.dns_names.contains(&hostname) {
                cert.spec.dns_names.push(hostname.clone());
            }
        }
    }

    certs
        .into_values()
        .map(|mut cert| {
            cert.spec.dns_names.sort();
            cert
        })
        .collect()
}

/// The Secrets a listener's certificate refs name.
pub fn secrets(path: &ListenerPath) -> Vec<ResourceId> {
    let gw_ns = path.gateway.namespace().unwrap_or_default();
    path.listener
        .certificate_refs
        .iter()
        .filter(|r| r.group.is_empty() && r.kind == "Secret")
        .map(|r| {
            let ns = r.namespace.clone().unwrap_or_else(|| gw_ns.clone());
            ResourceId::new(ns, r.name.clone())
        })
        .collect()
}

fn certificate(secret: &ResourceId, spec: &TLSPolicySpec) -> Certificate {
    Certificate {
        metadata: meta(&secret.namespace, &secret.name, labels::managed_labels()),
        spec: CertificateSpec {
            secret_name: secret.name.clone(),
            dns_names: Vec::new(),
            issuer_ref: ObjectReference {
                name: spec.issuer_ref.name.clone(),
                kind: Some(spec.issuer_ref.kind().to_string()),
                group: Some(IssuerRef::GROUP.to_string()),
            },
            common_name: spec.common_name.clone(),
            duration: spec.duration.as_ref().map(ToString::to_string),
            renew_before: spec.renew_before.as_ref().map(ToString::to_string),
            usages: spec.usages.clone(),
            revision_history_limit: spec.revision_history_limit,
            private_key: spec
                .private_key
                .as_ref()
                .and_then(|k| serde_json::to_value(k).ok()),
        },
        status: None,
    }
}

pub async fn reconcile<C: ResourceClient<Certificate> + ?Sized>(
    client: &C,
    topology: &Topology,
    state: &mut State,
) -> Result<(), ReconcileError> {
    if !topology.dependencies().cert_manager {
        return Ok(());
    }
    let desired = certificates(topology, state);
    let existing = topology.resources().certificates.values().map(AsRef::as_ref);
    reconcile_children(client, existing, desired, None, &mut state.modified).await;
    Ok(())
}

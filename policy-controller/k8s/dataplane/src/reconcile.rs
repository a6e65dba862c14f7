//! Creates, updates and deletes generated resources so that the cluster
//! matches what the current topology calls for.
//!
//! Every generated kind goes through [`reconcile`]: desired resources are
//! compared with the existing ones by namespace and name, and existing
//! managed resources that are no longer desired are deleted as orphans.

use crate::client::{self, ResourceClient};
use kuadrant_policy_controller_core::ResourceId;
use kuadrant_policy_controller_k8s_api::{
    self as k8s,
    authorino::AuthConfig,
    cert_manager::Certificate,
    dns::DNSRecord,
    envoy_gateway::{EnvoyExtensionPolicy, EnvoyPatchPolicy},
    istio::{EnvoyFilter, PeerAuthentication, WasmPlugin},
    labels, ConfigMap, ObjectMeta, ResourceExt,
};
use kuadrant_policy_controller_k8s_index::{resource_id, Artifact, Modified};
use std::collections::{BTreeMap, BTreeSet};

/// A generated resource kind.
pub trait Managed: k8s::Resource<DynamicType = ()> + Clone + std::fmt::Debug + Send + Sync {
    /// Whether the part of the resource the controller owns is unchanged.
    fn same_spec(&self, desired: &Self) -> bool;

    /// Overwrites the part of the resource the controller owns.
    fn set_spec(&mut self, desired: Self);
}

/// What a reconciliation changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub created: BTreeSet<ResourceId>,
    pub updated: BTreeSet<ResourceId>,
    pub deleted: BTreeSet<ResourceId>,
}

macro_rules! managed {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Managed for $ty {
                #[inline]
                fn same_spec(&self, desired: &Self) -> bool {
                    self.spec == desired.spec
                }

                #[inline]
                fn set_spec(&mut self, desired: Self) {
                    self.spec = desired.spec;
                }
            }
        )+
    };
}

managed!(
    AuthConfig,
    Certificate,
    DNSRecord,
    EnvoyExtensionPolicy,
    EnvoyFilter,
    EnvoyPatchPolicy,
    PeerAuthentication,
    WasmPlugin,
);

impl Managed for ConfigMap {
    fn same_spec(&self, desired: &Self) -> bool {
        self.data == desired.data
    }

    fn set_spec(&mut self, desired: Self) {
        self.data = desired.data;
    }
}

/// Marks a desired resource as one that should not exist.
pub fn tag_for_deletion(meta: &mut ObjectMeta) {
    meta.annotations
        .get_or_insert_with(Default::default)
        .insert(labels::DELETE_ANNOTATION.to_string(), "true".to_string());
}

pub fn is_tagged_for_deletion<T: ResourceExt>(resource: &T) -> bool {
    resource
        .annotations()
        .get(labels::DELETE_ANNOTATION)
        .is_some_and(|v| v == "true")
}

/// Metadata for a resource generated in `namespace`.
pub fn meta(namespace: &str, name: &str, labels: labels::Map) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(namespace.to_string()),
        name: Some(name.to_string()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Brings `existing` in line with `desired`.
///
/// Existing resources are matched to desired ones by namespace and name.
/// Those carrying the managed label and not desired in this pass are
/// deleted. API errors are logged and the remaining resources are still
/// reconciled; the next pass retries.
///
/// When `artifact` is set, the gateway a created resource is labeled with is
/// marked as modified, so that status updaters report it out of sync until
/// the gateway picks the resource up.
pub async fn reconcile<'a, T, C>(
    client: &C,
    existing: impl IntoIterator<Item = &'a T>,
    desired: Vec<T>,
    artifact: Option<Artifact>,
    modified: &mut Modified,
) -> Reconciled
where
    T: Managed + 'a,
    C: ResourceClient<T> + ?Sized,
{
    let kind = T::kind(&());
    let mut existing = existing
        .into_iter()
        .map(|r| (resource_id(r), r))
        .collect::<BTreeMap<_, _>>();
    let mut reconciled = Reconciled::default();

    for desired in desired {
        let id = resource_id(&desired);
        let current = existing.remove(&id);
        let tagged = is_tagged_for_deletion(&desired);

        match current {
            None if tagged => {}

            None => {
                tracing::debug!(%kind, namespace = %id.namespace, name = %id.name, "Creating");
                match client::created(client.create(&desired).await) {
                    Ok(()) => {
                        if let Some(artifact) = artifact {
                            if let Some(gw) = gateway_of(&desired) {
                                modified.mark(artifact, gw);
                            }
                        }
                        reconciled.created.insert(id);
                    }
                    Err(error) => {
                        tracing::warn!(%kind, namespace = %id.namespace, name = %id.name, %error, "Failed to create");
                    }
                }
            }

            Some(current) if tagged => {
                if is_tagged_for_deletion(current) {
                    continue;
                }
                tracing::debug!(%kind, namespace = %id.namespace, name = %id.name, "Deleting");
                match client::deleted(client.delete(&id.namespace, &id.name).await) {
                    Ok(()) => {
                        reconciled.deleted.insert(id);
                    }
                    Err(error) => {
                        tracing::warn!(%kind, namespace = %id.namespace, name = %id.name, %error, "Failed to delete");
                    }
                }
            }

            Some(current) if is_equivalent(current, &desired) => {}

            Some(current) => {
                let mut updated = current.clone();
                let labels = desired.labels().clone();
                updated.labels_mut().extend(labels);
                updated.set_spec(desired);

                tracing::debug!(%kind, namespace = %id.namespace, name = %id.name, "Updating");
                match client.update(&updated).await {
                    Ok(()) => {
                        reconciled.updated.insert(id);
                    }
                    Err(error) if error.is_removed() => {
                        tracing::debug!(%kind, namespace = %id.namespace, name = %id.name, "Already removed");
                    }
                    Err(error) => {
                        tracing::warn!(%kind, namespace = %id.namespace, name = %id.name, %error, "Failed to update");
                    }
                }
            }
        }
    }

    let orphans = existing
        .into_iter()
        .filter(|(_, r)| is_managed(*r))
        .map(|(id, _)| id);
    for id in orphans {
        tracing::debug!(%kind, namespace = %id.namespace, name = %id.name, "Deleting orphan");
        match client::deleted(client.delete(&id.namespace, &id.name).await) {
            Ok(()) => {
                reconciled.deleted.insert(id);
            }
            Err(error) => {
                tracing::warn!(%kind, namespace = %id.namespace, name = %id.name, %error, "Failed to delete orphan");
            }
        }
    }

    reconciled
}

fn is_equivalent<T: Managed>(current: &T, desired: &T) -> bool {
    let labels = current.labels();
    current.same_spec(desired)
        && desired
            .labels()
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
}

fn is_managed<T: ResourceExt>(resource: &T) -> bool {
    resource
        .labels()
        .get(labels::MANAGED_BY_LABEL)
        .is_some_and(|v| v == labels::MANAGED_BY_VALUE)
}

fn gateway_of<T: ResourceExt>(resource: &T) -> Option<ResourceId> {
    let labels = resource.labels();
    let namespace = labels.get(labels::GATEWAY_NAMESPACE_LABEL)?;
    let name = labels.get(labels::GATEWAY_LABEL)?;
    Some(ResourceId::new(namespace.clone(), name.clone()))
}


//! The watch index. Watches apply their events here; every reconciliation
//! pass then works from an immutable [`Topology`] snapshot of the index.

use crate::{
    resources::{resource_id, Indexed, Resources},
    Topology,
};
use kuadrant_policy_controller_core::ResourceId;
use kuadrant_policy_controller_k8s_api::{self as k8s, ClusterResourceScope, NamespaceResourceScope};
use kubert::index::{ClusterRemoved, NamespacedRemoved};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;

pub type SharedIndex = Arc<RwLock<Index>>;

/// The optional components found installed at startup. Kinds of missing
/// components are never watched.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub gateway_api: bool,
    pub istio: bool,
    pub envoy_gateway: bool,
    pub authorino: bool,
    pub limitador: bool,
    pub cert_manager: bool,
    pub dns_operator: bool,
}

#[derive(Debug)]
pub struct Index {
    resources: Resources,
    dependencies: Dependencies,

    /// Signaled whenever the index changes.
    changed: Arc<Notify>,
}

// === impl Dependencies ===

impl Dependencies {
    pub fn any_gateway_provider(&self) -> bool {
        self.istio || self.envoy_gateway
    }
}

// === impl Index ===

impl Index {
    pub fn shared(dependencies: Dependencies) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            resources: Resources::default(),
            dependencies,
            changed: Arc::new(Notify::new()),
        }))
    }

    pub fn changed(&self) -> Arc<Notify> {
        self.changed.clone()
    }

    pub fn dependencies(&self) -> Dependencies {
        self.dependencies
    }

    /// Set once API discovery completes, before any watch is started.
    pub fn set_dependencies(&mut self, dependencies: Dependencies) {
        self.dependencies = dependencies;
    }

    pub fn size<T: Indexed>(&self) -> usize {
        T::store(&self.resources).len()
    }

    /// Snapshots the index.
    pub fn topology(&self) -> Topology {
        Topology::new(self.resources.clone(), self.dependencies)
    }

    fn apply_resource<T: Indexed>(&mut self, resource: T) {
        let id = resource_id(&resource);
        let store = T::store_mut(&mut self.resources);
        if let Some(existing) = store.get(&id) {
            // Resyncs redeliver unchanged objects.
            let (old, new) = (existing.meta(), resource.meta());
            if old.resource_version.is_some() && old.resource_version == new.resource_version {
                return;
            }
        }
        tracing::trace!(kind = %T::kind(&()), %id, "Applied");
        store.insert(id, Arc::new(resource));
        self.changed.notify_one();
    }

    fn delete_resource<T: Indexed>(&mut self, id: ResourceId) {
        if T::store_mut(&mut self.resources).remove(&id).is_some() {
            tracing::trace!(kind = %T::kind(&()), %id, "Deleted");
            self.changed.notify_one();
        }
    }
}

impl<T> kubert::index::IndexNamespacedResource<T> for Index
where
    T: Indexed + k8s::Resource<Scope = NamespaceResourceScope>,
{
    fn apply(&mut self, resource: T) {
        self.apply_resource(resource);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete_resource::<T>(ResourceId::new(namespace, name));
    }

    fn reset(&mut self, resources: Vec<T>, removed: NamespacedRemoved) {
        for resource in resources {
            self.apply_resource(resource);
        }
        for (namespace, names) in removed {
            for name in names {
                self.delete_resource::<T>(ResourceId::new(namespace.clone(), name));
            }
        }
    }
}

impl<T> kubert::index::IndexClusterResource<T> for Index
where
    T: Indexed + k8s::Resource<Scope = ClusterResourceScope>,
{
    fn apply(&mut self, resource: T) {
        self.apply_resource(resource);
    }

    fn delete(&mut self, name: String) {
        self.delete_resource::<T>(ResourceId::new(String::new(), name));
    }

    fn reset(&mut self, resources: Vec<T>, removed: ClusterRemoved) {
        for resource in resources {
            self.apply_resource(resource);
        }
        for name in removed {
            self.delete_resource::<T>(ResourceId::new(String::new(), name));
        }
    }
}

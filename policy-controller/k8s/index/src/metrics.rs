use crate::{resources::Indexed, Index, SharedIndex};
use kuadrant_policy_controller_k8s_api::{self as k8s, ClusterResourceScope, NamespaceResourceScope};
use kubert::index::{ClusterRemoved, NamespacedRemoved};
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};
use std::sync::Arc;

/// Wraps the shared index to count the watch events applied to it.
pub struct IndexMetrics {
    inner: SharedIndex,

    index_size: Family<IndexLabels, Gauge>,
    index_applies: Family<IndexLabels, Counter>,
    index_deletes: Family<IndexLabels, Counter>,
    index_resets: Family<IndexLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct IndexLabels {
    kind: String,
}

impl IndexMetrics {
    pub fn register(inner: SharedIndex, prom: &mut Registry) -> Self {
        let index_size = Family::default();
        prom.register(
            "index_size",
            "Gauge of the number of resources in the index",
            index_size.clone(),
        );

        let index_applies = Family::default();
        prom.register(
            "index_applies",
            "Count of applies to the index",
            index_applies.clone(),
        );

        let index_deletes = Family::default();
        prom.register(
            "index_deletes",
            "Count of deletes to the index",
            index_deletes.clone(),
        );

        let index_resets = Family::default();
        prom.register(
            "index_resets",
            "Count of resets to the index",
            index_resets.clone(),
        );

        Self {
            inner,
            index_size,
            index_applies,
            index_deletes,
            index_resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn labels<R: Indexed>() -> IndexLabels {
        IndexLabels {
            kind: R::kind(&()).to_string(),
        }
    }

    fn record_size<R: Indexed>(&self) {
        let size = self.inner.read().size::<R>();
        self.index_size
            .get_or_create(&Self::labels::<R>())
            .set(size as i64);
    }
}

impl<R> kubert::index::IndexNamespacedResource<R> for IndexMetrics
where
    R: Indexed + k8s::Resource<Scope = NamespaceResourceScope>,
    Index: kubert::index::IndexNamespacedResource<R>,
{
    fn apply(&mut self, resource: R) {
        self.index_applies.get_or_create(&Self::labels::<R>()).inc();
        kubert::index::IndexNamespacedResource::apply(&mut *self.inner.write(), resource);
        self.record_size::<R>();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.index_deletes.get_or_create(&Self::labels::<R>()).inc();
        kubert::index::IndexNamespacedResource::<R>::delete(
            &mut *self.inner.write(),
            namespace,
            name,
        );
        self.record_size::<R>();
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        self.index_resets.get_or_create(&Self::labels::<R>()).inc();
        kubert::index::IndexNamespacedResource::reset(&mut *self.inner.write(), resources, removed);
        self.record_size::<R>();
    }
}

impl<R> kubert::index::IndexClusterResource<R> for IndexMetrics
where
    R: Indexed + k8s::Resource<Scope = ClusterResourceScope>,
    Index: kubert::index::IndexClusterResource<R>,
{
    fn apply(&mut self, resource: R) {
        self.index_applies.get_or_create(&Self::labels::<R>()).inc();
        kubert::index::IndexClusterResource::apply(&mut *self.inner.write(), resource);
        self.record_size::<R>();
    }

    fn delete(&mut self, name: String) {
        self.index_deletes.get_or_create(&Self::labels::<R>()).inc();
        kubert::index::IndexClusterResource::<R>::delete(&mut *self.inner.write(), name);
        self.record_size::<R>();
    }

    fn reset(&mut self, resources: Vec<R>, removed: ClusterRemoved) {
        self.index_resets.get_or_create(&Self::labels::<R>()).inc();
        kubert::index::IndexClusterResource::reset(&mut *self.inner.write(), resources, removed);
        self.record_size::<R>();
    }
}

use kuadrant_policy_controller_k8s_api::{kuadrant::Kuadrant, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;

/// The last Kuadrant CR observed. Outlives the CR itself so that resources
/// created in its namespace can be cleaned up once it's gone.
#[derive(Clone, Debug, Default)]
pub struct KuadrantHistory(Arc<RwLock<Option<Arc<Kuadrant>>>>);

impl KuadrantHistory {
    /// Records the current Kuadrant CR, if there is one.
    pub fn observe(&self, current: Option<&Arc<Kuadrant>>) {
        if let Some(kuadrant) = current {
            *self.0.write() = Some(kuadrant.clone());
        }
    }

    pub fn last(&self) -> Option<Arc<Kuadrant>> {
        self.0.read().clone()
    }

    pub fn namespace(&self) -> Option<String> {
        self.0.read().as_ref().and_then(|k| k.namespace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kuadrant_policy_controller_k8s_api::ObjectMeta;

    #[test]
    fn remembers_the_last_kuadrant() {
        let history = KuadrantHistory::default();
        assert_eq!(history.namespace(), None);

        let kuadrant = Arc::new(Kuadrant {
            metadata: ObjectMeta {
                namespace: Some("kuadrant-system".to_string()),
                name: Some("kuadrant".to_string()),
                ..Default::default()
            },
            spec: Default::default(),
            status: None,
        });
        history.observe(Some(&kuadrant));
        history.observe(None);
        assert_eq!(history.namespace().as_deref(), Some("kuadrant-system"));
        assert!(history.last().is_some());
    }
}

use crate::{
    core::Config,
    dataplane::{self, Clients},
    index::{KuadrantHistory, SharedIndex, State},
    status::{self, PolicyMetrics, Statuses},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info_span, Instrument};

/// Runs a reconciliation pass whenever the index changes.
pub struct Workflow<C> {
    index: SharedIndex,
    client: C,
    config: Arc<Config>,
    history: KuadrantHistory,
    updates: UnboundedSender<status::Update>,
    metrics: PolicyMetrics,
    debounce: Duration,
}

impl<C: Clients> Workflow<C> {
    pub fn new(
        index: SharedIndex,
        client: C,
        config: Arc<Config>,
        updates: UnboundedSender<status::Update>,
        metrics: PolicyMetrics,
        debounce: Duration,
    ) -> Self {
        Self {
            index,
            client,
            config,
            history: KuadrantHistory::default(),
            updates,
            metrics,
            debounce,
        }
    }

    pub async fn run(self) {
        let changed = self.index.read().changed();
        loop {
            changed.notified().await;
            // Changes arriving while we wait are picked up by this pass.
            tokio::time::sleep(self.debounce).await;
            self.reconcile().instrument(info_span!("reconcile")).await;
        }
    }

    /// Validates and merges policies, writes the data plane resources and
    /// queues status updates, in that order.
    pub async fn reconcile(&self) {
        let topology = self.index.read().topology();
        let mut state = State::compute(&topology);
        self.history.observe(topology.kuadrant());

        dataplane::reconcile(
            &self.client,
            &topology,
            &self.config,
            &self.history,
            &mut state,
        )
        .await;

        let ctx = status::Context {
            topology: &topology,
            state: &state,
            controllers: &self.config.gateway_controllers,
        };
        let Statuses { updates, summaries } = Statuses::compute(&ctx, chrono::Utc::now());
        self.metrics.record(&summaries);
        tracing::debug!(updates = updates.len(), "Reconciled");
        for update in updates {
            if let Err(error) = self.updates.send(update) {
                tracing::error!(%error, "Failed to queue status update");
            }
        }
    }
}

//! Kuadrant Policy Controller data plane
//!
//! Turns the effective policies of a reconciliation pass into the resources
//! that enforce them: Authorino `AuthConfig`s, Limitador limits, the wasm
//! shim configuration and the clusters it calls on each gateway, mTLS,
//! Certificates and DNSRecords.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authorino;
pub mod client;
pub mod cluster;
pub mod dns;
pub mod envoy_gateway;
mod gateway;
pub mod graph;
pub mod istio;
pub mod limitador;
pub mod mtls;
pub mod reconcile;
pub mod tls;
pub mod wasm;

#[cfg(test)]
mod tests;

pub use self::{
    client::{ClientError, Clients, ResourceClient},
    gateway::{auth_cluster_name, extension_name, ratelimit_cluster_name},
    reconcile::{Managed, Reconciled},
};
use kuadrant_policy_controller_core::Config;
use kuadrant_policy_controller_k8s_index::{KuadrantHistory, State, Topology};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("{0} not computed")]
    MissingState(&'static str),

    #[error("failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to render the topology: {0}")]
    Render(#[from] std::fmt::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Runs every data plane reconciler against one topology snapshot.
///
/// A failing reconciler doesn't stop the others. Writes that affect the
/// status of policies are recorded in `state.modified`.
pub async fn reconcile<C: Clients + ?Sized>(
    client: &C,
    topology: &Topology,
    config: &Config,
    history: &KuadrantHistory,
    state: &mut State,
) {
    if let Err(error) = authorino::ensure_components(client, topology).await {
        tracing::error!(%error, "Failed to ensure Kuadrant components");
    }
    if let Err(error) = authorino::reconcile_auth_configs(client, topology, history, state).await {
        tracing::error!(%error, "Failed to reconcile AuthConfigs");
    }
    if let Err(error) = limitador::reconcile(client, topology, state).await {
        tracing::error!(%error, "Failed to reconcile Limitador limits");
    }
    if let Err(error) = istio::reconcile(client, topology, state, config).await {
        tracing::error!(%error, "Failed to reconcile Istio extensions");
    }
    if let Err(error) = envoy_gateway::reconcile(client, topology, state, config).await {
        tracing::error!(%error, "Failed to reconcile Envoy Gateway extensions");
    }
    if let Err(error) = mtls::reconcile(client, topology, history, state).await {
        tracing::error!(%error, "Failed to reconcile mTLS");
    }
    if let Err(error) = tls::reconcile(client, topology, state).await {
        tracing::error!(%error, "Failed to reconcile Certificates");
    }
    if let Err(error) = dns::reconcile(client, topology, state, &config.dns).await {
        tracing::error!(%error, "Failed to reconcile DNSRecords");
    }
    if let Err(error) = graph::reconcile(client, topology, &config.operator_namespace, state).await
    {
        tracing::error!(%error, "Failed to publish the topology");
    }
}

//! Kuadrant Policy Controller index
//!
//! Watches apply the resources the controller cares about to a shared
//! [`Index`]. Every reconciliation pass snapshots the index into a
//! [`Topology`], linking policies to the Gateway API objects they target:
//!
//! ```text
//! [ Kuadrant ] -> [ GatewayClass ] -> [ Gateway ] -> [ Listener ] -> [ HTTPRoute ] -> [ HTTPRouteRule ]
//!                                          ^              ^                ^                  ^
//!                                          |              |                |                  |
//!                                          +------------- [ AuthPolicy, RateLimitPolicy, ... ]
//! ```
//!
//! Policies are then validated and merged along every path of the topology,
//! producing the [`State`] that the data plane and status stages consume.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod effective;
mod history;
mod index;
mod metrics;
pub mod policy;
mod resources;
mod state;
pub mod topology;
pub mod validate;

#[cfg(test)]
mod tests;

pub use self::{
    effective::EffectivePolicies,
    history::KuadrantHistory,
    index::{Dependencies, Index, SharedIndex},
    metrics::IndexMetrics,
    policy::{KuadrantPolicy, PathScope, RateLimitRule},
    resources::{resource_id, Indexed, Resources, Store},
    state::{Artifact, Modified, PolicyState, State},
    topology::{ListenerPath, RoutePath, Topology},
    validate::Validations,
};

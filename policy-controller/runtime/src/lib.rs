#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kuadrant_policy_controller_core as core;
pub use kuadrant_policy_controller_k8s_api as k8s;
pub use kuadrant_policy_controller_k8s_dataplane as dataplane;
pub use kuadrant_policy_controller_k8s_index as index;
pub use kuadrant_policy_controller_k8s_status as status;

mod args;
mod client;
pub mod discovery;
mod workflow;

pub use self::{args::Args, client::KubeClient, workflow::Workflow};

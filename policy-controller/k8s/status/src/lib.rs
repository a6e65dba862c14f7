//! Kuadrant Policy Controller status
//!
//! The last stage of a reconciliation pass: every policy gets an `Accepted`
//! condition from its validation and, once accepted, an `Enforced` condition
//! reflecting whether its rules reached the data plane. Patches are only
//! produced for statuses that changed, and are applied by the [`Controller`].

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod conditions;
mod controller;
mod enforced;
mod metrics;
mod update;


pub use self::{
    conditions::Enforcement,
    controller::Controller,
    enforced::{enforcement, Context},
    metrics::PolicyMetrics,
    update::{Statuses, StatusPolicy, Summary, Update},
};

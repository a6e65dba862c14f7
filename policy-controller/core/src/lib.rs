#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cel;
pub mod config;
mod error;
mod kind;
pub mod limitador;
mod locator;
pub mod merge;
pub mod route_match;
pub mod wasm;

pub use self::{
    config::{Config, GatewayControllers, GatewayProvider},
    error::PolicyError,
    kind::PolicyKind,
    locator::{Locator, PathId, ResourceId},
    merge::{EffectivePolicy, MergeablePolicy, Rule, Rules, Strategy},
};

pub const POLICY_CONTROLLER_NAME: &str = "kuadrant.io/policy-controller";

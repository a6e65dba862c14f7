#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authorino;
pub mod cert_manager;
pub mod dns;
pub mod duration;
pub mod envoy_gateway;
pub mod istio;
pub mod kuadrant;
pub mod labels;
pub mod limitador;
pub mod policy;
pub mod status;

pub use self::{duration::K8sDuration, status::StatusCondition};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::ConfigMap,
    },
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    ClusterResourceScope, NamespaceResourceScope,
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, PostParams, ResourceExt},
    Client, Error, Resource,
};

/// Gateway API resources, as published by the `gateway-api` crate.
pub mod gateway {
    pub use gateway_api::apis::standard::{gatewayclasses::GatewayClass, gateways::Gateway};
    // Rule names are only part of the experimental channel.
    pub use gateway_api::apis::experimental::httproutes::{HTTPRoute, HTTPRouteRules};

    pub const GROUP: &str = "gateway.networking.k8s.io";
}

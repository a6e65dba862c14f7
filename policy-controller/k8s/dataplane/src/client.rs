use kuadrant_policy_controller_k8s_api::{
    authorino::{AuthConfig, Authorino},
    cert_manager::Certificate,
    dns::DNSRecord,
    envoy_gateway::{EnvoyExtensionPolicy, EnvoyPatchPolicy},
    istio::{EnvoyFilter, PeerAuthentication, WasmPlugin},
    limitador::Limitador,
    ConfigMap,
};

/// The outcome of an API call, reduced to what reconcilers act on.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("conflict")]
    Conflict,

    /// The object was removed while the request was in flight.
    #[error("gone")]
    Gone,

    #[error("{0}")]
    Other(String),
}

/// Writes resources of one kind to the cluster.
#[async_trait::async_trait]
pub trait ResourceClient<T>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>, ClientError>;

    async fn create(&self, resource: &T) -> Result<(), ClientError>;

    async fn update(&self, resource: &T) -> Result<(), ClientError>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ClientError>;
}

/// A client for every kind the data plane reconcilers write.
pub trait Clients:
    ResourceClient<AuthConfig>
    + ResourceClient<Authorino>
    + ResourceClient<Certificate>
    + ResourceClient<ConfigMap>
    + ResourceClient<DNSRecord>
    + ResourceClient<EnvoyExtensionPolicy>
    + ResourceClient<EnvoyFilter>
    + ResourceClient<EnvoyPatchPolicy>
    + ResourceClient<Limitador>
    + ResourceClient<PeerAuthentication>
    + ResourceClient<WasmPlugin>
{
}

impl<C> Clients for C where
    C: ResourceClient<AuthConfig>
        + ResourceClient<Authorino>
        + ResourceClient<Certificate>
        + ResourceClient<ConfigMap>
        + ResourceClient<DNSRecord>
        + ResourceClient<EnvoyExtensionPolicy>
        + ResourceClient<EnvoyFilter>
        + ResourceClient<EnvoyPatchPolicy>
        + ResourceClient<Limitador>
        + ResourceClient<PeerAuthentication>
        + ResourceClient<WasmPlugin>
{
}

// === impl ClientError ===

impl ClientError {
    /// Whether an update failed because the object no longer exists.
    pub fn is_removed(&self) -> bool {
        matches!(self, Self::NotFound | Self::Gone)
    }
}

/// Treats an object that already exists as created.
pub fn created(result: Result<(), ClientError>) -> Result<(), ClientError> {
    match result {
        Err(ClientError::AlreadyExists) => Ok(()),
        result => result,
    }
}

/// Treats an object that doesn't exist as deleted.
pub fn deleted(result: Result<(), ClientError>) -> Result<(), ClientError> {
    match result {
        Err(ClientError::NotFound) => Ok(()),
        result => result,
    }
}

use crate::{dataplane::ClientError, k8s};
use kube::api::DeleteParams;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Writes resources through the Kubernetes API.
#[derive(Clone)]
pub struct KubeClient {
    client: k8s::Client,
}

impl KubeClient {
    pub fn new(client: k8s::Client) -> Self {
        Self { client }
    }

    fn api<T>(&self, namespace: &str) -> k8s::Api<T>
    where
        T: k8s::Resource<DynamicType = (), Scope = k8s::NamespaceResourceScope>,
    {
        k8s::Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl<T> crate::dataplane::ResourceClient<T> for KubeClient
where
    T: k8s::Resource<DynamicType = (), Scope = k8s::NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<T>, ClientError> {
        self.api::<T>(namespace)
            .get_opt(name)
            .await
            .map_err(client_error)
    }

    async fn create(&self, resource: &T) -> Result<(), ClientError> {
        let namespace = resource.meta().namespace.as_deref().unwrap_or_default();
        self.api::<T>(namespace)
            .create(&k8s::PostParams::default(), resource)
            .await
            .map_err(client_error)?;
        Ok(())
    }

    async fn update(&self, resource: &T) -> Result<(), ClientError> {
        let namespace = resource.meta().namespace.as_deref().unwrap_or_default();
        let name = resource.meta().name.as_deref().unwrap_or_default();
        self.api::<T>(namespace)
            .replace(name, &k8s::PostParams::default(), resource)
            .await
            .map_err(client_error)?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), ClientError> {
        self.api::<T>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(client_error)?;
        Ok(())
    }
}

fn client_error(error: k8s::Error) -> ClientError {
    match error {
        k8s::Error::Api(response) => match response.code {
            404 => ClientError::NotFound,
            409 if response.reason == "AlreadyExists" => ClientError::AlreadyExists,
            409 => ClientError::Conflict,
            410 => ClientError::Gone,
            _ => ClientError::Other(response.message),
        },
        error => ClientError::Other(error.to_string()),
    }
}

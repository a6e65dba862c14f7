use crate::{
    index::Dependencies,
    k8s::{
        authorino::Authorino, cert_manager::Certificate, dns::DNSRecord,
        envoy_gateway::EnvoyExtensionPolicy, gateway, istio::WasmPlugin, limitador::Limitador,
        Client, Resource,
    },
};

/// Finds the optional components installed in the cluster, each identified
/// by one of its custom resource kinds.
pub async fn dependencies(client: &Client) -> Dependencies {
    let dependencies = Dependencies {
        gateway_api: api_resource_exists::<gateway::HTTPRoute>(client).await,
        istio: api_resource_exists::<WasmPlugin>(client).await,
        envoy_gateway: api_resource_exists::<EnvoyExtensionPolicy>(client).await,
        authorino: api_resource_exists::<Authorino>(client).await,
        limitador: api_resource_exists::<Limitador>(client).await,
        cert_manager: api_resource_exists::<Certificate>(client).await,
        dns_operator: api_resource_exists::<DNSRecord>(client).await,
    };
    tracing::info!(?dependencies, "Discovered dependencies");
    dependencies
}

pub async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}

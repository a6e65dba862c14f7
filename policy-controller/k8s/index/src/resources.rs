use kuadrant_policy_controller_core::ResourceId;
use kuadrant_policy_controller_k8s_api::{
    self as k8s, authorino, cert_manager, dns, envoy_gateway, gateway, istio, kuadrant, limitador,
    policy, ResourceExt,
};
use std::{collections::BTreeMap, sync::Arc};

/// Resources of one kind, by namespace and name. Cluster-scoped resources
/// have an empty namespace.
pub type Store<T> = BTreeMap<ResourceId, Arc<T>>;

/// Every resource the controller watches.
#[derive(Clone, Debug, Default)]
pub struct Resources {
    pub gateway_classes: Store<gateway::GatewayClass>,
    pub gateways: Store<gateway::Gateway>,
    pub http_routes: Store<gateway::HTTPRoute>,

    pub auth_policies: Store<policy::AuthPolicy>,
    pub ratelimit_policies: Store<policy::RateLimitPolicy>,
    pub token_ratelimit_policies: Store<policy::TokenRateLimitPolicy>,
    pub tls_policies: Store<policy::TLSPolicy>,
    pub dns_policies: Store<policy::DNSPolicy>,

    pub kuadrants: Store<kuadrant::Kuadrant>,
    pub limitadors: Store<limitador::Limitador>,
    pub authorinos: Store<authorino::Authorino>,
    pub auth_configs: Store<authorino::AuthConfig>,

    pub envoy_filters: Store<istio::EnvoyFilter>,
    pub wasm_plugins: Store<istio::WasmPlugin>,
    pub peer_authentications: Store<istio::PeerAuthentication>,
    pub envoy_patch_policies: Store<envoy_gateway::EnvoyPatchPolicy>,
    pub envoy_extension_policies: Store<envoy_gateway::EnvoyExtensionPolicy>,

    pub certificates: Store<cert_manager::Certificate>,
    pub issuers: Store<cert_manager::Issuer>,
    pub cluster_issuers: Store<cert_manager::ClusterIssuer>,
    pub dns_records: Store<dns::DNSRecord>,
}

/// A resource kind held in [`Resources`].
pub trait Indexed: k8s::Resource<DynamicType = ()> + Sized {
    fn store(resources: &Resources) -> &Store<Self>;
    fn store_mut(resources: &mut Resources) -> &mut Store<Self>;
}

pub fn resource_id<T: k8s::Resource>(resource: &T) -> ResourceId {
    ResourceId::new(
        resource.namespace().unwrap_or_default(),
        resource.name_unchecked(),
    )
}

macro_rules! indexed {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(
            impl Indexed for $ty {
                #[inline]
                fn store(resources: &Resources) -> &Store<Self> {
                    &resources.$field
                }

                #[inline]
                fn store_mut(resources: &mut Resources) -> &mut Store<Self> {
                    &mut resources.$field
                }
            }
        )+
    };
}

indexed! {
    gateway::GatewayClass => gateway_classes,
    gateway::Gateway => gateways,
    gateway::HTTPRoute => http_routes,
    policy::AuthPolicy => auth_policies,
    policy::RateLimitPolicy => ratelimit_policies,
    policy::TokenRateLimitPolicy => token_ratelimit_policies,
    policy::TLSPolicy => tls_policies,
    policy::DNSPolicy => dns_policies,
    kuadrant::Kuadrant => kuadrants,
    limitador::Limitador => limitadors,
    authorino::Authorino => authorinos,
    authorino::AuthConfig => auth_configs,
    istio::EnvoyFilter => envoy_filters,
    istio::WasmPlugin => wasm_plugins,
    istio::PeerAuthentication => peer_authentications,
    envoy_gateway::EnvoyPatchPolicy => envoy_patch_policies,
    envoy_gateway::EnvoyExtensionPolicy => envoy_extension_policies,
    cert_manager::Certificate => certificates,
    cert_manager::Issuer => issuers,
    cert_manager::ClusterIssuer => cluster_issuers,
    dns::DNSRecord => dns_records,
}

impl Resources {
    pub fn get<T: Indexed>(&self, id: &ResourceId) -> Option<&Arc<T>> {
        T::store(self).get(id)
    }

    pub fn list<T: Indexed + 'static>(&self) -> impl Iterator<Item = &Arc<T>> {
        T::store(self).values()
    }

    pub fn in_namespace<'r, T: Indexed + 'static>(
        &'r self,
        namespace: &'r str,
    ) -> impl Iterator<Item = &'r Arc<T>> + 'r {
        T::store(self)
            .iter()
            .filter(move |(id, _)| id.namespace == namespace)
            .map(|(_, r)| r)
    }

    pub fn insert<T: Indexed>(&mut self, resource: T) {
        let id = resource_id(&resource);
        T::store_mut(self).insert(id, Arc::new(resource));
    }
}

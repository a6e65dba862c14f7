use crate::{
    client::KubeClient,
    core::{
        config::{DnsDefaults, WasmConfig},
        Config, GatewayControllers,
    },
    discovery,
    index::{self, IndexMetrics},
    k8s::{
        authorino, cert_manager, dns, envoy_gateway, gateway, istio, kuadrant, limitador, policy,
    },
    status,
    workflow::Workflow,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "policy", about = "The Kuadrant policy controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "kuadrant=info,warn",
        env = "KUADRANT_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Namespace the controller and its topology ConfigMap live in.
    #[clap(long, default_value = "kuadrant-system", env = "OPERATOR_NAMESPACE")]
    operator_namespace: String,

    #[clap(
        long,
        default_value = "oci://quay.io/kuadrant/wasm-shim:latest",
        env = "RELATED_IMAGE_WASMSHIM"
    )]
    wasm_shim_image: String,

    #[clap(long, default_value = "registry.redhat.io", env = "PROTECTED_REGISTRY")]
    protected_registry: String,

    #[clap(
        long,
        default_value = "istio.io/gateway-controller,openshift.io/gateway-controller/v1",
        env = "ISTIO_GATEWAY_CONTROLLER_NAMES",
        value_delimiter = ','
    )]
    istio_gateway_controller_names: Vec<String>,

    #[clap(
        long,
        default_value = "gateway.envoyproxy.io/gatewayclass-controller",
        env = "ENVOY_GATEWAY_GATEWAY_CONTROLLER_NAMES",
        value_delimiter = ','
    )]
    envoy_gateway_gateway_controller_names: Vec<String>,

    /// TTL of DNS records, in seconds.
    #[clap(long, default_value = "60", env = "DNS_DEFAULT_TTL")]
    dns_default_ttl: u64,

    /// TTL of load-balanced DNS records, in seconds.
    #[clap(long, default_value = "300", env = "DNS_DEFAULT_LB_TTL")]
    dns_default_lb_ttl: u64,

    #[clap(long, default_value = "500")]
    reconcile_debounce_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    fn config(&self) -> Config {
        Config {
            operator_namespace: self.operator_namespace.clone(),
            gateway_controllers: GatewayControllers {
                istio: self.istio_gateway_controller_names.clone(),
                envoy_gateway: self.envoy_gateway_gateway_controller_names.clone(),
            },
            wasm: WasmConfig {
                image: self.wasm_shim_image.clone(),
                protected_registry: self.protected_registry.clone(),
            },
            dns: DnsDefaults {
                ttl: Duration::from_secs(self.dns_default_ttl),
                lb_ttl: Duration::from_secs(self.dns_default_lb_ttl),
            },
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = Arc::new(self.config());
        let Self {
            admin,
            client,
            log_level,
            log_format,
            reconcile_debounce_ms,
            ..
        } = self;

        // Dependencies are only known once the client is up; the index is
        // created first so its metrics can be registered with the runtime.
        let index = index::Index::shared(Default::default());

        let mut prom = <Registry>::default();
        let policy_metrics =
            status::PolicyMetrics::register(prom.sub_registry_with_prefix("kuadrant"));
        let index_metrics =
            IndexMetrics::register(index.clone(), prom.sub_registry_with_prefix("index")).shared();
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let dependencies = discovery::dependencies(&runtime.client()).await;
        index.write().set_dependencies(dependencies);

        macro_rules! watch {
            ($index:ident, $ty:ty, $span:literal) => {{
                let events = runtime.watch_all::<$ty>(watcher::Config::default());
                tokio::spawn(
                    kubert::index::$index(index_metrics.clone(), events)
                        .instrument(info_span!($span)),
                );
            }};
        }

        // Spawn resource watches.

        watch!(namespaced, kuadrant::Kuadrant, "kuadrants");
        watch!(namespaced, policy::AuthPolicy, "authpolicies");
        watch!(namespaced, policy::RateLimitPolicy, "ratelimitpolicies");
        watch!(namespaced, policy::TokenRateLimitPolicy, "tokenratelimitpolicies");
        watch!(namespaced, policy::TLSPolicy, "tlspolicies");
        watch!(namespaced, policy::DNSPolicy, "dnspolicies");

        if dependencies.gateway_api {
            watch!(cluster, gateway::GatewayClass, "gatewayclasses");
            watch!(namespaced, gateway::Gateway, "gateways");
            watch!(namespaced, gateway::HTTPRoute, "httproutes");
        } else {
            tracing::warn!("Gateway API resource kinds not found, skipping watches");
        }

        if dependencies.istio {
            watch!(namespaced, istio::EnvoyFilter, "envoyfilters");
            watch!(namespaced, istio::WasmPlugin, "wasmplugins");
            watch!(namespaced, istio::PeerAuthentication, "peerauthentications");
        }

        if dependencies.envoy_gateway {
            watch!(namespaced, envoy_gateway::EnvoyPatchPolicy, "envoypatchpolicies");
            watch!(namespaced, envoy_gateway::EnvoyExtensionPolicy, "envoyextensionpolicies");
        }

        if !dependencies.any_gateway_provider() {
            tracing::warn!("No gateway provider found, policies will not be enforced");
        }

        if dependencies.authorino {
            watch!(namespaced, authorino::Authorino, "authorinos");
            watch!(namespaced, authorino::AuthConfig, "authconfigs");
        }

        if dependencies.limitador {
            watch!(namespaced, limitador::Limitador, "limitadors");
        }

        if dependencies.cert_manager {
            watch!(namespaced, cert_manager::Certificate, "certificates");
            watch!(namespaced, cert_manager::Issuer, "issuers");
            watch!(cluster, cert_manager::ClusterIssuer, "clusterissuers");
        }

        if dependencies.dns_operator {
            watch!(namespaced, dns::DNSRecord, "dnsrecords");
        }

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let status_controller = status::Controller::new(runtime.client(), updates_rx);
        tokio::spawn(
            status_controller
                .process_updates()
                .instrument(info_span!("status_controller")),
        );

        let workflow = Workflow::new(
            index,
            KubeClient::new(runtime.client()),
            config,
            updates_tx,
            policy_metrics,
            Duration::from_millis(reconcile_debounce_ms),
        );
        tokio::spawn(workflow.run().instrument(info_span!("workflow")));

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

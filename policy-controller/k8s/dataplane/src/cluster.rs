//! Envoy clusters through which the wasm shim reaches Authorino, Limitador
//! and the tracing collector.

use kuadrant_policy_controller_core::wasm;
use serde_json::{json, Value};

const AUTHORINO_PORT: u16 = 50051;
const LIMITADOR_PORT: u16 = 8081;
const DEFAULT_TRACING_PORT: u16 = 4317;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterEndpoint {
    pub cluster_name: &'static str,
    pub host: String,
    pub port: u16,
}

// === impl ClusterEndpoint ===

impl ClusterEndpoint {
    /// Authorino's authorization service in the Kuadrant namespace.
    pub fn auth(namespace: &str) -> Self {
        Self {
            cluster_name: wasm::AUTH_CLUSTER_NAME,
            host: format!("authorino-authorino-authorization.{namespace}.svc.cluster.local"),
            port: AUTHORINO_PORT,
        }
    }

    /// Limitador's gRPC service in the Kuadrant namespace.
    pub fn ratelimit(namespace: &str) -> Self {
        Self {
            cluster_name: wasm::RATELIMIT_CLUSTER_NAME,
            host: format!("limitador-limitador.{namespace}.svc.cluster.local"),
            port: LIMITADOR_PORT,
        }
    }

    /// Parses a collector URL such as `rpc://jaeger.observability:4317`.
    pub fn tracing(url: &str) -> Option<Self> {
        let authority = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        let authority = authority.split('/').next()?;
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (authority, DEFAULT_TRACING_PORT),
        };
        if host.is_empty() {
            return None;
        }
        Some(Self {
            cluster_name: wasm::TRACING_CLUSTER_NAME,
            host: host.to_string(),
            port,
        })
    }

    /// The Envoy `Cluster` resource, as JSON. With `mtls`, upstream
    /// connections present the gateway's Istio workload certificate.
    pub fn to_cluster(&self, mtls: bool) -> Value {
        let mut cluster = json!({
            "name": self.cluster_name,
            "type": "STRICT_DNS",
            "connect_timeout": "1s",
            "lb_policy": "ROUND_ROBIN",
            "http2_protocol_options": {},
            "load_assignment": {
                "cluster_name": self.cluster_name,
                "endpoints": [{
                    "lb_endpoints": [{
                        "endpoint": {
                            "address": {
                                "socket_address": {
                                    "address": self.host,
                                    "port_value": self.port,
                                },
                            },
                        },
                    }],
                }],
            },
        });

        if mtls {
            cluster["transport_socket"] = json!({
                "name": "envoy.transport_sockets.tls",
                "typed_config": {
                    "@type": "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext",
                    "common_tls_context": {
                        "tls_certificate_sds_secret_configs": [{
                            "name": "default",
                            "sds_config": { "api_config_source": {
                                "api_type": "GRPC",
                                "grpc_services": [{ "envoy_grpc": { "cluster_name": "sds-grpc" } }],
                            } },
                        }],
                        "validation_context_sds_secret_config": {
                            "name": "ROOTCA",
                            "sds_config": { "api_config_source": {
                                "api_type": "GRPC",
                                "grpc_services": [{ "envoy_grpc": { "cluster_name": "sds-grpc" } }],
                            } },
                        },
                    },
                },
            });
        }

        cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("rpc://jaeger.observability:4317", Some(("jaeger.observability", 4317)))]
    #[case("http://otel-collector:4318/v1/traces", Some(("otel-collector", 4318)))]
    #[case("collector.tracing", Some(("collector.tracing", 4317)))]
    #[case("rpc://collector:port", None)]
    #[case("rpc://", None)]
    fn parses_tracing_endpoints(#[case] url: &str, #[case] expected: Option<(&str, u16)>) {
        let parsed = ClusterEndpoint::tracing(url);
        assert_eq!(
            parsed.as_ref().map(|e| (e.host.as_str(), e.port)),
            expected,
        );
    }

    #[test]
    fn clusters_point_at_the_kuadrant_namespace() {
        let cluster = ClusterEndpoint::ratelimit("kuadrant-system").to_cluster(false);
        assert_eq!(cluster["name"], "kuadrant-ratelimit-service");
        assert_eq!(
            cluster["load_assignment"]["endpoints"][0]["lb_endpoints"][0]["endpoint"]["address"]
                ["socket_address"],
            json!({
                "address": "limitador-limitador.kuadrant-system.svc.cluster.local",
                "port_value": 8081,
            })
        );
        assert!(cluster.get("transport_socket").is_none());

        let mtls = ClusterEndpoint::auth("kuadrant-system").to_cluster(true);
        assert_eq!(
            mtls["transport_socket"]["name"],
            "envoy.transport_sockets.tls"
        );
    }
}

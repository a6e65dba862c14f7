use std::time::Duration;

pub const ISTIO_GATEWAY_CONTROLLER_NAME: &str = "istio.io/gateway-controller";
pub const ENVOY_GATEWAY_GATEWAY_CONTROLLER_NAME: &str =
    "gateway.envoyproxy.io/gatewayclass-controller";
const UNKNOWN_GATEWAY_CONTROLLER_NAME: &str = "Unknown";

/// Controller-wide settings, fixed at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub operator_namespace: String,
    pub gateway_controllers: GatewayControllers,
    pub wasm: WasmConfig,
    pub dns: DnsDefaults,
}

/// The GatewayClass controller names handled by each gateway provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayControllers {
    pub istio: Vec<String>,
    pub envoy_gateway: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GatewayProvider {
    Istio,
    EnvoyGateway,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WasmConfig {
    pub image: String,
    /// Images from this registry are pulled with the `wasm-plugin-pull-secret`.
    pub protected_registry: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DnsDefaults {
    pub ttl: Duration,
    pub lb_ttl: Duration,
}

// === impl GatewayControllers ===

impl Default for GatewayControllers {
    fn default() -> Self {
        Self {
            istio: vec![ISTIO_GATEWAY_CONTROLLER_NAME.to_string()],
            envoy_gateway: vec![ENVOY_GATEWAY_GATEWAY_CONTROLLER_NAME.to_string()],
        }
    }
}

impl GatewayControllers {
    pub fn provider_for(&self, controller_name: &str) -> Option<GatewayProvider> {
        if self.istio.iter().any(|n| n == controller_name) {
            return Some(GatewayProvider::Istio);
        }
        if self.envoy_gateway.iter().any(|n| n == controller_name) {
            return Some(GatewayProvider::EnvoyGateway);
        }
        None
    }

    /// Maps any configured controller name to its provider's default name.
    pub fn default_controller_name(&self, controller_name: &str) -> &'static str {
        match self.provider_for(controller_name) {
            Some(GatewayProvider::Istio) => ISTIO_GATEWAY_CONTROLLER_NAME,
            Some(GatewayProvider::EnvoyGateway) => ENVOY_GATEWAY_GATEWAY_CONTROLLER_NAME,
            None => UNKNOWN_GATEWAY_CONTROLLER_NAME,
        }
    }
}

// === impl GatewayProvider ===

impl GatewayProvider {
    pub const ALL: [GatewayProvider; 2] = [GatewayProvider::Istio, GatewayProvider::EnvoyGateway];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Istio => "istio",
            Self::EnvoyGateway => "envoygateway",
        }
    }
}

// === impl WasmConfig ===

impl Default for WasmConfig {
    fn default() -> Self {
        Self {
            image: "oci://quay.io/kuadrant/wasm-shim:latest".to_string(),
            protected_registry: "registry.redhat.io".to_string(),
        }
    }
}

impl WasmConfig {
    pub const PULL_SECRET_NAME: &'static str = "wasm-plugin-pull-secret";

    pub fn pull_secret(&self) -> Option<&'static str> {
        let image = self.image.strip_prefix("oci://").unwrap_or(&self.image);
        if !self.protected_registry.is_empty() && image.starts_with(&self.protected_registry) {
            Some(Self::PULL_SECRET_NAME)
        } else {
            None
        }
    }
}

// === impl DnsDefaults ===

impl Default for DnsDefaults {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            lb_ttl: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_controller_names() {
        let controllers = GatewayControllers::default();
        assert_eq!(
            controllers.default_controller_name("istio.io/gateway-controller"),
            ISTIO_GATEWAY_CONTROLLER_NAME
        );
        assert_eq!(
            controllers.default_controller_name("gateway.envoyproxy.io/gatewayclass-controller"),
            ENVOY_GATEWAY_GATEWAY_CONTROLLER_NAME
        );
        assert_eq!(controllers.default_controller_name("example.com/other"), "Unknown");

        let custom = GatewayControllers {
            istio: vec!["openshift.io/gateway-controller/v1".to_string()],
            envoy_gateway: vec![],
        };
        assert_eq!(
            custom.default_controller_name("openshift.io/gateway-controller/v1"),
            ISTIO_GATEWAY_CONTROLLER_NAME
        );
        assert_eq!(custom.provider_for("istio.io/gateway-controller"), None);
    }

    #[test]
    fn pull_secret_only_for_protected_registry() {
        let config = WasmConfig {
            image: "oci://registry.redhat.io/rhcl/wasm-shim:v1".to_string(),
            ..Default::default()
        };
        assert_eq!(config.pull_secret(), Some(WasmConfig::PULL_SECRET_NAME));
        assert_eq!(WasmConfig::default().pull_secret(), None);
    }
}

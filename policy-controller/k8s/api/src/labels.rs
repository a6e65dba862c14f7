use std::collections::BTreeMap;

/// Set on every resource the controller creates so that orphans can be found.
pub const MANAGED_BY_LABEL: &str = "kuadrant.io/managed";
pub const MANAGED_BY_VALUE: &str = "true";

/// Marks a desired resource as "should not exist".
pub const DELETE_ANNOTATION: &str = "kuadrant.io/delete";

pub const GATEWAY_LABEL: &str = "kuadrant.io/gateway";
pub const GATEWAY_NAMESPACE_LABEL: &str = "kuadrant.io/gateway-namespace";

pub type Map = BTreeMap<String, String>;

/// Labels placed on resources derived for a single gateway.
pub fn gateway_labels(namespace: &str, name: &str) -> Map {
    let mut labels = managed_labels();
    labels.insert(GATEWAY_NAMESPACE_LABEL.to_string(), namespace.to_string());
    labels.insert(GATEWAY_LABEL.to_string(), name.to_string());
    labels
}

/// Labels placed on resources that are not derived from a single gateway.
pub fn managed_labels() -> Map {
    let mut labels = Map::new();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    labels
}

use kuadrant_policy_controller_k8s_api as k8s;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable key for an object or policy in the topology, of the form
/// `kind.group:namespace/name`, lowercased in its kind and group. Sections of
/// an object (listeners, route rules) append `#section`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

/// Identifies a path of targetables from a GatewayClass to a leaf.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

// === impl Locator ===

impl Locator {
    pub fn new(kind: &str, group: &str, namespace: Option<&str>, name: &str) -> Self {
        let mut locator = kind.to_ascii_lowercase();
        if !group.is_empty() {
            locator.push('.');
            locator.push_str(&group.to_ascii_lowercase());
        }
        locator.push(':');
        if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
            locator.push_str(ns);
            locator.push('/');
        }
        locator.push_str(name);
        Self(locator)
    }

    pub fn for_resource<T>(resource: &T) -> Self
    where
        T: k8s::Resource,
        T::DynamicType: Default,
    {
        let dt = Default::default();
        let meta = resource.meta();
        Self::new(
            &T::kind(&dt),
            &T::group(&dt),
            meta.namespace.as_deref(),
            meta.name.as_deref().unwrap_or_default(),
        )
    }

    /// A section of the located object.
    pub fn section(&self, section: &str) -> Self {
        Self(format!("{}#{section}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The lowercased `kind.group` prefix.
    pub fn kind(&self) -> &str {
        self.0.split_once(':').map(|(k, _)| k).unwrap_or_default()
    }

    /// The `namespace/name` part, without any section.
    pub fn namespaced_name(&self) -> &str {
        let rest = self.0.split_once(':').map(|(_, r)| r).unwrap_or(&self.0);
        rest.split_once('#').map(|(n, _)| n).unwrap_or(rest)
    }

    /// The namespace and name of the located object. Cluster-scoped objects
    /// have an empty namespace.
    pub fn resource_id(&self) -> ResourceId {
        match self.namespaced_name().split_once('/') {
            Some((ns, name)) => ResourceId::new(ns, name),
            None => ResourceId::new("", self.namespaced_name()),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// === impl PathId ===

impl PathId {
    pub fn new<'l>(locators: impl IntoIterator<Item = &'l Locator>) -> Self {
        let ids = locators
            .into_iter()
            .map(Locator::as_str)
            .collect::<Vec<_>>();
        Self(ids.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

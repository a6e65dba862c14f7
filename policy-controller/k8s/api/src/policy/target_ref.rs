use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Targets a Gateway API resource in the policy's namespace, optionally
/// narrowed to one of its sections (a listener or a route rule).
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetReference {
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl LocalPolicyTargetReference {
    pub fn from_resource<T>(resource: &T) -> Option<Self>
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        let dt = Default::default();
        Some(Self {
            group: T::group(&dt).into_owned(),
            kind: T::kind(&dt).into_owned(),
            name: resource.meta().name.clone()?,
            section_name: None,
        })
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section_name = Some(section.into());
        self
    }

    /// Returns the target ref kind, qualified by its group, if necessary.
    pub fn canonical_kind(&self) -> String {
        if self.group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}.{}", self.kind, self.group)
        }
    }

    /// Checks whether the target references the given resource type
    pub fn targets_kind<T>(&self) -> bool
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        let dt = Default::default();
        self.group.eq_ignore_ascii_case(&T::group(&dt))
            && self.kind.eq_ignore_ascii_case(&T::kind(&dt))
    }

    /// Checks whether the target references the given namespaced resource,
    /// ignoring the section name.
    pub fn targets<T>(&self, resource: &T, local_ns: &str) -> bool
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        if !self.targets_kind::<T>() {
            return false;
        }

        match resource.meta().namespace.as_deref() {
            Some(rns) if rns == local_ns => {}
            _ => return false,
        };

        resource.meta().name.as_deref() == Some(self.name.as_str())
    }
}

use crate::PolicyKind;

/// Why a policy is not accepted or not enforced. These never abort a
/// reconciliation pass; they end up in the policy's status conditions.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("{dependency} is not installed, please restart the controller once the dependency has been installed")]
    DependencyNotInstalled {
        kind: PolicyKind,
        dependency: String,
    },

    #[error("{kind} target {target} was not found")]
    TargetNotFound { kind: PolicyKind, target: String },

    #[error("{kind} is conflicted by {existing}: conflicting policy")]
    Conflict { kind: PolicyKind, existing: String },

    #[error("{kind} target is invalid: {reason}")]
    Invalid { kind: PolicyKind, reason: String },

    #[error("{kind} is not in the path to any existing routes")]
    NoRoutes { kind: PolicyKind },

    #[error("{kind} is overridden by [{}]", .by.join(" "))]
    Overridden { kind: PolicyKind, by: Vec<String> },

    #[error("{kind} is not enforced: {resource} is missing")]
    SystemResourceMissing { kind: PolicyKind, resource: String },

    #[error("{kind} waiting for the following components to sync: [{}]", .components.join(" "))]
    OutOfSync {
        kind: PolicyKind,
        components: Vec<String>,
    },

    #[error("{kind} has invalid CEL expressions: {}", .issues.join("; "))]
    CelValidation { kind: PolicyKind, issues: Vec<String> },

    #[error("{kind} has encountered some issues: {message}")]
    Unknown { kind: PolicyKind, message: String },
}

impl PolicyError {
    /// The condition reason reported for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DependencyNotInstalled { .. } | Self::SystemResourceMissing { .. } => {
                "MissingDependency"
            }
            Self::TargetNotFound { .. } => "TargetNotFound",
            Self::Conflict { .. } => "Conflicted",
            Self::Invalid { .. } | Self::CelValidation { .. } => "Invalid",
            Self::Overridden { .. } => "Overridden",
            Self::NoRoutes { .. } | Self::OutOfSync { .. } | Self::Unknown { .. } => "Unknown",
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::DependencyNotInstalled { kind, .. }
            | Self::TargetNotFound { kind, .. }
            | Self::Conflict { kind, .. }
            | Self::Invalid { kind, .. }
            | Self::NoRoutes { kind }
            | Self::Overridden { kind, .. }
            | Self::SystemResourceMissing { kind, .. }
            | Self::OutOfSync { kind, .. }
            | Self::CelValidation { kind, .. }
            | Self::Unknown { kind, .. } => *kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_and_reasons() {
        let err = PolicyError::TargetNotFound {
            kind: PolicyKind::Auth,
            target: "toystore".to_string(),
        };
        assert_eq!(err.to_string(), "AuthPolicy target toystore was not found");
        assert_eq!(err.reason(), "TargetNotFound");

        let err = PolicyError::Overridden {
            kind: PolicyKind::RateLimit,
            by: vec!["gw-ns/gw-rlp".to_string(), "ns/other".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "RateLimitPolicy is overridden by [gw-ns/gw-rlp ns/other]"
        );
        assert_eq!(err.reason(), "Overridden");
        assert_eq!(err.kind(), PolicyKind::RateLimit);
    }
}

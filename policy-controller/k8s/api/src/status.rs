use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The loose condition shape used by the third-party operators whose
/// resources the controller reads back (Authorino, Limitador, cert-manager,
/// the DNS operator and the Kuadrant CR itself).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub const READY: &str = "Ready";

/// Whether a `Ready` condition with status `True` is present.
pub fn is_ready(conditions: &[StatusCondition]) -> bool {
    conditions
        .iter()
        .any(|c| c.type_ == READY && c.status == "True")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_requires_true_status() {
        let ready = StatusCondition {
            type_: READY.to_string(),
            status: "True".to_string(),
            ..Default::default()
        };
        let not_ready = StatusCondition {
            status: "False".to_string(),
            ..ready.clone()
        };
        assert!(is_ready(&[ready]));
        assert!(!is_ready(&[not_ready]));
        assert!(!is_ready(&[]));
    }
}

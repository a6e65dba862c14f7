use chrono::{DateTime, Utc};
use kuadrant_policy_controller_core::{PolicyError, PolicyKind};
use kuadrant_policy_controller_k8s_api::{Condition, Time};

pub const ACCEPTED: &str = "Accepted";
pub const ENFORCED: &str = "Enforced";

const TRUE: &str = "True";
const FALSE: &str = "False";

/// How much of an accepted policy made it to the data plane.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Enforcement {
    Full,
    /// Some of the policy's rules were overridden by the named policies.
    Partial { overridden_by: Vec<String> },
}

pub fn accepted(kind: PolicyKind, error: Option<&PolicyError>, generation: Option<i64>) -> Condition {
    match error {
        None => condition(ACCEPTED, TRUE, ACCEPTED, format!("{kind} has been accepted"), generation),
        Some(error) => condition(ACCEPTED, FALSE, error.reason(), error.to_string(), generation),
    }
}

pub fn enforced(
    kind: PolicyKind,
    enforcement: &Result<Enforcement, PolicyError>,
    generation: Option<i64>,
) -> Condition {
    match enforcement {
        Ok(Enforcement::Full) => condition(
            ENFORCED,
            TRUE,
            ENFORCED,
            format!("{kind} has been successfully enforced"),
            generation,
        ),
        Ok(Enforcement::Partial { overridden_by }) => condition(
            ENFORCED,
            TRUE,
            ENFORCED,
            format!(
                "{kind} has been partially enforced. Overridden by [{}]",
                overridden_by.join(" ")
            ),
            generation,
        ),
        Err(error) => condition(ENFORCED, FALSE, error.reason(), error.to_string(), generation),
    }
}

fn condition(
    type_: &str,
    status: &str,
    reason: &str,
    message: String,
    generation: Option<i64>,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message,
        observed_generation: generation,
        // Filled in by `set`.
        last_transition_time: Time(DateTime::<Utc>::MIN_UTC),
    }
}

/// Replaces the condition of the same type. The previous transition time is
/// kept unless the status flips.
pub fn set(conditions: &mut Vec<Condition>, mut condition: Condition, now: DateTime<Utc>) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            condition.last_transition_time = if existing.status == condition.status {
                existing.last_transition_time.clone()
            } else {
                Time(now)
            };
            *existing = condition;
        }
        None => {
            condition.last_transition_time = Time(now);
            conditions.push(condition);
        }
    }
}

pub fn remove(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.type_ != type_);
}

use super::*;
use crate::conditions::{ACCEPTED, ENFORCED};
use kuadrant_policy_controller_core::PolicyKind;
use kuadrant_policy_controller_k8s_api::{
    policy::{PolicyStatus, RateLimitPolicy},
    Patch,
};
use pretty_assertions::assert_eq;

fn status_of(patch: &Patch<Value>) -> PolicyStatus {
    match patch {
        Patch::Merge(value) => from_json(value["status"].clone()),
        patch => panic!("unexpected patch: {patch:?}"),
    }
}

fn toystore_rlp(target: Value) -> RateLimitPolicy {
    mk_policy(
        "RateLimitPolicy",
        "app-ns",
        "toystore-rl",
        "2024-01-01T00:00:00Z",
        target,
        json!({ "limits": limits(&["global"]) }),
    )
}

#[test]
fn new_policy_is_accepted_and_enforced() {
    let mut test = TestConfig::with_route();
    test.insert(toystore_rlp(route_target()));

    let statuses = test.statuses(at(100));
    assert_eq!(statuses.updates.len(), 1);
    let update = &statuses.updates[0];
    assert_eq!(update.kind, PolicyKind::RateLimit);
    assert_eq!(update.id, ResourceId::new("app-ns", "toystore-rl"));

    let status = status_of(&update.patch);
    assert_eq!(status.observed_generation, Some(1));
    let accepted = status.condition(ACCEPTED).expect("Accepted must be set");
    assert_eq!(accepted.status, "True");
    assert_eq!(accepted.message, "RateLimitPolicy has been accepted");
    let enforced = status.condition(ENFORCED).expect("Enforced must be set");
    assert_eq!(enforced.status, "True");
    assert_eq!(enforced.reason, "Enforced");
    assert_eq!(enforced.observed_generation, Some(1));

    let summary = statuses.summaries[&PolicyKind::RateLimit];
    assert_eq!(summary, crate::Summary { total: 1, enforced: 1, not_enforced: 0 });
}

#[test]
fn unchanged_status_is_not_patched() {
    let mut test = TestConfig::with_route();
    test.insert(toystore_rlp(route_target()));

    let first = test.statuses(at(100));
    let mut policy = toystore_rlp(route_target());
    policy.status = Some(status_of(&first.updates[0].patch));
    test.insert(policy);

    let second = test.statuses(at(200));
    assert!(second.updates.is_empty(), "{:?}", second.updates);
    assert_eq!(second.summaries[&PolicyKind::RateLimit].enforced, 1);
}

#[test]
fn rejected_policy_drops_enforced() {
    let mut test = TestConfig::with_route();
    test.insert(toystore_rlp(route_target()));
    let first = test.statuses(at(100));
    let previous = status_of(&first.updates[0].patch);

    let mut policy = toystore_rlp(json!({
        "group": "gateway.networking.k8s.io",
        "kind": "HTTPRoute",
        "name": "missing",
    }));
    policy.status = Some(previous.clone());
    test.insert(policy);

    let statuses = test.statuses(at(200));
    assert_eq!(statuses.updates.len(), 1);
    let status = status_of(&statuses.updates[0].patch);
    assert_eq!(status.conditions.len(), 1);
    let accepted = &status.conditions[0];
    assert_eq!(accepted.type_, ACCEPTED);
    assert_eq!(accepted.status, "False");
    assert_eq!(accepted.reason, "TargetNotFound");
    assert_eq!(accepted.last_transition_time.0, at(200));

    let summary = statuses.summaries[&PolicyKind::RateLimit];
    assert_eq!(summary, crate::Summary { total: 1, enforced: 0, not_enforced: 0 });
}

#[test]
fn deleting_policies_are_skipped() {
    let mut test = TestConfig::with_route();
    let mut policy = toystore_rlp(route_target());
    policy.metadata.deletion_timestamp = Some(kuadrant_policy_controller_k8s_api::Time(at(50)));
    test.insert(policy);

    let statuses = test.statuses(at(100));
    assert!(statuses.updates.is_empty());
    assert_eq!(statuses.summaries[&PolicyKind::RateLimit].total, 0);
}

#[test]
fn patch_names_the_policy() {
    let mut test = TestConfig::with_route();
    test.insert(toystore_rlp(route_target()));

    let statuses = test.statuses(at(100));
    let Patch::Merge(value) = &statuses.updates[0].patch else {
        panic!("expected a merge patch");
    };
    assert_eq!(value["apiVersion"], "kuadrant.io/v1");
    assert_eq!(value["kind"], "RateLimitPolicy");
    assert_eq!(value["name"], "toystore-rl");
}

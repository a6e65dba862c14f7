use super::*;
use crate::{
    cluster::ClusterEndpoint,
    istio::envoy_filter,
    reconcile::{reconcile, tag_for_deletion},
};
use kuadrant_policy_controller_k8s_api::{istio::EnvoyFilter, labels, ResourceExt};
use kuadrant_policy_controller_k8s_index::{Artifact, Modified};
use pretty_assertions::assert_eq;

const AUTH_PREFIX: &str = "kuadrant-auth-";

fn filter(gw: &str) -> EnvoyFilter {
    envoy_filter(
        AUTH_PREFIX,
        &ResourceId::new("gw-ns", gw),
        Some(&ClusterEndpoint::auth(KUADRANT_NS)),
        false,
    )
}

#[tokio::test(flavor = "current_thread")]
async fn unchanged_resources_are_left_alone() {
    let client = FakeClient::default();
    let existing = filter("gw");
    let mut modified = Modified::default();

    let reconciled = reconcile(
        &client,
        [&existing],
        vec![filter("gw")],
        Some(Artifact::IstioAuthCluster),
        &mut modified,
    )
    .await;

    assert_eq!(client.calls(), vec![]);
    assert_eq!(reconciled, Default::default());
    assert_eq!(modified, Modified::default());
}

#[tokio::test(flavor = "current_thread")]
async fn creating_marks_the_gateway_modified() {
    let client = FakeClient::default();
    let mut modified = Modified::default();

    reconcile(
        &client,
        std::iter::empty::<&EnvoyFilter>(),
        vec![filter("gw")],
        Some(Artifact::IstioAuthCluster),
        &mut modified,
    )
    .await;

    assert_eq!(
        client.calls(),
        vec![Call::create("EnvoyFilter", "gw-ns", "kuadrant-auth-gw")]
    );
    assert!(modified.is_modified(Artifact::IstioAuthCluster, &ResourceId::new("gw-ns", "gw")));
    assert!(!modified.is_modified(Artifact::IstioRateLimitCluster, &ResourceId::new("gw-ns", "gw")));
}

#[tokio::test(flavor = "current_thread")]
async fn resources_tagged_for_deletion_are_deleted_once() {
    let client = FakeClient::default();
    let existing = filter("gw");
    let mut tagged = filter("gw");
    tag_for_deletion(&mut tagged.metadata);
    let mut modified = Modified::default();

    let reconciled = reconcile(&client, [&existing], vec![tagged.clone()], None, &mut modified).await;
    assert_eq!(
        client.calls(),
        vec![Call::delete("EnvoyFilter", "gw-ns", "kuadrant-auth-gw")]
    );
    assert!(reconciled.deleted.contains(&ResourceId::new("gw-ns", "kuadrant-auth-gw")));

    // Nothing to delete when the resource doesn't exist.
    let client = FakeClient::default();
    reconcile(&client, std::iter::empty(), vec![tagged], None, &mut modified).await;
    assert_eq!(client.calls(), vec![]);
}

#[tokio::test(flavor = "current_thread")]
async fn managed_orphans_are_deleted() {
    let client = FakeClient::default();
    let orphan = filter("gone");
    let mut foreign = filter("foreign");
    foreign.labels_mut().remove(labels::MANAGED_BY_LABEL);
    let mut modified = Modified::default();

    reconcile(
        &client,
        [&orphan, &foreign],
        Vec::new(),
        Some(Artifact::IstioAuthCluster),
        &mut modified,
    )
    .await;

    assert_eq!(
        client.calls(),
        vec![Call::delete("EnvoyFilter", "gw-ns", "kuadrant-auth-gone")]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn updates_keep_foreign_metadata() {
    let client = FakeClient::default();
    let mut existing = envoy_filter(
        AUTH_PREFIX,
        &ResourceId::new("gw-ns", "gw"),
        Some(&ClusterEndpoint::auth("old-ns")),
        false,
    );
    existing
        .labels_mut()
        .insert("team".to_string(), "edge".to_string());
    let mut modified = Modified::default();

    let reconciled = reconcile(&client, [&existing], vec![filter("gw")], None, &mut modified).await;

    assert_eq!(
        client.calls(),
        vec![Call::update("EnvoyFilter", "gw-ns", "kuadrant-auth-gw")]
    );
    assert_eq!(reconciled.updated.len(), 1);
    let updated = client
        .object::<EnvoyFilter>("gw-ns", "kuadrant-auth-gw")
        .expect("filter must be written");
    assert_eq!(updated.spec, filter("gw").spec);
    assert_eq!(updated.labels().get("team").map(String::as_str), Some("edge"));
    // Updates don't flip the gateway's enforcement.
    assert_eq!(modified, Modified::default());
}

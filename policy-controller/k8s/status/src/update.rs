use crate::{
    conditions::{self, ACCEPTED, ENFORCED},
    enforced::{enforcement, Context},
};
use chrono::{DateTime, Utc};
use kuadrant_policy_controller_core::{PolicyKind, ResourceId};
use kuadrant_policy_controller_k8s_api::{
    self as k8s,
    policy::{
        AuthPolicy, DNSPolicy, PolicyStatus, RateLimitPolicy, TLSPolicy, TokenRateLimitPolicy,
    },
    NamespaceResourceScope,
};
use kuadrant_policy_controller_k8s_index::KuadrantPolicy;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

/// A policy kind whose status conditions the controller owns.
pub trait StatusPolicy:
    KuadrantPolicy
    + k8s::Resource<Scope = NamespaceResourceScope>
    + Clone
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    fn status(&self) -> Option<&PolicyStatus>;
}

macro_rules! status_policy {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl StatusPolicy for $ty {
                fn status(&self) -> Option<&PolicyStatus> {
                    self.status.as_ref()
                }
            }
        )+
    };
}

status_policy!(AuthPolicy, RateLimitPolicy, TokenRateLimitPolicy, TLSPolicy, DNSPolicy);

#[derive(Debug, PartialEq)]
pub struct Update {
    pub kind: PolicyKind,
    pub id: ResourceId,
    pub patch: k8s::Patch<serde_json::Value>,
}

/// Policy counts of one kind, as of the last pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: i64,
    pub enforced: i64,
    pub not_enforced: i64,
}

/// The outcome of the status stage of a pass.
#[derive(Debug, Default)]
pub struct Statuses {
    pub updates: Vec<Update>,
    pub summaries: BTreeMap<PolicyKind, Summary>,
}

// === impl Statuses ===

impl Statuses {
    /// Derives the status of every policy. Only policies whose status would
    /// change get an update.
    pub fn compute(ctx: &Context<'_>, now: DateTime<Utc>) -> Self {
        let mut statuses = Self::default();
        statuses.compute_kind::<AuthPolicy>(ctx, now);
        statuses.compute_kind::<RateLimitPolicy>(ctx, now);
        statuses.compute_kind::<TokenRateLimitPolicy>(ctx, now);
        statuses.compute_kind::<TLSPolicy>(ctx, now);
        statuses.compute_kind::<DNSPolicy>(ctx, now);
        statuses
    }

    fn compute_kind<P: StatusPolicy>(&mut self, ctx: &Context<'_>, now: DateTime<Utc>) {
        let summary = self.summaries.entry(P::KIND).or_default();
        let Some(validations) = P::state(ctx.state).validations.as_ref() else {
            tracing::debug!(kind = %P::KIND, "Policies were not validated");
            return;
        };

        for policy in P::policies(ctx.topology.resources()).values() {
            if policy.is_deleting() {
                continue;
            }
            let locator = policy.locator();
            let accepted = match validations.error(&locator) {
                Some(error) => Err(error),
                None if validations.is_accepted(&locator) => Ok(()),
                None => continue,
            };

            let generation = policy.meta().generation;
            let mut status = policy.status().cloned().unwrap_or_default();
            status.observed_generation = generation;
            conditions::set(
                &mut status.conditions,
                conditions::accepted(P::KIND, accepted.err(), generation),
                now,
            );

            summary.total += 1;
            if accepted.is_ok() {
                let enforcement = enforcement(ctx, policy.as_ref());
                if enforcement.is_ok() {
                    summary.enforced += 1;
                } else {
                    summary.not_enforced += 1;
                }
                conditions::set(
                    &mut status.conditions,
                    conditions::enforced(P::KIND, &enforcement, generation),
                    now,
                );
            } else {
                conditions::remove(&mut status.conditions, ENFORCED);
            }

            if policy.status() == Some(&status) {
                continue;
            }
            let id = policy.id();
            tracing::debug!(
                kind = %P::KIND,
                namespace = %id.namespace,
                name = %id.name,
                accepted = ?status.condition(ACCEPTED).map(|c| &c.status),
                enforced = ?status.condition(ENFORCED).map(|c| &c.status),
                "Status changed",
            );
            let patch = make_patch::<P>(&id.name, &status);
            self.updates.push(Update {
                kind: P::KIND,
                id,
                patch,
            });
        }
    }
}

pub(crate) fn make_patch<P: StatusPolicy>(
    name: &str,
    status: &PolicyStatus,
) -> k8s::Patch<serde_json::Value> {
    let value = serde_json::json!({
        "apiVersion": P::api_version(&()),
        "kind": P::kind(&()),
        "name": name,
        "status": status,
    });
    k8s::Patch::Merge(value)
}

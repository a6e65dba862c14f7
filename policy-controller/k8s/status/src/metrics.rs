use crate::update::Summary;
use kuadrant_policy_controller_core::PolicyKind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{family::Family, gauge::Gauge},
    registry::Registry,
};
use std::collections::BTreeMap;

/// Policy counts by kind, refreshed at the end of every pass.
#[derive(Clone, Debug)]
pub struct PolicyMetrics {
    total: Family<KindLabels, Gauge>,
    enforced: Family<EnforcedLabels, Gauge>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EnforcedLabels {
    kind: String,
    status: String,
}

impl PolicyMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let total = Family::default();
        prom.register(
            "policies_total",
            "Gauge of the number of policies by kind",
            total.clone(),
        );

        let enforced = Family::default();
        prom.register(
            "policies_enforced",
            "Gauge of the number of accepted policies by kind and Enforced status",
            enforced.clone(),
        );

        Self { total, enforced }
    }

    pub fn record(&self, summaries: &BTreeMap<PolicyKind, Summary>) {
        for kind in PolicyKind::ALL {
            let summary = summaries.get(&kind).copied().unwrap_or_default();
            let kind = kind.as_str().to_string();
            self.total
                .get_or_create(&KindLabels { kind: kind.clone() })
                .set(summary.total);
            for (status, count) in [("true", summary.enforced), ("false", summary.not_enforced)] {
                self.enforced
                    .get_or_create(&EnforcedLabels {
                        kind: kind.clone(),
                        status: status.to_string(),
                    })
                    .set(count);
            }
        }
    }
}

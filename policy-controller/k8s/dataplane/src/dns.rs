//! DNSRecords publishing the addresses of the gateways targeted by a
//! DNSPolicy, one record per listener hostname.

use crate::{
    client::ResourceClient,
    reconcile::{meta, reconcile as reconcile_children, tag_for_deletion},
    ReconcileError,
};
use ipnet::IpNet;
use kuadrant_policy_controller_core::config::DnsDefaults;
use kuadrant_policy_controller_k8s_api::{
    dns::{DNSRecord, DNSRecordSpec, Endpoint, ProviderRef},
    labels,
    policy::DNSPolicySpec,
    ResourceExt,
};
use kuadrant_policy_controller_k8s_index::{
    policy, topology::gateway_addresses, ListenerPath, State, Topology,
};
use std::net::IpAddr;

const A: &str = "A";
const CNAME: &str = "CNAME";

/// A DNSRecord per listener with a hostname and an effective DNSPolicy.
pub fn dns_records(topology: &Topology, state: &State, defaults: &DnsDefaults) -> Vec<DNSRecord> {
    let Some(effective) = state.dns.effective.as_ref() else {
        return Vec::new();
    };

    topology
        .listener_paths()
        .iter()
        .filter_map(|path| {
            let spec = effective
                .get(&path.id())
                .and_then(|e| policy::whole_spec(&e.rules))?;
            dns_record(path, spec, defaults)
        })
        .collect()
}

fn dns_record(path: &ListenerPath, spec: &DNSPolicySpec, defaults: &DnsDefaults) -> Option<DNSRecord> {
    let hostname = path.listener.hostname.clone()?;
    let gw = path.gateway_id();
    let name = record_name(path);

    let ttl = if spec.load_balancing.is_some() {
        defaults.lb_ttl
    } else {
        defaults.ttl
    };
    let endpoints = endpoints(
        &hostname,
        &published_addresses(path, &spec.exclude_addresses),
        ttl.as_secs() as i64,
    );

    let mut record = DNSRecord {
        metadata: meta(
            &gw.namespace,
            &name,
            labels::gateway_labels(&gw.namespace, &gw.name),
        ),
        spec: DNSRecordSpec {
            root_host: hostname,
            endpoints,
            provider_ref: spec.provider_refs.first().map(|p| ProviderRef {
                name: p.name.clone(),
            }),
            health_check: spec.health_check.clone(),
        },
        status: None,
    };
    if record.spec.endpoints.is_empty() {
        tag_for_deletion(&mut record.metadata);
    }
    Some(record)
}

/// DNSRecords are named after the gateway and the listener.
pub fn record_name(path: &ListenerPath) -> String {
    format!("{}-{}", path.gateway.name_any(), path.listener.name)
}

/// The gateway's addresses, minus those `exclude` names or contains.
fn published_addresses(path: &ListenerPath, exclude: &[String]) -> Vec<String> {
    let excluded = |addr: &str| {
        exclude.iter().any(|ex| {
            if ex == addr {
                return true;
            }
            match (ex.parse::<IpNet>(), addr.parse::<IpAddr>()) {
                (Ok(net), Ok(ip)) => net.contains(&ip),
                _ => false,
            }
        })
    };
    gateway_addresses(&path.gateway)
        .into_iter()
        .map(|a| a.value)
        .filter(|a| !excluded(a))
        .collect()
}

/// IP addresses are published as one A record; otherwise the first hostname
/// is published as a CNAME.
fn endpoints(hostname: &str, addresses: &[String], ttl: i64) -> Vec<Endpoint> {
    let (ips, hosts): (Vec<_>, Vec<_>) = addresses
        .iter()
        .cloned()
        .partition(|a| a.parse::<IpAddr>().is_ok());

    if !ips.is_empty() {
        return vec![Endpoint {
            dns_name: hostname.to_string(),
            targets: ips,
            record_type: A.to_string(),
            record_ttl: ttl,
            set_identifier: None,
        }];
    }
    hosts
        .into_iter()
        .take(1)
        .map(|host| Endpoint {
            dns_name: hostname.to_string(),
            targets: vec![host],
            record_type: CNAME.to_string(),
            record_ttl: ttl,
            set_identifier: None,
        })
        .collect()
}

pub async fn reconcile<C: ResourceClient<DNSRecord> + ?Sized>(
    client: &C,
    topology: &Topology,
    state: &mut State,
    defaults: &DnsDefaults,
) -> Result<(), ReconcileError> {
    if !topology.dependencies().dns_operator {
        return Ok(());
    }
    let desired = dns_records(topology, state, defaults);
    let existing = topology.resources().dns_records.values().map(AsRef::as_ref);
    reconcile_children(client, existing, desired, None, &mut state.modified).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn publishes_ips_before_hostnames() {
        let eps = endpoints(
            "api.example.com",
            &["lb.example.net".to_string(), "10.0.0.1".to_string()],
            60,
        );
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].record_type, A);
        assert_eq!(eps[0].targets, vec!["10.0.0.1".to_string()]);

        let eps = endpoints(
            "api.example.com",
            &["lb.example.net".to_string(), "lb2.example.net".to_string()],
            60,
        );
        assert_eq!(eps.len(), 1);
        assert_eq!(eps[0].record_type, CNAME);
        assert_eq!(eps[0].targets, vec!["lb.example.net".to_string()]);
    }

    #[test]
    fn no_addresses_no_endpoints() {
        assert!(endpoints("api.example.com", &[], 60).is_empty());
    }
}

//! Naming and indexing of the limits configured in Limitador.

use crate::ResourceId;
use kuadrant_policy_controller_k8s_api::{limitador::RateLimit, policy::Rate};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

const IDENTIFIER_PREFIX: &str = "limit.";

/// Derives the descriptor key a limit is matched on. Characters outside
/// `[A-Za-z0-9_]` are replaced; a hash of the unsanitized
/// `namespace/name/limit` keeps distinct limits distinct.
pub fn limit_name_to_limitador_identifier(policy: &ResourceId, limit_name: &str) -> String {
    let mut identifier = String::from(IDENTIFIER_PREFIX);
    identifier.extend(limit_name.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' {
            c
        } else {
            '_'
        }
    }));

    let digest = Sha256::digest(format!("{policy}/{limit_name}").as_bytes());
    identifier.push_str("__");
    identifier.push_str(&hex::encode(&digest[..4]));
    identifier
}

/// Limits of a route share a Limitador namespace named after the route.
pub fn limits_namespace(route_namespace: &str, route_name: &str) -> String {
    format!("{route_namespace}/{route_name}")
}

/// The condition matching the descriptor the wasm shim sends for a limit.
pub fn limit_condition(identifier: &str) -> String {
    format!("descriptors[0][\"{identifier}\"] == \"1\"")
}

/// The variable counting hits per value of a counter expression. The wasm
/// shim sends the expression's value as a descriptor entry keyed by the
/// expression itself.
pub fn counter_variable(expression: &str) -> String {
    format!("descriptors[0][\"{expression}\"]")
}

/// Builds the Limitador limits for one policy limit, counting per value of
/// each of `counters`.
pub fn rate_limits(
    identifier: &str,
    namespace: &str,
    rates: &[Rate],
    counters: &[String],
) -> Vec<RateLimit> {
    let variables = counters
        .iter()
        .map(|c| counter_variable(c))
        .collect::<Vec<_>>();
    rates
        .iter()
        .map(|rate| {
            let (max_value, seconds) = rate.to_seconds();
            RateLimit {
                conditions: vec![limit_condition(identifier)],
                max_value,
                namespace: namespace.to_string(),
                seconds,
                variables: variables.clone(),
                name: Some(identifier.to_string()),
            }
        })
        .collect()
}

/// Every limit derived from the effective policies, keyed by
/// `(limits namespace, identifier)` so that a limit shared by several paths
/// is only configured once.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateLimitIndex {
    limits: BTreeMap<(String, String), Vec<RateLimit>>,
}

impl RateLimitIndex {
    pub fn set(&mut self, namespace: String, identifier: String, limits: Vec<RateLimit>) {
        self.limits.insert((namespace, identifier), limits);
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn to_rate_limits(&self) -> Vec<RateLimit> {
        self.limits.values().flatten().cloned().collect()
    }
}

/// Compares limit lists as sets.
pub fn limits_equal(a: &[RateLimit], b: &[RateLimit]) -> bool {
    let a = a.iter().collect::<HashSet<_>>();
    let b = b.iter().collect::<HashSet<_>>();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_hex_suffix(s: &str) -> bool {
        s.len() == 8 && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    #[test]
    fn identifiers_are_prefixed_sanitized_and_suffixed() {
        let key = ResourceId::new("toystore", "toystore-rlp");
        let id = limit_name_to_limitador_identifier(&key, "alice-limit.v2");

        assert!(id.starts_with("limit.alice_limit_v2__"), "{id}");
        let (_, suffix) = id.rsplit_once("__").unwrap();
        assert!(is_hex_suffix(suffix), "{suffix}");

        // Stable across calls.
        assert_eq!(id, limit_name_to_limitador_identifier(&key, "alice-limit.v2"));
    }

    #[test]
    fn identifiers_differ_by_policy() {
        let a = limit_name_to_limitador_identifier(&ResourceId::new("ns", "a"), "limit");
        let b = limit_name_to_limitador_identifier(&ResourceId::new("ns", "b"), "limit");
        assert_ne!(a, b);

        // Sanitization collisions are disambiguated by the hash.
        let key = ResourceId::new("ns", "a");
        assert_ne!(
            limit_name_to_limitador_identifier(&key, "a-b"),
            limit_name_to_limitador_identifier(&key, "a.b")
        );
    }

    #[test]
    fn rate_limits_reference_the_identifier() {
        let rates = vec![
            Rate {
                limit: 5,
                window: "10s".parse().unwrap(),
            },
            Rate {
                limit: 100,
                window: "1h".parse().unwrap(),
            },
        ];
        let limits = rate_limits(
            "limit.toys__abcd0123",
            &limits_namespace("toystore", "toystore"),
            &rates,
            &["auth.identity.username".to_string()],
        );
        assert_eq!(limits.len(), 2);
        assert_eq!(
            limits[0].conditions,
            vec![r#"descriptors[0]["limit.toys__abcd0123"] == "1""#.to_string()]
        );
        assert_eq!(
            limits[0].variables,
            vec![r#"descriptors[0]["auth.identity.username"]"#.to_string()]
        );
        assert_eq!(limits[0].namespace, "toystore/toystore");
        assert_eq!((limits[1].max_value, limits[1].seconds), (100, 3600));
    }

    #[test]
    fn limits_compare_as_sets() {
        let a = RateLimit {
            max_value: 1,
            seconds: 1,
            namespace: "a".to_string(),
            ..Default::default()
        };
        let b = RateLimit {
            namespace: "b".to_string(),
            ..a.clone()
        };
        assert!(limits_equal(&[a.clone(), b.clone()], &[b.clone(), a.clone()]));
        assert!(!limits_equal(&[a.clone()], &[a, b]));
    }
}

//! Checks the CEL expressions of wasm actions against the attributes and
//! functions the wasm shim exposes.

use crate::{wasm::Action, PathId, PolicyKind};
use cel_interpreter::Program;
use std::collections::{BTreeMap, BTreeSet};

/// Attributes every request exposes.
const WELL_KNOWN_ROOTS: &[&str] = &[
    "request",
    "source",
    "destination",
    "connection",
    "metadata",
    "filter_state",
];

/// Populated by Authorino, so only available once an AuthPolicy applies.
const AUTH_ROOT: &str = "auth";

const STANDARD_FUNCTIONS: &[&str] = &[
    "has", "size", "matches", "startsWith", "endsWith", "contains", "int", "uint", "double",
    "string", "bytes", "bool", "duration", "timestamp", "type", "dyn", "max", "min",
    "getDate", "getDayOfMonth", "getDayOfWeek", "getDayOfYear", "getFullYear", "getHours",
    "getMilliseconds", "getMinutes", "getMonth", "getSeconds",
    // strings extension
    "charAt", "indexOf", "lastIndexOf", "lowerAscii", "upperAscii", "replace", "split",
    "substring", "trim", "join", "format", "quote",
    // kuadrant
    "queryMap",
];

/// Comprehension macros bind their own identifiers.
const MACROS: &[&str] = &["all", "exists", "exists_one", "map", "filter"];

const TOKEN_FUNCTIONS: &[&str] = &["requestBodyJSON", "responseBodyJSON"];

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CelIssue {
    #[error("failed to parse {expression:?}: {message}")]
    Parse { expression: String, message: String },

    #[error("unknown attribute {name:?} in {expression:?}")]
    UnknownAttribute { expression: String, name: String },

    #[error("undeclared function {name:?} in {expression:?}")]
    UnknownFunction { expression: String, name: String },
}

/// The CEL environment of one path.
#[derive(Clone, Debug)]
pub struct CelEnv {
    roots: BTreeSet<&'static str>,
}

/// Validation failures, by the policy kind of the offending action and the
/// path it was built for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CelIssues(BTreeMap<(PolicyKind, PathId), Vec<CelIssue>>);

// === impl CelEnv ===

impl CelEnv {
    /// `auth` is only declared when an AuthPolicy is effective on the path.
    pub fn new(auth: bool) -> Self {
        let mut roots = WELL_KNOWN_ROOTS.iter().copied().collect::<BTreeSet<_>>();
        if auth {
            roots.insert(AUTH_ROOT);
        }
        Self { roots }
    }

    pub fn validate(&self, kind: Option<PolicyKind>, expression: &str) -> Result<(), CelIssue> {
        let program = Program::compile(expression).map_err(|e| CelIssue::Parse {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
        let references = program.references();

        let functions = references.functions();
        for name in &functions {
            let known = STANDARD_FUNCTIONS.contains(name)
                || MACROS.contains(name)
                || (kind == Some(PolicyKind::TokenRateLimit) && TOKEN_FUNCTIONS.contains(name));
            if !known {
                return Err(CelIssue::UnknownFunction {
                    expression: expression.to_string(),
                    name: name.to_string(),
                });
            }
        }

        // Variables bound by a comprehension are indistinguishable from
        // attributes here.
        if functions.iter().any(|f| MACROS.contains(f)) {
            return Ok(());
        }

        for name in references.variables() {
            if !self.roots.contains(name) {
                return Err(CelIssue::UnknownAttribute {
                    expression: expression.to_string(),
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Keeps the actions whose expressions all validate, recording an issue
    /// for each one that doesn't.
    pub fn filter_actions(
        &self,
        path: &PathId,
        actions: Vec<Action>,
        issues: &mut CelIssues,
    ) -> Vec<Action> {
        actions
            .into_iter()
            .filter(|action| {
                let failed = action
                    .expressions()
                    .filter_map(|expr| self.validate(action.kind, expr).err())
                    .collect::<Vec<_>>();
                if failed.is_empty() {
                    return true;
                }
                if let Some(kind) = action.kind {
                    issues.add(kind, path.clone(), failed);
                }
                false
            })
            .collect()
    }
}

// === impl CelIssues ===

impl CelIssues {
    pub fn add(&mut self, kind: PolicyKind, path: PathId, issues: Vec<CelIssue>) {
        self.0.entry((kind, path)).or_default().extend(issues);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, kind: PolicyKind, path: &PathId) -> &[CelIssue] {
        self.0
            .get(&(kind, path.clone()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn extend(&mut self, other: CelIssues) {
        for ((kind, path), issues) in other.0 {
            self.add(kind, path, issues);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wasm::{ConditionalData, DataItem, RATELIMIT_SERVICE_NAME};
    use rstest::rstest;

    #[rstest]
    #[case("request.method == 'GET'")]
    #[case("request.headers['x-tier'] == 'gold' && source.address != ''")]
    #[case("'q' in queryMap(request.query) ? queryMap(request.query)['q'] == 'a' : false")]
    #[case("request.url_path.lowerAscii().startsWith('/toys')")]
    #[case("[1, 2].all(x, x > 0)")]
    fn accepts_known_attributes(#[case] expr: &str) {
        CelEnv::new(false).validate(Some(PolicyKind::RateLimit), expr).unwrap();
    }

    #[test]
    fn auth_is_only_known_with_an_auth_policy() {
        let expr = "auth.identity.username == 'alice'";
        assert!(matches!(
            CelEnv::new(false).validate(Some(PolicyKind::RateLimit), expr),
            Err(CelIssue::UnknownAttribute { name, .. }) if name == "auth"
        ));
        CelEnv::new(true).validate(Some(PolicyKind::RateLimit), expr).unwrap();
    }

    #[test]
    fn body_functions_are_only_known_to_token_limits() {
        let expr = "responseBodyJSON('/usage/total_tokens')";
        assert!(matches!(
            CelEnv::new(false).validate(Some(PolicyKind::RateLimit), expr),
            Err(CelIssue::UnknownFunction { .. })
        ));
        CelEnv::new(false)
            .validate(Some(PolicyKind::TokenRateLimit), expr)
            .unwrap();
    }

    #[test]
    fn rejects_unparseable_expressions() {
        assert!(matches!(
            CelEnv::new(true).validate(None, "request.method =="),
            Err(CelIssue::Parse { .. })
        ));
    }

    #[test]
    fn invalid_actions_are_excluded_and_recorded() {
        let path = PathId::new(&[crate::Locator::from("gateway:ns/gw")]);
        let good = Action::new(PolicyKind::RateLimit, RATELIMIT_SERVICE_NAME, "ns/route");
        let bad = Action {
            conditional_data: vec![ConditionalData {
                predicates: vec![],
                data: vec![DataItem::expression("user", "auth.identity.sub")],
            }],
            ..Action::new(PolicyKind::RateLimit, RATELIMIT_SERVICE_NAME, "ns/route")
        };

        let mut issues = CelIssues::default();
        let kept = CelEnv::new(false).filter_actions(&path, vec![good.clone(), bad], &mut issues);
        assert_eq!(kept, vec![good]);
        assert_eq!(issues.get(PolicyKind::RateLimit, &path).len(), 1);
        assert!(issues.get(PolicyKind::Auth, &path).is_empty());
    }
}

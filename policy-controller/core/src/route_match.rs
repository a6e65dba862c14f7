//! HTTPRoute rule matches, translated into the CEL predicates and hostnames
//! the wasm shim evaluates per request.

use serde_json::Value;
use std::cmp::Reverse;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRouteMatch {
    pub path: Option<PathMatch>,
    pub headers: Vec<HeaderMatch>,
    pub query_params: Vec<QueryParamMatch>,
    pub method: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Regex(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderMatch {
    Exact(String, String),
    Regex(String, String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryParamMatch {
    Exact(String, String),
    Regex(String, String),
}

// === impl HttpRouteMatch ===

impl HttpRouteMatch {
    /// Reads a Gateway API `HTTPRouteMatch` in its JSON form. Unknown match
    /// types are skipped.
    pub fn from_json(value: &Value) -> Self {
        let path = value.get("path").and_then(|p| {
            let v = p.get("value").and_then(Value::as_str).unwrap_or("/").to_string();
            match p.get("type").and_then(Value::as_str).unwrap_or("PathPrefix") {
                "Exact" => Some(PathMatch::Exact(v)),
                "PathPrefix" => Some(PathMatch::Prefix(v)),
                "RegularExpression" => Some(PathMatch::Regex(v)),
                _ => None,
            }
        });

        let pairs = |field: &str| -> Vec<(String, String, bool)> {
            value
                .get(field)
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|m| {
                    let name = m.get("name")?.as_str()?.to_string();
                    let v = m.get("value")?.as_str()?.to_string();
                    let regex = match m.get("type").and_then(Value::as_str).unwrap_or("Exact") {
                        "Exact" => false,
                        "RegularExpression" => true,
                        _ => return None,
                    };
                    Some((name, v, regex))
                })
                .collect()
        };

        let headers = pairs("headers")
            .into_iter()
            .map(|(n, v, regex)| {
                let n = n.to_ascii_lowercase();
                if regex {
                    HeaderMatch::Regex(n, v)
                } else {
                    HeaderMatch::Exact(n, v)
                }
            })
            .collect();

        let query_params = pairs("queryParams")
            .into_iter()
            .map(|(n, v, regex)| {
                if regex {
                    QueryParamMatch::Regex(n, v)
                } else {
                    QueryParamMatch::Exact(n, v)
                }
            })
            .collect();

        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            path,
            headers,
            query_params,
            method,
        }
    }

    /// The CEL predicates that hold when a request matches.
    pub fn predicates(&self) -> Vec<String> {
        let mut predicates = Vec::new();

        match &self.path {
            Some(PathMatch::Exact(p)) => {
                predicates.push(format!("request.url_path == {}", quote(p)))
            }
            Some(PathMatch::Prefix(p)) => {
                predicates.push(format!("request.url_path.startsWith({})", quote(p)))
            }
            Some(PathMatch::Regex(p)) => {
                predicates.push(format!("request.url_path.matches({})", quote(p)))
            }
            None => {}
        }

        if let Some(method) = &self.method {
            predicates.push(format!("request.method == {}", quote(method)));
        }

        for header in &self.headers {
            predicates.push(match header {
                HeaderMatch::Exact(n, v) => {
                    format!("request.headers[{}] == {}", quote(n), quote(v))
                }
                HeaderMatch::Regex(n, v) => {
                    format!("request.headers[{}].matches({})", quote(n), quote(v))
                }
            });
        }

        for param in &self.query_params {
            let (n, check) = match param {
                QueryParamMatch::Exact(n, v) => (n, format!(" == {}", quote(v))),
                QueryParamMatch::Regex(n, v) => (n, format!(".matches({})", quote(v))),
            };
            predicates.push(format!(
                "{n} in queryMap(request.query) ? queryMap(request.query)[{n}]{check} : false",
                n = quote(n),
            ));
        }

        predicates
    }

    /// Gateway API precedence: exact paths, then longer prefixes, then
    /// methods, then the number of header and query matches.
    fn precedence(&self) -> (u8, usize, bool, usize, usize) {
        let (rank, len) = match &self.path {
            Some(PathMatch::Exact(p)) => (3, p.len()),
            Some(PathMatch::Regex(p)) => (2, p.len()),
            Some(PathMatch::Prefix(p)) => (1, p.len()),
            None => (0, 0),
        };
        (
            rank,
            len,
            self.method.is_some(),
            self.headers.len(),
            self.query_params.len(),
        )
    }
}

/// Orders matches from most to least specific. The sort is stable, so ties
/// keep their input order.
pub fn sort_by_precedence<T>(items: &mut [T], f: impl Fn(&T) -> (&str, &HttpRouteMatch)) {
    items.sort_by_key(|item| {
        let (hostname, m) = f(item);
        (Reverse(hostname_precedence(hostname)), Reverse(m.precedence()))
    });
}

fn hostname_precedence(hostname: &str) -> (bool, usize) {
    (!hostname.starts_with('*'), hostname.len())
}

/// The hostnames a route rule serves through a listener: the route's
/// hostnames that fall within the listener's, or the listener's own
/// hostname when the route's is broader.
pub fn hostnames(listener: Option<&str>, route: &[String]) -> Vec<String> {
    let listener = listener.filter(|h| !h.is_empty());
    if route.is_empty() {
        return vec![listener.unwrap_or("*").to_string()];
    }

    let Some(listener) = listener.filter(|h| *h != "*") else {
        return route.to_vec();
    };

    let mut hosts = Vec::new();
    for host in route {
        let host = if host_is_within(host, listener) {
            host.as_str()
        } else if host_is_within(listener, host) {
            listener
        } else {
            continue;
        };
        if !hosts.iter().any(|h: &String| h == host) {
            hosts.push(host.to_string());
        }
    }
    hosts
}

/// Whether every name matched by `host` is also matched by `within`.
fn host_is_within(host: &str, within: &str) -> bool {
    if host == within || within == "*" {
        return true;
    }
    match within.strip_prefix("*.") {
        Some(suffix) => host
            .strip_prefix("*.")
            .unwrap_or(host)
            .strip_suffix(suffix)
            .map(|prefix| prefix.ends_with('.') && prefix.len() > 1)
            .unwrap_or(false),
        None => false,
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

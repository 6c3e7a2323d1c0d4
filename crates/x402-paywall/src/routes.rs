//! Priced routes and their matching.
//!
//! A route pattern is `"[VERB ]path"`. Without a verb the route matches every method. In
//! the path, `*` matches any run of characters and `[param]` matches one segment.
//! Matching is case-insensitive and anchored; when several routes match, the one with the
//! longest compiled pattern wins.

use bon::Builder;
use http::Method;
use regex::{Regex, RegexBuilder};
use url::Url;
use x402_exact::{price::Price, types::AnyJson};

/// Network used by routes configured with a bare price.
pub const DEFAULT_NETWORK: &str = "base-sepolia";

/// Price and presentation of one protected route.
#[derive(Builder, Debug, Clone)]
pub struct RouteConfig {
    #[builder(into)]
    pub price: Price,
    #[builder(into, default = DEFAULT_NETWORK.to_string())]
    pub network: String,
    #[builder(default)]
    pub options: RouteOptions,
}

impl<P: Into<Price>> From<P> for RouteConfig {
    fn from(price: P) -> Self {
        RouteConfig::builder().price(price).build()
    }
}

#[derive(Builder, Debug, Clone, Default)]
pub struct RouteOptions {
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub mime_type: Option<String>,
    pub max_timeout_seconds: Option<u64>,
    /// Schema of the response body, advertised as `outputSchema.output`.
    pub output_schema: Option<AnyJson>,
    /// Resource URL to advertise instead of the request URL.
    pub resource: Option<Url>,
    /// Whether the route may be listed by discovery services. Defaults to `true`.
    pub discoverable: Option<bool>,
    /// HTML served to browsers instead of the built-in paywall page.
    #[builder(into)]
    pub custom_paywall_html: Option<String>,
}

impl RouteOptions {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or("application/json")
    }

    pub fn max_timeout_seconds(&self) -> u64 {
        self.max_timeout_seconds.unwrap_or(300)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Invalid route pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid route regex for {pattern}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Route {
    /// Upper-cased method, or `*`.
    pub verb: String,
    pub pattern: Regex,
    pub config: RouteConfig,
}

impl Route {
    pub fn compile(pattern: &str, config: RouteConfig) -> Result<Route, RouteError> {
        let mut parts = pattern.split_whitespace();
        let (verb, path) = match (parts.next(), parts.next(), parts.next()) {
            (Some(path), None, None) => ("*", path),
            (Some(verb), Some(path), None) => (verb, path),
            _ => return Err(RouteError::InvalidPattern(pattern.to_string())),
        };

        let source = format!("^{}$", path_regex(path));
        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|source| RouteError::Regex {
                pattern: pattern.to_string(),
                source,
            })?;

        Ok(Route {
            verb: verb.to_uppercase(),
            pattern: regex,
            config,
        })
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        (self.verb == "*" || self.verb == method.as_str().to_uppercase())
            && self.pattern.is_match(path)
    }
}

fn path_regex(path: &str) -> String {
    let mut out = String::new();
    let mut rest = path;
    while let Some(c) = rest.chars().next() {
        if c == '*' {
            out.push_str(".*?");
            rest = &rest[1..];
        } else if let Some(end) = rest.strip_prefix('[').and_then(|r| r.find(']')) {
            if end > 0 {
                out.push_str("[^/]+");
                rest = &rest[end + 2..];
            } else {
                out.push_str(&regex::escape("[]"));
                rest = &rest[2..];
            }
        } else {
            let len = rest.find(['*', '[']).filter(|i| *i > 0).unwrap_or(rest.len());
            out.push_str(&regex::escape(&rest[..len]));
            rest = &rest[len..];
        }
    }
    out
}

/// The set of priced routes of a paywall.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        mut self,
        pattern: &str,
        config: impl Into<RouteConfig>,
    ) -> Result<Self, RouteError> {
        self.routes.push(Route::compile(pattern, config.into())?);
        Ok(self)
    }

    /// The matching route with the longest pattern, first registered on ties.
    pub fn find(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|route| route.matches(method, path))
            .fold(None, |best: Option<&Route>, route| match best {
                Some(b) if route.pattern.as_str().len() <= b.pattern.as_str().len() => Some(b),
                _ => Some(route),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use x402_exact::price::Price;

    use super::*;

    fn table() -> RouteTable {
        RouteTable::new()
            .route("/weather", "$0.001")
            .unwrap()
            .route("GET /premium/*", "$0.01")
            .unwrap()
            .route("/premium/reports/[id]", "$1")
            .unwrap()
            .route("post /upload", "$0.10")
            .unwrap()
    }

    fn price_of(route: Option<&Route>) -> Option<Price> {
        route.map(|r| r.config.price.clone())
    }

    #[test]
    fn test_exact_and_case_insensitive() {
        let table = table();
        assert_eq!(price_of(table.find(&Method::GET, "/weather")), Some("$0.001".into()));
        assert_eq!(price_of(table.find(&Method::DELETE, "/WEATHER")), Some("$0.001".into()));
        assert!(table.find(&Method::GET, "/weather/today").is_none());
        assert!(table.find(&Method::GET, "/").is_none());
    }

    #[test]
    fn test_verbs() {
        let table = table();
        assert!(table.find(&Method::POST, "/upload").is_some());
        assert!(table.find(&Method::GET, "/upload").is_none());
        assert!(table.find(&Method::POST, "/premium/a").is_none());
    }

    #[test]
    fn test_wildcard_and_params() {
        let table = table();
        assert_eq!(price_of(table.find(&Method::GET, "/premium/a/b")), Some("$0.01".into()));
        // Both match; the longer pattern is more specific.
        assert_eq!(
            price_of(table.find(&Method::GET, "/premium/reports/42")),
            Some("$1".into())
        );
        assert_eq!(
            price_of(table.find(&Method::GET, "/premium/reports/42/raw")),
            Some("$0.01".into())
        );
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let table = RouteTable::new().route("/v1.0/data", "$0.01").unwrap();
        assert!(table.find(&Method::GET, "/v1.0/data").is_some());
        assert!(table.find(&Method::GET, "/v1x0/data").is_none());
    }

    #[test]
    fn test_route_defaults() {
        let route = Route::compile("/weather", "$0.001".into()).unwrap();
        assert_eq!(route.verb, "*");
        assert_eq!(route.config.network, "base-sepolia");
        let options = &route.config.options;
        assert_eq!(options.description(), "");
        assert_eq!(options.mime_type(), "application/json");
        assert_eq!(options.max_timeout_seconds(), 300);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Route::compile("GET /a /b", "$1".into()),
            Err(RouteError::InvalidPattern(_))
        ));
        assert!(matches!(
            Route::compile("   ", "$1".into()),
            Err(RouteError::InvalidPattern(_))
        ));
    }
}

//! Ordered route table.
//!
//! Routes are compiled once from configuration and never mutated. Matching
//! runs against the raw request URL, before any key normalization, and the
//! first route in declaration order that matches wins.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Caching strategy applied to a matched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    NetworkOnly,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkOnly => "network-only",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-route overrides of partition options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteOptions {
    /// Network leg timeout for network-first, in seconds.
    #[serde(default)]
    pub network_timeout_seconds: Option<f64>,

    /// Entry cap applied after writes through this route.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// A route as declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    /// HTTP method, or `*` for any.
    #[serde(default = "default_method")]
    pub method: String,

    /// Regular expression tested against the raw request URL.
    pub url_pattern: String,

    /// Cache partition name.
    #[serde(default)]
    pub cache: Option<String>,

    pub strategy: Strategy,

    #[serde(default)]
    pub options: RouteOptions,
}

fn default_method() -> String {
    "GET".into()
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    index: usize,
    method: Option<String>,
    pattern: Regex,
    cache: Option<String>,
    strategy: Strategy,
    options: RouteOptions,
}

impl Route {
    /// Compile a declared route. `index` is its position in declaration order.
    pub fn compile(index: usize, config: &RouteConfig) -> Result<Self, Error> {
        let pattern = Regex::new(&config.url_pattern)
            .map_err(|e| Error::InvalidRoute(format!("route {index} ({}): {e}", config.url_pattern)))?;

        let method = match config.method.trim() {
            "" => return Err(Error::InvalidRoute(format!("route {index}: empty method"))),
            "*" => None,
            m => Some(m.to_ascii_uppercase()),
        };

        Ok(Self {
            index,
            method,
            pattern,
            cache: config.cache.clone(),
            strategy: config.strategy,
            options: config.options,
        })
    }

    pub fn matches(&self, method: &str, url: &str) -> bool {
        let method_ok = match &self.method {
            Some(m) => m.eq_ignore_ascii_case(method),
            None => true,
        };
        method_ok && self.pattern.is_match(url)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn cache(&self) -> Option<&str> {
        self.cache.as_deref()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn options(&self) -> RouteOptions {
        self.options
    }
}

/// The outcome of resolving a request against the route table.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    /// Declaration index of the matched route; `None` for the fallback.
    pub route: Option<usize>,
    pub strategy: Strategy,
    pub cache: Option<String>,
    pub options: RouteOptions,
}

impl RouteDecision {
    /// Pass-through decision used when no route matches.
    pub fn fallback() -> Self {
        Self { route: None, strategy: Strategy::NetworkOnly, cache: None, options: RouteOptions::default() }
    }
}

/// Ordered, immutable route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new(configs: &[RouteConfig]) -> Result<Self, Error> {
        let routes = configs
            .iter()
            .enumerate()
            .map(|(i, c)| Route::compile(i, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// First route in declaration order matching `method` and the raw `url`.
    pub fn match_route(&self, method: &str, url: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(method, url))
    }

    /// Resolve to a decision, falling back to network-only pass-through.
    pub fn resolve(&self, method: &str, url: &str) -> RouteDecision {
        match self.match_route(method, url) {
            Some(route) => RouteDecision {
                route: Some(route.index),
                strategy: route.strategy,
                cache: route.cache.clone(),
                options: route.options,
            },
            None => RouteDecision::fallback(),
        }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

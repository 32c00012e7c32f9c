//! Cache key normalization.
//!
//! Strips cache-busting query parameters so that `/data.json?_dc=1712` and
//! `/data.json?_dc=1713` address the same entry. A [`CacheKey`] can only be
//! built by [`KeyNormalizer::normalize`], so every read and write against the
//! store goes through the same normalization.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A query parameter treated as non-semantic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatileParam {
    /// Exact parameter name, e.g. `_dc`.
    pub name: String,

    /// When set, only values matching this regex are stripped.
    #[serde(default)]
    pub value_pattern: Option<String>,
}

impl VolatileParam {
    pub fn new(name: impl Into<String>, value_pattern: Option<&str>) -> Self {
        Self { name: name.into(), value_pattern: value_pattern.map(String::from) }
    }
}

/// Default volatile parameters: the numeric `_dc` cache buster and the `_v`
/// version token.
pub fn default_volatile_params() -> Vec<VolatileParam> {
    vec![VolatileParam::new("_dc", Some(r"^\d+$")), VolatileParam::new("_v", None)]
}

/// A normalized cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
struct Rule {
    name: String,
    value: Option<Regex>,
}

/// Removes volatile query parameters from request URLs.
#[derive(Debug, Clone)]
pub struct KeyNormalizer {
    rules: Vec<Rule>,
}

impl Default for KeyNormalizer {
    fn default() -> Self {
        // The default patterns are literals known to compile.
        Self::new(&default_volatile_params()).unwrap_or(Self { rules: Vec::new() })
    }
}

impl KeyNormalizer {
    pub fn new(params: &[VolatileParam]) -> Result<Self, Error> {
        let rules = params
            .iter()
            .map(|p| {
                if p.name.is_empty() {
                    return Err(Error::InvalidInput("volatile parameter name must not be empty".into()));
                }
                let value = p
                    .value_pattern
                    .as_deref()
                    .map(Regex::new)
                    .transpose()
                    .map_err(|e| Error::InvalidInput(format!("volatile parameter {}: {e}", p.name)))?;
                Ok(Rule { name: p.name.clone(), value })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// Whether a `name=value` pair is non-semantic.
    pub fn is_volatile(&self, name: &str, value: &str) -> bool {
        self.rules.iter().any(|rule| {
            rule.name == name
                && match &rule.value {
                    Some(re) => re.is_match(value),
                    None => true,
                }
        })
    }

    /// Produce the cache key for `url`.
    ///
    /// Drops the fragment, every volatile pair, and any empty pair left
    /// behind, then drops the `?` if nothing remains. Remaining pairs keep
    /// their original order and encoding.
    pub fn normalize(&self, url: &str) -> CacheKey {
        let url = url.split_once('#').map_or(url, |(u, _)| u);

        let Some((base, query)) = url.split_once('?') else {
            return CacheKey(url.to_string());
        };

        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|&pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                !self.is_volatile(name, value)
            })
            .collect();

        if kept.is_empty() { CacheKey(base.to_string()) } else { CacheKey(format!("{base}?{}", kept.join("&"))) }
    }
}

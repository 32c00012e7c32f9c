//! Configuration validation rules.
//!
//! Runs after loading, so a bad route pattern or partition option is reported
//! at startup rather than on the first request that hits it.

use crate::cache::KeyNormalizer;
use crate::config::{AppConfig, MAX_NETWORK_TIMEOUT_SECS, PRECACHE_PARTITION};
use crate::routes::{Route, Strategy};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: String, seconds: Option<f64>) -> Result<(), ConfigError> {
    match seconds {
        Some(s) if !s.is_finite() || s <= 0.0 => Err(invalid(field, "must be a positive number of seconds")),
        Some(s) if s > MAX_NETWORK_TIMEOUT_SECS => Err(invalid(field, "must not exceed 5 minutes (300s)")),
        _ => Ok(()),
    }
}

fn check_max_entries(field: String, max: Option<usize>) -> Result<(), ConfigError> {
    match max {
        Some(0) => Err(invalid(field, "must be greater than 0")),
        _ => Ok(()),
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - the version tag is malformed
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 100MB
    /// - `precache_concurrency` is 0 or exceeds 32
    /// - a volatile parameter, partition or route is malformed
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.version()?;

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 100MB"));
        }

        if self.precache_concurrency == 0 || self.precache_concurrency > 32 {
            return Err(invalid("precache_concurrency", "must be between 1 and 32"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        KeyNormalizer::new(&self.volatile_params).map_err(|e| invalid("volatile_params", e.to_string()))?;

        for (name, partition) in &self.partitions {
            if name.is_empty() {
                return Err(invalid("partitions", "partition name must not be empty"));
            }
            check_max_entries(format!("partitions.{name}.max_entries"), partition.max_entries)?;
            check_timeout(format!("partitions.{name}.network_timeout_seconds"), partition.network_timeout_seconds)?;
        }

        for (i, route) in self.routes.iter().enumerate() {
            Route::compile(i, route).map_err(|e| invalid(format!("routes[{i}]"), e.to_string()))?;

            check_max_entries(format!("routes[{i}].options.max_entries"), route.options.max_entries)?;
            check_timeout(format!("routes[{i}].options.network_timeout_seconds"), route.options.network_timeout_seconds)?;

            match (route.strategy, route.cache.as_deref()) {
                (_, Some(PRECACHE_PARTITION)) => {
                    return Err(invalid(format!("routes[{i}].cache"), "the precache partition is reserved"));
                }
                (_, Some("")) => {
                    return Err(invalid(format!("routes[{i}].cache"), "must not be empty"));
                }
                (Strategy::CacheFirst, None) => {
                    return Err(invalid(format!("routes[{i}].cache"), "cache-first requires a partition"));
                }
                (Strategy::NetworkFirst, None) => {
                    tracing::warn!(route = i, pattern = %route.url_pattern, "network-first route without a partition behaves as network-only");
                }
                (Strategy::NetworkOnly, Some(cache)) => {
                    tracing::warn!(route = i, cache, "network-only route ignores its partition");
                }
                _ => {}
            }
        }

        if self.precache.strategy == Strategy::NetworkOnly && !self.precache.manifest.is_empty() {
            return Err(invalid("precache.strategy", "precached assets cannot be served network-only"));
        }

        if !self.precache.manifest.is_empty() && self.base_url.is_none() {
            tracing::warn!("precache manifest set without base_url; manifest paths must be absolute URLs");
        }

        Ok(())
    }
}

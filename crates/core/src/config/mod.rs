//! Application configuration with layered loading.
//!
//! Configuration is loaded once at startup with figment and then shared
//! immutably:
//!
//! 1. Environment variables (SWCACHE_*)
//! 2. TOML config file (if SWCACHE_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Routes, partitions and the precache manifest are lists and maps, so in
//! practice they come from the TOML file; scalar settings are convenient to
//! override from the environment.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::{CacheVersion, VolatileParam, default_volatile_params};
use crate::routes::{RouteConfig, Strategy};

mod validation;

pub use validation::ConfigError;

/// Name of the partition that holds precached assets.
pub const PRECACHE_PARTITION: &str = "precache";

/// Upper bound for partition and route network timeouts.
pub const MAX_NETWORK_TIMEOUT_SECS: f64 = 300.0;

/// Convert a configured timeout in seconds.
///
/// # Errors
///
/// Returns `InvalidInput` for negative, NaN or unrepresentable values.
pub fn network_timeout_from_secs(seconds: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| Error::InvalidInput(format!("network timeout {seconds}s: {e}")))
}

/// Options of one cache partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    /// Evict oldest entries beyond this count after each write.
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Network leg timeout for network-first requests into this partition.
    #[serde(default)]
    pub network_timeout_seconds: Option<f64>,
}

impl PartitionConfig {
    pub fn network_timeout(&self) -> Result<Option<Duration>, Error> {
        self.network_timeout_seconds
            .map(network_timeout_from_secs)
            .transpose()
    }
}

/// Static asset manifest fetched on install.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecacheConfig {
    /// Prefix removed from each manifest path before it is resolved.
    #[serde(default)]
    pub strip_prefix: String,

    /// Asset paths, in order.
    #[serde(default)]
    pub manifest: Vec<String>,

    /// Strategy used to serve precached URLs.
    #[serde(default = "default_precache_strategy")]
    pub strategy: Strategy,
}

fn default_precache_strategy() -> Strategy {
    Strategy::NetworkFirst
}

impl Default for PrecacheConfig {
    fn default() -> Self {
        Self { strip_prefix: String::new(), manifest: Vec::new(), strategy: default_precache_strategy() }
    }
}

impl PrecacheConfig {
    /// Manifest paths with the strip prefix removed.
    pub fn stripped_paths(&self) -> impl Iterator<Item = &str> {
        self.manifest
            .iter()
            .map(|p| p.strip_prefix(self.strip_prefix.as_str()).unwrap_or(p))
    }
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SWCACHE_*)
/// 2. TOML config file (if SWCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache name; first half of the version tag.
    ///
    /// Set via SWCACHE_CACHE_NAME environment variable.
    #[serde(default = "default_cache_name")]
    pub cache_name: String,

    /// Deploy version; second half of the version tag. Bump on every deploy.
    ///
    /// Set via SWCACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Path to SQLite cache database.
    ///
    /// Set via SWCACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin that relative request URLs and manifest paths resolve against.
    ///
    /// Set via SWCACHE_BASE_URL environment variable.
    #[serde(default)]
    pub base_url: Option<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Overall HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Maximum concurrent manifest fetches during install.
    #[serde(default = "default_precache_concurrency")]
    pub precache_concurrency: usize,

    /// Activate a newly installed version without waiting for clients to close.
    #[serde(default)]
    pub skip_waiting: bool,

    /// Take control of already-open clients on activation.
    #[serde(default)]
    pub clients_claim: bool,

    /// Query parameters stripped before key computation.
    #[serde(default = "default_volatile_params")]
    pub volatile_params: Vec<VolatileParam>,

    /// Partition name → options.
    #[serde(default)]
    pub partitions: BTreeMap<String, PartitionConfig>,

    /// Ordered route table; first match wins.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    #[serde(default)]
    pub precache: PrecacheConfig,
}

fn default_cache_name() -> String {
    "swcache".into()
}

fn default_cache_version() -> String {
    "1".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./swcache.sqlite")
}

fn default_user_agent() -> String {
    "swcache/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_precache_concurrency() -> usize {
    4
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            cache_version: default_cache_version(),
            db_path: default_db_path(),
            base_url: None,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            precache_concurrency: default_precache_concurrency(),
            skip_waiting: false,
            clients_claim: false,
            volatile_params: default_volatile_params(),
            partitions: BTreeMap::new(),
            routes: Vec::new(),
            precache: PrecacheConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// The version tag every partition key is namespaced under.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the name or version is empty or
    /// contains `:`.
    pub fn version(&self) -> Result<CacheVersion, ConfigError> {
        CacheVersion::new(&self.cache_name, &self.cache_version)
            .map_err(|e| ConfigError::Invalid { field: "cache_version".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SWCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("SWCACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

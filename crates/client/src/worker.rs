//! The service worker facade.
//!
//! Ties the route table, the strategy engine, the precache loader and the
//! lifecycle together. Configuration is read once at construction and never
//! changes afterwards.
//!
//! ### Request flow
//! 1. Resolve the request URL against `base_url`
//! 2. Uncontrolled clients go straight to the network
//! 3. Precached URLs take the implicit precache route, everything else the
//!    first matching declared route (or network-only)
//! 4. Open the partition under the active version, applying route overrides
//! 5. Run the strategy

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use url::Url;

use swcache_core::cache::{EntryMeta, PartitionInfo};
use swcache_core::{
    AppConfig, CacheDb, CacheKey, CacheStore, Error, KeyNormalizer, PRECACHE_PARTITION, Partition, Request,
    RouteDecision, RouteOptions, Router, Strategy,
};

use crate::fetch::{Fetcher, parse_base, resolve};
use crate::lifecycle::{Lifecycle, LifecycleStatus};
use crate::precache::{PrecacheLoader, PrecacheReport};
use crate::strategy::{Served, StrategyEngine};

/// Result of an on-demand purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
pub struct PurgeReport {
    /// Partitions deleted outright.
    pub deleted_partitions: Vec<String>,
    /// Entries evicted by trimming.
    pub evicted_entries: u64,
}

/// Request-interception cache engine.
pub struct ServiceWorker {
    config: Arc<AppConfig>,
    base: Option<Url>,
    router: Router,
    store: CacheStore,
    precache_keys: HashSet<CacheKey>,
    engine: StrategyEngine,
    loader: PrecacheLoader,
    lifecycle: Lifecycle,
}

impl ServiceWorker {
    /// Build the worker for the configured version and restore the persisted
    /// lifecycle.
    ///
    /// # Errors
    ///
    /// Fails on an invalid version tag, route pattern, volatile parameter,
    /// base URL or manifest entry, or if the lifecycle state can't be read.
    pub async fn new(config: Arc<AppConfig>, db: CacheDb, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let version = config.version()?;
        let normalizer = KeyNormalizer::new(&config.volatile_params)?;
        let router = Router::new(&config.routes)?;
        let base = config
            .base_url
            .as_deref()
            .map(parse_base)
            .transpose()
            .map_err(|e| Error::InvalidUrl(format!("base_url: {e}")))?;

        let store = CacheStore::new(db, version, Arc::new(normalizer), Arc::new(config.partitions.clone()));
        let loader = PrecacheLoader::new(fetcher.clone(), base.clone(), config.precache_concurrency);
        let precache_keys = loader
            .manifest_urls(&config.precache)?
            .iter()
            .map(|url| store.key_for(url.as_str()))
            .collect();
        let lifecycle = Lifecycle::restore(&store, config.skip_waiting, config.clients_claim).await?;

        tracing::info!(
            version = %store.version(),
            routes = router.len(),
            precache = config.precache.manifest.len(),
            "service worker ready"
        );

        Ok(Self { config, base, router, store, precache_keys, engine: StrategyEngine::new(fetcher), loader, lifecycle })
    }

    /// Install the configured version unless it is already active or waiting.
    pub async fn start(&self) -> Result<Option<PrecacheReport>, Error> {
        self.install().await
    }

    pub async fn install(&self) -> Result<Option<PrecacheReport>, Error> {
        self.lifecycle
            .install(self.store.clone(), &self.loader, &self.config.precache)
            .await
    }

    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        self.lifecycle.activate().await
    }

    pub async fn release_clients(&self) -> Result<Option<Vec<String>>, Error> {
        self.lifecycle.release_clients().await
    }

    pub async fn status(&self) -> LifecycleStatus {
        self.lifecycle.status().await
    }

    /// Route and strategy for an already resolved request.
    pub fn decide(&self, request: &Request) -> RouteDecision {
        if request.method.eq_ignore_ascii_case("GET") && self.precache_keys.contains(&self.store.key_for(&request.url)) {
            return RouteDecision {
                route: None,
                strategy: self.config.precache.strategy,
                cache: Some(PRECACHE_PARTITION.to_string()),
                options: RouteOptions::default(),
            };
        }
        self.router.resolve(&request.method, &request.url)
    }

    /// Handle one intercepted request.
    ///
    /// # Errors
    ///
    /// - `InvalidUrl` if the URL can't be resolved
    /// - storage errors opening the partition
    /// - whatever the strategy surfaces (`NoCachedResponse`, network errors
    ///   under network-only)
    pub async fn handle_fetch(&self, request: Request) -> Result<Served, Error> {
        let url = resolve(self.base.as_ref(), &request.url).map_err(|e| Error::InvalidUrl(format!("{}: {e}", request.url)))?;
        let request = Request { url: url.to_string(), ..request };

        let Some(store) = self.lifecycle.controlling_store(request.navigate).await else {
            tracing::debug!(url = %request.url, "client not controlled, passing through");
            return self.engine.network_only(&request).await;
        };

        let decision = self.decide(&request);
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            route = ?decision.route,
            strategy = %decision.strategy,
            cache = ?decision.cache,
            "routed request"
        );

        match decision.cache.as_deref() {
            Some(name) if decision.strategy != Strategy::NetworkOnly => {
                let partition = store.open(name).await?.with_overrides(&decision.options)?;
                let served = self
                    .engine
                    .handle(decision.strategy, &request, Some((&store, &partition)))
                    .await;
                self.retire_if_superseded(&store, &partition).await;
                served
            }
            _ => self.engine.handle(decision.strategy, &request, None).await,
        }
    }

    /// Drop `partition` if its version was activated away while the request
    /// ran. Activation cleans up under the lifecycle lock, so a partition
    /// reopened after that cleanup is caught here.
    async fn retire_if_superseded(&self, store: &CacheStore, partition: &Partition) {
        if self.lifecycle.is_active(store.version()).await {
            return;
        }
        match store.db().delete_partition(partition.key()).await {
            Ok(true) => tracing::debug!(partition = %partition.key(), "removed partition of superseded version"),
            Ok(false) => {}
            Err(e) => tracing::warn!(partition = %partition.key(), error = %e, "failed to remove superseded partition"),
        }
    }

    /// Handle `request` on its own task.
    ///
    /// The task runs to completion even if the handle is dropped, so a
    /// requester going away never interrupts a cache write.
    pub fn spawn_fetch(self: &Arc<Self>, request: Request) -> JoinHandle<Result<Served, Error>> {
        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.handle_fetch(request).await })
    }

    /// The store inspection and purges act on: the active version, or the
    /// configured one before anything is active.
    async fn serving_store(&self) -> CacheStore {
        self.lifecycle
            .active_store()
            .await
            .unwrap_or_else(|| self.store.clone())
    }

    pub async fn partitions(&self) -> Result<Vec<PartitionInfo>, Error> {
        self.store.db().list_partitions().await
    }

    /// Metadata of the entry `url` maps to in partition `name`.
    pub async fn lookup(&self, name: &str, url: &str) -> Result<EntryMeta, Error> {
        let url = resolve(self.base.as_ref(), url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let store = self.serving_store().await;
        let partition_key = store.version().partition_key(name);
        let key = store.key_for(url.as_str());

        store
            .db()
            .get_entry_meta(&partition_key, &key)
            .await?
            .ok_or_else(|| Error::CacheMiss(format!("{key} in {partition_key}")))
    }

    /// Delete partition `name` of the serving version.
    pub async fn purge_partition(&self, name: &str) -> Result<PurgeReport, Error> {
        let store = self.serving_store().await;
        let partition_key = store.version().partition_key(name);
        let deleted = store.db().delete_partition(&partition_key).await?;
        tracing::info!(partition = %partition_key, deleted, "purged partition");

        Ok(PurgeReport { deleted_partitions: if deleted { vec![partition_key] } else { Vec::new() }, evicted_entries: 0 })
    }

    /// Trim partition `name` of the serving version to `max_entries`.
    pub async fn trim_partition(&self, name: &str, max_entries: usize) -> Result<PurgeReport, Error> {
        let store = self.serving_store().await;
        let partition_key = store.version().partition_key(name);
        let evicted = store.db().evict_overflow(&partition_key, max_entries).await?;
        tracing::info!(partition = %partition_key, evicted, max_entries, "trimmed partition");

        Ok(PurgeReport { deleted_partitions: Vec::new(), evicted_entries: evicted })
    }

    /// Delete every partition belonging to neither the active nor the pending
    /// version.
    pub async fn purge_stale(&self) -> Result<PurgeReport, Error> {
        let status = self.lifecycle.status().await;
        let keep: Vec<String> = status.active.into_iter().chain(status.pending).collect();
        if keep.is_empty() {
            return Ok(PurgeReport::default());
        }

        let mut deleted_partitions = Vec::new();
        for info in self.store.db().list_partitions().await? {
            if !keep.contains(&info.tag) && self.store.db().delete_partition(&info.partition_key).await? {
                deleted_partitions.push(info.partition_key);
            }
        }
        if !deleted_partitions.is_empty() {
            tracing::info!(deleted = ?deleted_partitions, "purged stale partitions");
        }

        Ok(PurgeReport { deleted_partitions, evicted_entries: 0 })
    }
}

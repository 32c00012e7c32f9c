//! Caching strategies.
//!
//! Each strategy takes a request and, except for network-only, a partition
//! of a [`CacheStore`]. Keys are always computed with the store's normalizer,
//! both when looking up and when writing.
//!
//! Writes are best-effort: a failed write is logged and the live response is
//! still returned. Opening the partition happens before a strategy runs and
//! a failure there is returned to the caller.

mod cache_first;
mod network_first;
mod network_only;

use std::sync::Arc;
use std::time::Duration;

use swcache_core::{CacheKey, CacheStore, Error, Partition, Request, Response, ResponseSource, Strategy};

use crate::fetch::Fetcher;

/// A response handed back to the requester, with how it was produced.
#[derive(Debug)]
pub struct Served {
    pub response: Response,
    pub source: ResponseSource,
    pub strategy: Strategy,
    /// Storage key of the partition consulted, if any.
    pub partition: Option<String>,
    /// Normalized key, if the request touched a partition.
    pub cache_key: Option<String>,
}

impl Served {
    fn network(response: Response, strategy: Strategy) -> Self {
        Self { response, source: ResponseSource::Network, strategy, partition: None, cache_key: None }
    }

    fn cached(response: Response, strategy: Strategy) -> Self {
        Self { response, source: ResponseSource::Cache, strategy, partition: None, cache_key: None }
    }

    fn in_partition(mut self, partition: &Partition, key: &CacheKey) -> Self {
        self.partition = Some(partition.key().to_string());
        self.cache_key = Some(key.to_string());
        self
    }
}

/// Runs strategies against a shared network fetcher.
#[derive(Clone)]
pub struct StrategyEngine {
    fetcher: Arc<dyn Fetcher>,
}

impl StrategyEngine {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Dispatch to `strategy`. Without a target partition every strategy
    /// degrades to network-only.
    pub async fn handle(
        &self, strategy: Strategy, request: &Request, target: Option<(&CacheStore, &Partition)>,
    ) -> Result<Served, Error> {
        match (strategy, target) {
            (Strategy::NetworkOnly, _) | (_, None) => self.network_only(request).await,
            (Strategy::NetworkFirst, Some((store, partition))) => self.network_first(request, store, partition).await,
            (Strategy::CacheFirst, Some((store, partition))) => self.cache_first(request, store, partition).await,
        }
    }

    /// Fetch, bounded by `timeout` when one is set.
    async fn fetch_with_timeout(&self, request: &Request, timeout: Option<Duration>) -> Result<Response, Error> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetcher.fetch(request))
                .await
                .map_err(|_| Error::FetchTimeout(format!("{} after {}ms", request.url, limit.as_millis())))?,
            None => self.fetcher.fetch(request).await,
        }
    }

    /// Persist a copy of `response` when it is cacheable and return the live copy.
    ///
    /// The response is split with [`Response::tee`]; the storage copy moves
    /// into the store and the caller gets the other one.
    async fn persist(
        &self, request: &Request, store: &CacheStore, partition: &Partition, key: &CacheKey, response: Response,
    ) -> Response {
        if !request.method.eq_ignore_ascii_case("GET") {
            tracing::debug!(method = %request.method, url = %request.url, "not caching non-GET request");
            return response;
        }
        if !response.is_cacheable() {
            tracing::debug!(status = response.status(), url = %request.url, "response not cacheable");
            return response;
        }

        let (live, stored) = response.tee();
        if let Err(e) = store.put(partition, key, stored).await {
            tracing::warn!(partition = %partition.key(), key = %key, error = %e, "dropping cache write");
        }
        live
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use swcache_core::{CacheDb, CacheStore, CacheVersion, KeyNormalizer, PartitionConfig};

    pub async fn store_with(partitions: BTreeMap<String, PartitionConfig>) -> CacheStore {
        let db = CacheDb::open_in_memory().await.unwrap();
        CacheStore::new(
            db,
            CacheVersion::new("app", "1").unwrap(),
            Arc::new(KeyNormalizer::default()),
            Arc::new(partitions),
        )
    }

    pub async fn store() -> CacheStore {
        store_with(BTreeMap::new()).await
    }

    /// A file-backed store, so rows can be tampered with from a second
    /// connection. Returns the directory holding the database.
    pub async fn file_store(name: &str) -> (CacheStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("swcache-{name}-{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        let db = CacheDb::open(dir.join("cache.sqlite")).await.unwrap();
        let store = CacheStore::new(
            db,
            CacheVersion::new("app", "1").unwrap(),
            Arc::new(KeyNormalizer::default()),
            Arc::new(BTreeMap::new()),
        );
        (store, dir)
    }

    /// Overwrite every stored body so it no longer matches its digest.
    pub async fn corrupt_bodies(dir: &Path) {
        let conn = tokio_rusqlite::Connection::open(dir.join("cache.sqlite")).await.unwrap();
        conn.call(|conn| conn.execute("UPDATE cache_entries SET body = X'00'", []))
            .await
            .unwrap();
    }
}

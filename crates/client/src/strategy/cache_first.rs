use swcache_core::{CacheStore, Error, Partition, Request, Strategy};

use super::{Served, StrategyEngine};

impl StrategyEngine {
    /// Serve from the partition when an entry exists, with no network call.
    /// On a miss, behave as network-first: fetch, store and return.
    pub async fn cache_first(
        &self, request: &Request, store: &CacheStore, partition: &Partition,
    ) -> Result<Served, Error> {
        let key = store.key_for(&request.url);

        if let Some(cached) = store.get(partition, &key).await? {
            tracing::debug!(partition = %partition.key(), key = %key, "cache hit");
            return Ok(Served::cached(cached, Strategy::CacheFirst).in_partition(partition, &key));
        }

        tracing::debug!(partition = %partition.key(), key = %key, "cache miss");
        let mut served = self.network_first(request, store, partition).await?;
        served.strategy = Strategy::CacheFirst;
        Ok(served)
    }
}

//! Network-first: prefer fresh responses, fall back to the cache offline.

use swcache_core::{CacheStore, Error, Partition, Request, Strategy};

use super::{Served, StrategyEngine};

impl StrategyEngine {
    /// Fetch with the partition's network timeout; store and return the
    /// response. When the network fails or times out, serve the entry stored
    /// under the normalized key, or fail with `NoCachedResponse`.
    pub async fn network_first(
        &self, request: &Request, store: &CacheStore, partition: &Partition,
    ) -> Result<Served, Error> {
        let key = store.key_for(&request.url);

        match self.fetch_with_timeout(request, partition.network_timeout()).await {
            Ok(response) => {
                let live = self.persist(request, store, partition, &key, response).await;
                Ok(Served::network(live, Strategy::NetworkFirst).in_partition(partition, &key))
            }
            Err(e) if e.is_network_failure() => {
                tracing::warn!(url = %request.url, error = %e, "network failed, falling back to cache");
                match store.get(partition, &key).await? {
                    Some(cached) => {
                        tracing::debug!(partition = %partition.key(), key = %key, "served fallback from cache");
                        Ok(Served::cached(cached, Strategy::NetworkFirst).in_partition(partition, &key))
                    }
                    None => Err(Error::NoCachedResponse(request.url.clone())),
                }
            }
            Err(e) => Err(e),
        }
    }
}

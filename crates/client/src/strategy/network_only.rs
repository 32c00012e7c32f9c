use swcache_core::{Error, Request, Strategy};

use super::{Served, StrategyEngine};

impl StrategyEngine {
    /// Pass the request straight to the network. Nothing is read or written.
    pub async fn network_only(&self, request: &Request) -> Result<Served, Error> {
        let response = self.fetcher.fetch(request).await?;
        Ok(Served::network(response, Strategy::NetworkOnly))
    }
}

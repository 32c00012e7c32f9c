//! cache_list tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::ServiceWorker;
use swcache_core::cache::PartitionInfo;

use crate::tools::json_result;

/// Output from the cache_list tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheListOutput {
    /// Every partition of every version, ordered by key.
    pub partitions: Vec<PartitionInfo>,
}

pub async fn list_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let partitions = worker.partitions().await?;
    json_result(&CacheListOutput { partitions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{offline_worker, output};

    #[tokio::test]
    async fn test_list_after_install() {
        let (worker, _db) = offline_worker().await;
        let out = output(&list_impl(&worker).await.unwrap());
        let partitions = out["partitions"].as_array().unwrap();
        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0]["partition_key"], "myapp:1:precache");
        assert_eq!(partitions[0]["entry_count"], 0);
    }
}

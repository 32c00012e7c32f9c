//! cache_purge tool implementation.
//!
//! Deletes a partition, trims it to N entries, or drops stale versions.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::{PurgeReport, ServiceWorker};
use swcache_core::Error;

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Partition of the serving version to act on.
    pub partition: Option<String>,

    /// Keep only the newest N entries of `partition` instead of deleting it.
    pub max_entries: Option<usize>,

    /// Delete partitions of every version that is neither active nor pending.
    #[serde(default)]
    pub stale: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Partition keys deleted.
    pub deleted_partitions: Vec<String>,
    /// Number of entries evicted.
    pub evicted_entries: u64,
}

impl From<PurgeReport> for CachePurgeOutput {
    fn from(report: PurgeReport) -> Self {
        Self { deleted_partitions: report.deleted_partitions, evicted_entries: report.evicted_entries }
    }
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(worker: &ServiceWorker, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.partition.is_none() && !params.stale {
        return Err(Error::InvalidInput("At least one of partition or stale must be specified".to_string()).into());
    }
    if params.max_entries.is_some() && params.partition.is_none() {
        return Err(Error::InvalidInput("max_entries requires partition".to_string()).into());
    }

    let mut output = CachePurgeOutput { deleted_partitions: Vec::new(), evicted_entries: 0 };

    if params.stale {
        let report = worker.purge_stale().await?;
        output.deleted_partitions.extend(report.deleted_partitions);
    }

    if let Some(partition) = params.partition {
        let report = match params.max_entries {
            Some(max_entries) => worker.trim_partition(&partition, max_entries).await?,
            None => worker.purge_partition(&partition).await?,
        };
        output.deleted_partitions.extend(report.deleted_partitions);
        output.evicted_entries += report.evicted_entries;
    }

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tools::test_support::{offline_worker, output};
    use swcache_core::{CacheStore, CacheVersion, KeyNormalizer, Response};

    async fn populate(db: swcache_core::CacheDb, version: &str, count: usize) {
        let store = CacheStore::new(
            db,
            CacheVersion::new("myapp", version).unwrap(),
            Arc::new(KeyNormalizer::default()),
            Arc::new(Default::default()),
        );
        let partition = store.open("api").await.unwrap();
        for i in 0..count {
            let url = format!("http://127.0.0.1:9/api/{i}");
            store
                .put(&partition, &store.key_for(&url), Response::new(&url, 200, vec![], "x"))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_purge_trims_partition() {
        let (worker, db) = offline_worker().await;
        populate(db, "1", 3).await;

        let params = CachePurgeParams { partition: Some("api".into()), max_entries: Some(1), stale: false };
        let out = output(&purge_impl(&worker, params).await.unwrap());
        assert_eq!(out["evicted_entries"], 2);
    }

    #[tokio::test]
    async fn test_purge_deletes_partition() {
        let (worker, db) = offline_worker().await;
        populate(db.clone(), "1", 2).await;

        let params = CachePurgeParams { partition: Some("api".into()), max_entries: None, stale: false };
        let out = output(&purge_impl(&worker, params).await.unwrap());
        assert_eq!(out["deleted_partitions"][0], "myapp:1:api");
        assert_eq!(db.count_entries("myapp:1:api").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_stale_versions() {
        let (worker, db) = offline_worker().await;
        populate(db, "0", 1).await;

        let params = CachePurgeParams { partition: None, max_entries: None, stale: true };
        let out = output(&purge_impl(&worker, params).await.unwrap());
        assert_eq!(out["deleted_partitions"][0], "myapp:0:api");
    }

    #[tokio::test]
    async fn test_purge_no_params() {
        let (worker, _db) = offline_worker().await;
        let params = CachePurgeParams { partition: None, max_entries: None, stale: false };

        let result = purge_impl(&worker, params).await;
        assert!(result.is_err());
    }
}

//! cache_get tool implementation.
//!
//! Retrieves the metadata of the entry a URL maps to in a partition.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::ServiceWorker;
use swcache_core::cache::EntryMeta;

use crate::tools::json_result;

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Partition name, e.g. "api" or "precache".
    pub partition: String,

    /// Request URL; volatile parameters are ignored.
    pub url: String,
}

/// Output from the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    /// The stored entry, without its body.
    pub entry: EntryMeta,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(worker: &ServiceWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let entry = worker.lookup(&params.partition, &params.url).await?;
    json_result(&CacheGetOutput { entry })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tools::test_support::{offline_worker, output};
    use swcache_core::{CacheStore, CacheVersion, KeyNormalizer, Response};

    #[tokio::test]
    async fn test_get_impl_missing() {
        let (worker, _db) = offline_worker().await;
        let params = CacheGetParams { partition: "api".into(), url: "/api/nonexistent".into() };

        let result = get_impl(&worker, params).await;
        assert_eq!(result.unwrap_err().code.0, -32001);
    }

    #[tokio::test]
    async fn test_get_impl_found() {
        let (worker, db) = offline_worker().await;
        let store = CacheStore::new(
            db,
            CacheVersion::new("myapp", "1").unwrap(),
            Arc::new(KeyNormalizer::default()),
            Arc::new(Default::default()),
        );
        let partition = store.open("api").await.unwrap();
        store
            .put(
                &partition,
                &store.key_for("http://127.0.0.1:9/api/users"),
                Response::new("http://127.0.0.1:9/api/users", 200, vec![], "[]"),
            )
            .await
            .unwrap();

        let params = CacheGetParams { partition: "api".into(), url: "/api/users?_dc=9".into() };
        let out = output(&get_impl(&worker, params).await.unwrap());
        assert_eq!(out["entry"]["cache_key"], "http://127.0.0.1:9/api/users");
        assert_eq!(out["entry"]["body_len"], 2);
    }
}

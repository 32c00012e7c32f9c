//! sw_fetch tool implementation.
//!
//! Routes a request through the service worker and reports where the
//! response came from.

use std::sync::Arc;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::ServiceWorker;
use swcache_core::{Error, Request, ResponseSource, Strategy};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL, or a path resolved against the configured base URL.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Treat the request as a page navigation.
    #[serde(default)]
    pub navigate: bool,

    /// Include the response body as text (default: true).
    #[serde(default = "default_true")]
    pub include_body: bool,
}

fn default_method() -> String {
    "GET".into()
}

fn default_true() -> bool {
    true
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    /// The URL the response was fetched or stored under.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Whether the response came from the network or a cache partition.
    pub source: ResponseSource,
    /// Strategy that produced the response.
    pub strategy: Strategy,
    /// Storage key of the partition consulted.
    pub partition: Option<String>,
    /// Normalized cache key.
    pub cache_key: Option<String>,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Body length in bytes.
    pub body_len: usize,
    /// Body decoded as UTF-8 (lossy).
    pub body: Option<String>,
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(worker: &Arc<ServiceWorker>, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let request = Request { method: params.method.to_ascii_uppercase(), url: params.url, navigate: params.navigate };
    let served = worker
        .spawn_fetch(request)
        .await
        .map_err(|e| ToolError::TaskFailed(e.to_string()))??;

    let response = served.response;
    let output = SwFetchOutput {
        url: response.url().to_string(),
        status: response.status(),
        source: served.source,
        strategy: served.strategy,
        partition: served.partition,
        cache_key: served.cache_key,
        content_type: response.header("content-type").map(String::from),
        body_len: response.body().len(),
        body: params
            .include_body
            .then(|| String::from_utf8_lossy(response.body()).into_owned()),
    };

    json_result(&output)
}

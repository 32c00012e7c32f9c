//! Lifecycle tools: sw_install, sw_activate, sw_release_clients, sw_status.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::{LifecycleStatus, PrecacheReport, ServiceWorker};

use super::json_result;

/// Output from the sw_install tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SwInstallOutput {
    /// Precache result, absent when the version was already installed.
    pub precache: Option<PrecacheReport>,
    pub status: LifecycleStatus,
}

/// Output from the sw_activate and sw_release_clients tools.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwActivateOutput {
    /// Whether a waiting version was activated.
    pub activated: bool,
    /// Partition keys removed by stale-cache cleanup.
    pub deleted_partitions: Vec<String>,
}

pub async fn install_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let precache = worker.install().await?;
    let status = worker.status().await;
    json_result(&SwInstallOutput { precache, status })
}

pub async fn activate_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let deleted_partitions = worker.activate().await?;
    json_result(&SwActivateOutput { activated: true, deleted_partitions })
}

pub async fn release_clients_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    let output = match worker.release_clients().await? {
        Some(deleted_partitions) => SwActivateOutput { activated: true, deleted_partitions },
        None => SwActivateOutput { activated: false, deleted_partitions: Vec::new() },
    };
    json_result(&output)
}

pub async fn status_impl(worker: &ServiceWorker) -> Result<CallToolResult, McpError> {
    json_result(&worker.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{offline_worker, output};

    #[tokio::test]
    async fn test_status_reports_active_version() {
        let (worker, _db) = offline_worker().await;
        let out = output(&status_impl(&worker).await.unwrap());
        assert_eq!(out["state"], "active");
        assert_eq!(out["active"], "myapp:1");
        assert_eq!(out["controlled"], true);
    }

    #[tokio::test]
    async fn test_install_of_active_version_is_noop() {
        let (worker, _db) = offline_worker().await;
        let out = output(&install_impl(&worker).await.unwrap());
        assert!(out["precache"].is_null());
        assert_eq!(out["status"]["active"], "myapp:1");
    }

    #[tokio::test]
    async fn test_activate_without_waiting_version() {
        let (worker, _db) = offline_worker().await;
        let err = activate_impl(&worker).await.unwrap_err();
        assert_eq!(err.code.0, -32008);
    }

    #[tokio::test]
    async fn test_release_clients_without_waiting_version() {
        let (worker, _db) = offline_worker().await;
        let out = output(&release_clients_impl(&worker).await.unwrap());
        assert_eq!(out["activated"], false);

        let status = output(&status_impl(&worker).await.unwrap());
        assert_eq!(status["controlled"], false);
    }
}

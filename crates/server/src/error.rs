//! Structured errors for the mcp-swcache server.
//!
//! Engine failures arrive as `swcache_core::Error`; these cover what can go
//! wrong in the server itself.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Structured errors for the mcp-swcache server.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The task handling a request panicked or was cancelled.
    #[error("TASK_FAILED: {0}")]
    TaskFailed(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::TaskFailed(_) => (-32000, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failed_maps_to_server_error() {
        let err: McpError = ToolError::TaskFailed("panicked".into()).into();
        assert_eq!(err.code.0, -32000);
        assert!(err.message.starts_with("TASK_FAILED"));
    }
}

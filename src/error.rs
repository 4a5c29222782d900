//! Error taxonomy for the Airflow MCP server.
//!
//! Fatal errors (spec loading, upstream reachability at startup) propagate as
//! `Err` out of `run()` and are reported by the CLI boundary via `anyhow`.
//! Call-scoped errors are caught by the service layer and turned into an
//! error [`rmcp::model::CallToolResult`] content part instead of tearing down
//! the session -- see `mcp_service::call_tool`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AirflowMcpError {
    #[error("invalid OpenAPI document: {0}")]
    SpecInvalid(String),

    #[error("upstream Airflow instance unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream request timed out after {0:?}")]
    UpstreamTimeout(std::time::Duration),

    #[error("upstream request failed: {0}")]
    UpstreamError(String),

    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("invalid argument at '{path}': {message}")]
    InvalidArgument { path: String, message: String },

    #[error("'{0}' is not permitted in read-only mode")]
    PermissionDenied(String),
}

impl AirflowMcpError {
    /// Property path to surface alongside an `InvalidArgument`, per §7.
    pub fn invalid_argument(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            path: path.into(),
            message: message.into(),
        }
    }
}

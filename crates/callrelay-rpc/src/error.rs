//! Transport-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors from a chain connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx status, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connect/send/receive error, or the connection was lost.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The endpoint URL names a scheme no transport handles.
    #[error("unsupported endpoint '{url}': expected http(s):// or ws(s)://")]
    UnsupportedEndpoint { url: String },

    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The client's background task is gone.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    /// Returns `true` for transient failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. }
        )
    }
}

//! Error types for server configuration, transports, and the registry.

use thiserror::Error;

/// Errors from validating a [`crate::ServerConfig`].
///
/// These are caller errors, raised before any process is spawned or any
/// network connection is attempted. They are never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("server '{name}': '{field}' is required for {transport} transport")]
    MissingField {
        name: String,
        field: &'static str,
        transport: &'static str,
    },

    #[error("server name must not be empty")]
    EmptyName,
}

/// Errors from opening or using a transport channel.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("network error for {url}: {message}")]
    NetworkFailed { url: String, message: String },

    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    #[error("server returned JSON-RPC error (code {code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by [`crate::ServerRegistry`] operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("server '{name}' is not registered")]
    ServerNotFound { name: String },
}

//! Server configuration types and per-transport validation.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

fn default_timeout_secs() -> u64 {
    30
}

fn default_terminate_on_close() -> bool {
    true
}

/// How to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON-RPC over stdio.
    Stdio,
    /// HTTP event-stream endpoint with a separate POST channel.
    Sse,
    /// Single-endpoint streamable HTTP (POST per message).
    StreamableHttp,
}

impl TransportKind {
    /// Lowercase label used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Sse => "sse",
            TransportKind::StreamableHttp => "streamable_http",
        }
    }
}

/// Identity and connection recipe for one MCP server.
///
/// Only the fields relevant to `transport` are meaningful; [`validate`]
/// rejects configs missing a required field for the chosen kind before
/// anything is spawned or connected.
///
/// [`validate`]: ServerConfig::validate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique registry key for this server.
    pub name: String,
    pub transport: TransportKind,

    /// Command to run (stdio only), e.g. "npx" or "uvx".
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments to pass to the command (stdio only).
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment for the child process (stdio only). A `PATH` entry is
    /// inherited from the host process when absent.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Endpoint URL (SSE and streamable HTTP only).
    #[serde(default)]
    pub url: Option<String>,
    /// Extra request headers (SSE and streamable HTTP only).
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Connection establishment timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Per-request read timeout in seconds (default 30).
    #[serde(default = "default_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Whether channel release explicitly tears down the server-side
    /// session (streamable HTTP only, default true).
    #[serde(default = "default_terminate_on_close")]
    pub terminate_on_close: bool,
}

impl ServerConfig {
    /// Minimal stdio config; other fields take their defaults.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transport: TransportKind::Stdio,
            command: Some(command.into()),
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            connect_timeout_secs: default_timeout_secs(),
            read_timeout_secs: default_timeout_secs(),
            terminate_on_close: default_terminate_on_close(),
        }
    }

    /// Check that every field required by the chosen transport is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        match self.transport {
            TransportKind::Stdio => {
                if self.command.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::MissingField {
                        name: self.name.clone(),
                        field: "command",
                        transport: "stdio",
                    });
                }
            }
            TransportKind::Sse | TransportKind::StreamableHttp => {
                if self.url.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::MissingField {
                        name: self.name.clone(),
                        field: "url",
                        transport: self.transport.as_str(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_stdio_config() {
        let toml_str = r#"
name = "filesystem"
transport = "stdio"
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "/home/user"]
"#;
        let config: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.command.as_deref(), Some("npx"));
        assert_eq!(config.args.len(), 3);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.read_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_sse_config_from_json() {
        let json = r#"{
            "name": "web-service",
            "transport": "sse",
            "url": "https://api.example.com/mcp/sse",
            "headers": {"Authorization": "Bearer token"},
            "read_timeout_secs": 60
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.headers["Authorization"], "Bearer token");
        assert_eq!(config.read_timeout_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_streamable_http_defaults() {
        let json = r#"{
            "name": "stream",
            "transport": "streamable_http",
            "url": "https://api.example.com/mcp"
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.transport, TransportKind::StreamableHttp);
        assert!(config.terminate_on_close);
    }

    #[test]
    fn stdio_without_command_fails_validation() {
        let json = r#"{"name": "calc", "transport": "stdio"}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        match config.validate() {
            Err(ConfigError::MissingField { field, .. }) => assert_eq!(field, "command"),
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn sse_without_url_fails_validation() {
        let json = r#"{"name": "web", "transport": "sse"}"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        match config.validate() {
            Err(ConfigError::MissingField { field, transport, .. }) => {
                assert_eq!(field, "url");
                assert_eq!(transport, "sse");
            }
            other => panic!("expected MissingField, got {other:?}"),
        }
    }

    #[test]
    fn empty_name_fails_validation() {
        let config = ServerConfig::stdio("", "calc-tool");
        assert!(matches!(config.validate(), Err(ConfigError::EmptyName)));
    }

    #[test]
    fn unknown_transport_kind_is_a_parse_error() {
        let json = r#"{"name": "x", "transport": "websocket", "url": "ws://x"}"#;
        assert!(serde_json::from_str::<ServerConfig>(json).is_err());
    }
}

//! Protocol-level handle over an open transport.
//!
//! Wraps a [`Transport`] with the MCP handshake (`initialize` followed
//! by the `notifications/initialized` notification) and typed listing
//! and invocation operations. A `ScopedChannel` serves exactly one
//! logical operation and is never stored between calls.

use crate::config::ServerConfig;
use crate::discovery::{PromptInfo, ResourceInfo, ToolInfo};
use crate::error::ConnectionError;
use crate::transport::Transport;
use serde::Deserialize;

/// MCP protocol revision this client speaks.
const PROTOCOL_VERSION: &str = "2025-03-26";

/// An initialized channel to one server.
pub struct ScopedChannel {
    transport: Transport,
}

#[derive(Deserialize)]
struct ToolsList {
    #[serde(default)]
    tools: Vec<ToolEntry>,
}

#[derive(Deserialize)]
struct ToolEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default = "empty_object_schema", rename = "inputSchema")]
    input_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

#[derive(Deserialize)]
struct ResourcesList {
    #[serde(default)]
    resources: Vec<ResourceInfo>,
}

#[derive(Deserialize)]
struct PromptsList {
    #[serde(default)]
    prompts: Vec<PromptInfo>,
}

impl ScopedChannel {
    /// Open a transport to the configured server and perform the
    /// handshake. On any failure the transport is closed before the
    /// error is returned.
    pub async fn open(config: &ServerConfig) -> Result<Self, ConnectionError> {
        let transport = Transport::open(config).await?;

        let init = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "switchboard",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });

        let handshake = async {
            transport
                .request("initialize", Some(init))
                .await?
                .into_result()?;
            transport.notify("notifications/initialized", None).await
        };

        if let Err(e) = handshake.await {
            transport.close().await;
            return Err(e);
        }

        Ok(Self { transport })
    }

    /// `tools/list` — the one listing every usable server must answer.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, ConnectionError> {
        let value = self.transport.request("tools/list", None).await?.into_result()?;
        let list: ToolsList = serde_json::from_value(value)
            .map_err(|e| ConnectionError::Protocol(format!("bad tools/list response: {e}")))?;
        Ok(list
            .tools
            .into_iter()
            .map(|t| ToolInfo {
                name: t.name,
                description: t.description.unwrap_or_default(),
                input_schema: t.input_schema,
            })
            .collect())
    }

    /// `resources/list` — optional server capability.
    pub async fn list_resources(&self) -> Result<Vec<ResourceInfo>, ConnectionError> {
        let value = self
            .transport
            .request("resources/list", None)
            .await?
            .into_result()?;
        let list: ResourcesList = serde_json::from_value(value)
            .map_err(|e| ConnectionError::Protocol(format!("bad resources/list response: {e}")))?;
        Ok(list.resources)
    }

    /// `prompts/list` — optional server capability.
    pub async fn list_prompts(&self) -> Result<Vec<PromptInfo>, ConnectionError> {
        let value = self
            .transport
            .request("prompts/list", None)
            .await?
            .into_result()?;
        let list: PromptsList = serde_json::from_value(value)
            .map_err(|e| ConnectionError::Protocol(format!("bad prompts/list response: {e}")))?;
        Ok(list.prompts)
    }

    /// `tools/call` — returns the raw result payload; the invoker owns
    /// the mapping into a [`crate::ToolCallResult`].
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ConnectionError> {
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });
        self.transport
            .request("tools/call", Some(params))
            .await?
            .into_result()
    }

    /// `resources/read` — raw result payload, mapped by the invoker.
    pub async fn read_resource(&self, uri: &str) -> Result<serde_json::Value, ConnectionError> {
        let params = serde_json::json!({ "uri": uri });
        self.transport
            .request("resources/read", Some(params))
            .await?
            .into_result()
    }

    /// Release the underlying transport.
    pub async fn close(self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_entry_defaults_missing_schema() {
        let json = r#"{"name": "list"}"#;
        let entry: ToolEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.name, "list");
        assert!(entry.description.is_none());
        assert_eq!(entry.input_schema["type"], "object");
    }

    #[test]
    fn tools_list_parses_server_order() {
        let json = r#"{
            "tools": [
                {"name": "b", "description": "Second letter", "inputSchema": {"type": "object"}},
                {"name": "a", "inputSchema": {"type": "object"}}
            ]
        }"#;
        let list: ToolsList = serde_json::from_str(json).unwrap();
        assert_eq!(list.tools.len(), 2);
        assert_eq!(list.tools[0].name, "b");
        assert_eq!(list.tools[1].name, "a");
    }

    #[test]
    fn resources_list_tolerates_missing_fields() {
        let json = r#"{"resources": [{"uri": "file:///tmp/a.txt", "name": "a"}]}"#;
        let list: ResourcesList = serde_json::from_str(json).unwrap();
        assert_eq!(list.resources[0].uri, "file:///tmp/a.txt");
        assert!(list.resources[0].mime_type.is_none());
    }

    #[test]
    fn empty_result_objects_parse_as_empty_lists() {
        let list: ToolsList = serde_json::from_str("{}").unwrap();
        assert!(list.tools.is_empty());
        let list: PromptsList = serde_json::from_str("{}").unwrap();
        assert!(list.prompts.is_empty());
    }
}

//! Tool invocation over per-call transient channels.
//!
//! `call_tool` never returns `Err`: tool calls are driven by untrusted
//! model output, and a misbehaving call must not be able to crash the
//! orchestrating caller. Every failure path folds into the returned
//! [`ToolCallResult`].

use crate::channel::ScopedChannel;
use crate::error::ConnectionError;
use crate::registry::ServerRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// One item of tool output, mirroring the server's content tagging.
/// Unrecognized payload kinds are preserved verbatim rather than
/// dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentItem {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: serde_json::Value,
    },
    #[serde(untagged)]
    Other(serde_json::Value),
}

impl ContentItem {
    /// Map one raw content item by its `type` tag, the way the wire
    /// format spells it.
    fn from_value(value: serde_json::Value) -> Self {
        match value.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
                    return ContentItem::Text {
                        text: text.to_string(),
                    };
                }
                ContentItem::Other(value)
            }
            Some("image") => {
                let data = value.get("data").and_then(|d| d.as_str());
                let mime = value.get("mimeType").and_then(|m| m.as_str());
                if let (Some(data), Some(mime)) = (data, mime) {
                    return ContentItem::Image {
                        data: data.to_string(),
                        mime_type: mime.to_string(),
                    };
                }
                ContentItem::Other(value)
            }
            Some("resource") => ContentItem::Resource {
                resource: value.get("resource").cloned().unwrap_or(value),
            },
            _ => ContentItem::Other(value),
        }
    }
}

/// Outcome of one tool invocation. Ephemeral — never stored.
///
/// `success` reflects only whether the call mechanically completed;
/// `is_error` is the server's own logical-error flag. A tool can report
/// a failure while the transport exchange itself succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    fn completed(content: Vec<ContentItem>, is_error: bool) -> Self {
        Self {
            success: true,
            content,
            is_error,
            error: None,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            content: Vec::new(),
            is_error: true,
            error: Some(message.into()),
        }
    }
}

/// Executes tool calls against registered servers.
///
/// Each call opens a fresh channel scoped to that single call — never
/// one shared with discovery, health checks, or prior calls. A stdio
/// channel is backed by a child process whose pipe can wedge after one
/// exchange; isolation keeps one bad call from corrupting the next.
pub struct ToolInvoker {
    registry: Arc<ServerRegistry>,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self { registry }
    }

    /// Call `tool` on `server` with the given argument object.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Value,
    ) -> ToolCallResult {
        let config = match self.registry.connected_config(server).await {
            Ok(config) => config,
            Err(message) => return ToolCallResult::failed(message),
        };

        let _permit = self.registry.permit().await;
        let channel = match ScopedChannel::open(&config).await {
            Ok(channel) => channel,
            Err(e) => return self.transport_failure(server, tool, e).await,
        };

        let outcome = channel.call_tool(tool, arguments).await;
        channel.close().await;

        match outcome {
            Ok(value) => map_call_result(value),
            Err(e) => self.transport_failure(server, tool, e).await,
        }
    }

    /// [`call_tool`] bounded by a caller-supplied deadline. Expiry
    /// yields a failed result; the in-flight channel is torn down with
    /// the cancelled call.
    ///
    /// [`call_tool`]: ToolInvoker::call_tool
    pub async fn call_tool_with_deadline(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Value,
        deadline: Duration,
    ) -> ToolCallResult {
        match tokio::time::timeout(deadline, self.call_tool(server, tool, arguments)).await {
            Ok(result) => result,
            Err(_) => ToolCallResult::failed(format!(
                "call to '{tool}' on '{server}' exceeded deadline of {}ms",
                deadline.as_millis()
            )),
        }
    }

    /// Read a resource from `server` by URI, with the same isolation
    /// and never-fails discipline as `call_tool`.
    pub async fn read_resource(&self, server: &str, uri: &str) -> ToolCallResult {
        let config = match self.registry.connected_config(server).await {
            Ok(config) => config,
            Err(message) => return ToolCallResult::failed(message),
        };

        let _permit = self.registry.permit().await;
        let channel = match ScopedChannel::open(&config).await {
            Ok(channel) => channel,
            Err(e) => return self.transport_failure(server, uri, e).await,
        };

        let outcome = channel.read_resource(uri).await;
        channel.close().await;

        match outcome {
            Ok(value) => map_read_result(value),
            Err(e) => self.transport_failure(server, uri, e).await,
        }
    }

    /// Fold a channel error into a failed result. Transport-level
    /// failures also flip the record's `connected` flag; a JSON-RPC
    /// error does not — the server answered, the channel is fine.
    async fn transport_failure(
        &self,
        server: &str,
        operation: &str,
        e: ConnectionError,
    ) -> ToolCallResult {
        if !matches!(e, ConnectionError::Rpc { .. }) {
            self.registry.mark_disconnected(server).await;
        }
        tracing::warn!(server = %server, "'{operation}' failed: {e}");
        ToolCallResult::failed(e.to_string())
    }
}

/// Map a `tools/call` result payload: a structured content array item
/// by item, or a string rendering when the shape is unrecognized.
fn map_call_result(value: serde_json::Value) -> ToolCallResult {
    let is_error = value
        .get("isError")
        .and_then(|e| e.as_bool())
        .unwrap_or(false);

    match value.get("content").and_then(|c| c.as_array()) {
        Some(items) => {
            let content = items
                .iter()
                .cloned()
                .map(ContentItem::from_value)
                .collect();
            ToolCallResult::completed(content, is_error)
        }
        None => ToolCallResult::completed(
            vec![ContentItem::Text {
                text: value.to_string(),
            }],
            false,
        ),
    }
}

/// Map a `resources/read` result payload: each entry of `contents`
/// becomes a resource item.
fn map_read_result(value: serde_json::Value) -> ToolCallResult {
    match value.get("contents").and_then(|c| c.as_array()) {
        Some(items) => {
            let content = items
                .iter()
                .cloned()
                .map(|resource| ContentItem::Resource { resource })
                .collect();
            ToolCallResult::completed(content, false)
        }
        None => ToolCallResult::completed(
            vec![ContentItem::Text {
                text: value.to_string(),
            }],
            false,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_server_fails_without_io() {
        let invoker = ToolInvoker::new(Arc::new(ServerRegistry::new()));
        let result = invoker
            .call_tool("absent", "add", serde_json::json!({}))
            .await;
        assert!(!result.success);
        assert!(result.is_error);
        assert!(result.error.as_deref().unwrap_or("").contains("not found"));
    }

    #[tokio::test]
    async fn unknown_server_read_resource_fails_without_io() {
        let invoker = ToolInvoker::new(Arc::new(ServerRegistry::new()));
        let result = invoker.read_resource("absent", "file:///x").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn map_structured_text_content() {
        let value = serde_json::json!({
            "content": [{"type": "text", "text": "5"}],
            "isError": false
        });
        let result = map_call_result(value);
        assert!(result.success);
        assert!(!result.is_error);
        assert_eq!(
            result.content,
            vec![ContentItem::Text {
                text: "5".to_string()
            }]
        );
    }

    #[test]
    fn map_server_reported_tool_error() {
        let value = serde_json::json!({
            "content": [{"type": "text", "text": "division by zero"}],
            "isError": true
        });
        let result = map_call_result(value);
        // The call completed; the tool itself reported failure.
        assert!(result.success);
        assert!(result.is_error);
        assert!(result.error.is_none());
    }

    #[test]
    fn map_image_and_resource_content() {
        let value = serde_json::json!({
            "content": [
                {"type": "image", "data": "b64", "mimeType": "image/png"},
                {"type": "resource", "resource": {"uri": "file:///a"}}
            ]
        });
        let result = map_call_result(value);
        assert_eq!(result.content.len(), 2);
        assert!(matches!(result.content[0], ContentItem::Image { .. }));
        assert!(matches!(result.content[1], ContentItem::Resource { .. }));
    }

    #[test]
    fn map_unknown_content_kind_is_preserved() {
        let value = serde_json::json!({
            "content": [{"type": "audio", "data": "b64"}]
        });
        let result = map_call_result(value);
        match &result.content[0] {
            ContentItem::Other(raw) => assert_eq!(raw["type"], "audio"),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn map_unstructured_result_falls_back_to_string() {
        let value = serde_json::json!({"answer": 42});
        let result = map_call_result(value);
        assert!(result.success);
        assert!(!result.is_error);
        match &result.content[0] {
            ContentItem::Text { text } => assert!(text.contains("42")),
            other => panic!("expected Text fallback, got {other:?}"),
        }
    }

    #[test]
    fn map_read_result_wraps_contents() {
        let value = serde_json::json!({
            "contents": [{"uri": "file:///a.txt", "text": "hello", "mimeType": "text/plain"}]
        });
        let result = map_read_result(value);
        assert!(result.success);
        match &result.content[0] {
            ContentItem::Resource { resource } => assert_eq!(resource["text"], "hello"),
            other => panic!("expected Resource, got {other:?}"),
        }
    }

    #[test]
    fn content_item_serializes_with_wire_tags() {
        let item = ContentItem::Image {
            data: "b64".to_string(),
            mime_type: "image/png".to_string(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["mimeType"], "image/png");
    }
}

//! Capability discovery over an open channel.

use crate::channel::ScopedChannel;
use crate::error::ConnectionError;
use serde::{Deserialize, Serialize};

/// A tool exposed by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A resource exposed by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "mimeType")]
    pub mime_type: Option<String>,
}

/// A prompt template exposed by a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Snapshot of what a server offered at discovery time. Lists keep the
/// server-reported order; names are opaque and uniqueness is the
/// server's responsibility.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub tools: Vec<ToolInfo>,
    pub resources: Vec<ResourceInfo>,
    pub prompts: Vec<PromptInfo>,
}

/// Query a server for its tools, resources, and prompts.
///
/// Tool listing is mandatory — a server that cannot answer `tools/list`
/// is not usable and the error propagates. Resource and prompt listings
/// are each best-effort: many servers simply do not implement them, so
/// a failure there degrades to an empty list.
pub async fn discover(channel: &ScopedChannel) -> Result<Capabilities, ConnectionError> {
    let tools = channel.list_tools().await?;

    let resources = match channel.list_resources().await {
        Ok(resources) => resources,
        Err(e) => {
            tracing::warn!("resource listing unavailable: {e}");
            Vec::new()
        }
    };

    let prompts = match channel.list_prompts().await {
        Ok(prompts) => prompts,
        Err(e) => {
            tracing::warn!("prompt listing unavailable: {e}");
            Vec::new()
        }
    };

    Ok(Capabilities {
        tools,
        resources,
        prompts,
    })
}

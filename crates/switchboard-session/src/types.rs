//! Conversation history data types.
//!
//! Message content is opaque to the store: callers append whatever
//! role/content shape their orchestration layer uses, and read it back
//! in insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    pub role: String,
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    /// Message stamped with the current time.
    pub fn new(role: impl Into<String>, content: impl Into<serde_json::Value>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the tool invocations this turn performed.
    pub fn with_tool_calls(mut self, tool_calls: serde_json::Value) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }
}

/// Lightweight view of one session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}

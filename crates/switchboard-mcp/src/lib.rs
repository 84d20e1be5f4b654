//! Client-side MCP connection manager.
//!
//! Multiplexes access to many independently-addressable MCP servers
//! over three transport kinds (child-process stdio, HTTP event-stream,
//! streamable HTTP), discovers each server's capability set, and
//! executes tool invocations with per-call channel isolation.
//!
//! The registry holds configs and capability snapshots, never live
//! connections: every operation — add, health check, tool call — opens
//! its own transient channel and releases it before returning.

pub mod channel;
pub mod config;
pub mod discovery;
pub mod error;
pub mod invoker;
pub mod jsonrpc;
pub mod registry;
mod sse;
mod stdio;
mod streamable;
mod transport;

pub use channel::ScopedChannel;
pub use config::{ServerConfig, TransportKind};
pub use discovery::{Capabilities, PromptInfo, ResourceInfo, ToolInfo, discover};
pub use error::{ConfigError, ConnectionError, RegistryError};
pub use invoker::{ContentItem, ToolCallResult, ToolInvoker};
pub use registry::{ServerInfoView, ServerRegistry};

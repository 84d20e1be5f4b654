//! The closed set of channel kinds behind one `open` entry point.

use crate::config::{ServerConfig, TransportKind};
use crate::error::ConnectionError;
use crate::jsonrpc::Response;
use crate::sse::SseChannel;
use crate::stdio::StdioChannel;
use crate::streamable::StreamableHttpChannel;

/// A bidirectional JSON-RPC channel to one server, scoped to a single
/// logical operation. Adding a transport kind means adding a variant
/// here and an arm in [`open`]; there is no string dispatch.
///
/// [`open`]: Transport::open
pub enum Transport {
    Stdio(StdioChannel),
    Sse(SseChannel),
    StreamableHttp(StreamableHttpChannel),
}

impl Transport {
    /// Open a channel of the kind the config selects.
    ///
    /// Callers are expected to have run [`ServerConfig::validate`]
    /// first; an invalid config surfaces here as the transport-level
    /// failure of whatever field is missing.
    pub async fn open(config: &ServerConfig) -> Result<Self, ConnectionError> {
        match config.transport {
            TransportKind::Stdio => Ok(Transport::Stdio(StdioChannel::open(config)?)),
            TransportKind::Sse => Ok(Transport::Sse(SseChannel::open(config).await?)),
            TransportKind::StreamableHttp => Ok(Transport::StreamableHttp(
                StreamableHttpChannel::open(config)?,
            )),
        }
    }

    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Response, ConnectionError> {
        match self {
            Transport::Stdio(ch) => ch.request(method, params).await,
            Transport::Sse(ch) => ch.request(method, params).await,
            Transport::StreamableHttp(ch) => ch.request(method, params).await,
        }
    }

    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ConnectionError> {
        match self {
            Transport::Stdio(ch) => ch.notify(method, params).await,
            Transport::Sse(ch) => ch.notify(method, params).await,
            Transport::StreamableHttp(ch) => ch.notify(method, params).await,
        }
    }

    /// Release the channel's resources. Stdio kills the child process;
    /// streamable HTTP optionally tears down the server session.
    pub async fn close(self) {
        match self {
            Transport::Stdio(ch) => ch.close().await,
            Transport::Sse(ch) => ch.close().await,
            Transport::StreamableHttp(ch) => ch.close().await,
        }
    }
}

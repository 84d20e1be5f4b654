//! HTTP event-stream channel.
//!
//! The server's event stream is opened with a GET; its first `endpoint`
//! event names the POST target for outgoing JSON-RPC messages, and
//! subsequent `message` events carry the responses.

use crate::config::ServerConfig;
use crate::error::ConnectionError;
use crate::jsonrpc::{Notification, Request, Response};
use futures_util::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

/// A single event parsed from an SSE stream.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

/// Incremental SSE parser that turns text chunks into events.
pub struct SseParser {
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    /// Feed a chunk and return any events completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        // Event blocks end at a blank line, LF or CRLF framed.
        loop {
            let lf = self.buffer.find("\n\n");
            let crlf = self.buffer.find("\r\n\r\n");
            let (pos, sep) = match (lf, crlf) {
                (Some(l), Some(c)) if c < l => (c, 4),
                (Some(l), _) => (l, 2),
                (None, Some(c)) => (c, 4),
                (None, None) => break,
            };

            let block = self.buffer[..pos].to_string();
            self.buffer = self.buffer[pos + sep..].to_string();

            if let Some(event) = Self::parse_block(&block) {
                events.push(event);
            }
        }

        events
    }

    fn parse_block(block: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_lines = Vec::new();

        for line in block.lines() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.starts_with(':') {
                continue;
            }
            if let Some((field, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "event" => event_type = Some(value.to_string()),
                    "data" => data_lines.push(value.to_string()),
                    _ => {}
                }
            } else if line == "data" {
                data_lines.push(String::new());
            }
        }

        if data_lines.is_empty() {
            return None;
        }

        Some(SseEvent {
            event_type,
            data: data_lines.join("\n"),
        })
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// Channel backed by a long-lived event stream plus per-request POSTs.
pub struct SseChannel {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    next_id: AtomicU64,
    pending: PendingMap,
    reader: JoinHandle<()>,
    read_timeout: Duration,
}

/// Build a reqwest header map from the config's string pairs.
pub(crate) fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, ConnectionError> {
    let mut map = HeaderMap::new();
    for (key, value) in headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ConnectionError::Protocol(format!("invalid header name '{key}'")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| ConnectionError::Protocol(format!("invalid value for header '{key}'")))?;
        map.insert(name, value);
    }
    Ok(map)
}

pub(crate) fn network_failed(url: &str, err: &reqwest::Error) -> ConnectionError {
    ConnectionError::NetworkFailed {
        url: url.to_string(),
        message: err.to_string(),
    }
}

impl SseChannel {
    /// Connect the event stream and wait for the server's `endpoint`
    /// event naming the POST target.
    pub async fn open(config: &ServerConfig) -> Result<Self, ConnectionError> {
        let url = config.url.as_deref().unwrap_or_default();
        let base = Url::parse(url)
            .map_err(|e| ConnectionError::Protocol(format!("invalid url '{url}': {e}")))?;
        let headers = header_map(&config.headers)?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| network_failed(url, &e))?;

        let response = tokio::time::timeout(
            config.connect_timeout(),
            http.get(base.clone())
                .headers(headers.clone())
                .header(ACCEPT, "text/event-stream")
                .send(),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            method: "connect".to_string(),
            timeout_ms: config.connect_timeout().as_millis() as u64,
        })?
        .map_err(|e| network_failed(url, &e))?
        .error_for_status()
        .map_err(|e| network_failed(url, &e))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();

        let pending_for_reader = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            let mut endpoint_tx = Some(endpoint_tx);
            let mut parser = SseParser::new();
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let Ok(chunk) = chunk else { break };
                let text = String::from_utf8_lossy(&chunk);
                for event in parser.feed(&text) {
                    match event.event_type.as_deref() {
                        Some("endpoint") => {
                            if let Some(tx) = endpoint_tx.take() {
                                let _ = tx.send(event.data);
                            }
                        }
                        Some("message") | None => {
                            let resp: Response = match serde_json::from_str(&event.data) {
                                Ok(r) => r,
                                Err(e) => {
                                    tracing::debug!("skipping unparseable SSE message: {e}");
                                    continue;
                                }
                            };
                            if let Some(id) = resp.id {
                                if let Some(tx) = pending_for_reader.lock().await.remove(&id) {
                                    let _ = tx.send(resp);
                                }
                            }
                        }
                        Some(other) => {
                            tracing::debug!("ignoring SSE event type '{other}'");
                        }
                    }
                }
            }
        });

        let endpoint = match tokio::time::timeout(config.connect_timeout(), endpoint_rx).await {
            Ok(Ok(raw)) => base.join(&raw).map_err(|e| {
                ConnectionError::Protocol(format!("invalid endpoint event '{raw}': {e}"))
            })?,
            Ok(Err(_)) | Err(_) => {
                reader.abort();
                return Err(ConnectionError::Protocol(
                    "event stream closed before the endpoint event".to_string(),
                ));
            }
        };

        Ok(Self {
            http,
            endpoint,
            headers,
            next_id: AtomicU64::new(1),
            pending,
            reader,
            read_timeout: config.read_timeout(),
        })
    }

    /// POST a request and wait for its response on the event stream.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Response, ConnectionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let post = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .timeout(self.read_timeout)
            .json(&Request::new(id, method, params))
            .send()
            .await;

        if let Err(e) = post.and_then(|r| r.error_for_status()) {
            self.pending.lock().await.remove(&id);
            return Err(network_failed(self.endpoint.as_str(), &e));
        }

        match tokio::time::timeout(self.read_timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(ConnectionError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ConnectionError::Timeout {
                    method: method.to_string(),
                    timeout_ms: self.read_timeout.as_millis() as u64,
                })
            }
        }
    }

    /// POST a notification; nothing comes back on the stream for it.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ConnectionError> {
        self.http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .timeout(self.read_timeout)
            .json(&Notification::new(method, params))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(|e| network_failed(self.endpoint.as_str(), &e))
    }

    /// Release the channel by dropping the event-stream connection.
    pub async fn close(self) {
        self.reader.abort();
    }
}

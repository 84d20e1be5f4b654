//! Streamable HTTP channel: one POST per JSON-RPC message.
//!
//! The response to a POST is either a direct JSON body or a short-lived
//! SSE body scanned for the matching response id. The server assigns a
//! session via the `Mcp-Session-Id` header on the first response; it is
//! echoed on every subsequent request and, when `terminate_on_close` is
//! set, explicitly deleted on channel release.

use crate::config::ServerConfig;
use crate::error::ConnectionError;
use crate::jsonrpc::{Notification, Request, Response};
use crate::sse::{SseParser, header_map, network_failed};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const SESSION_HEADER: &str = "mcp-session-id";

fn lock_session(slot: &Mutex<Option<HeaderValue>>) -> std::sync::MutexGuard<'_, Option<HeaderValue>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Channel over a single streamable HTTP endpoint.
pub struct StreamableHttpChannel {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
    next_id: AtomicU64,
    session_id: Mutex<Option<HeaderValue>>,
    read_timeout: Duration,
    terminate_on_close: bool,
}

impl StreamableHttpChannel {
    /// Build the channel. No bytes hit the wire until the first request;
    /// connectivity problems surface there as `NetworkFailed`.
    pub fn open(config: &ServerConfig) -> Result<Self, ConnectionError> {
        let url = config.url.as_deref().unwrap_or_default().to_string();
        let headers = header_map(&config.headers)?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| network_failed(&url, &e))?;

        Ok(Self {
            http,
            url,
            headers,
            next_id: AtomicU64::new(1),
            session_id: Mutex::new(None),
            read_timeout: config.read_timeout(),
            terminate_on_close: config.terminate_on_close,
        })
    }

    fn request_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        if let Some(session) = lock_session(&self.session_id).clone() {
            headers.insert(SESSION_HEADER, session);
        }
        headers
    }

    fn capture_session(&self, response: &reqwest::Response) {
        if let Some(value) = response.headers().get(SESSION_HEADER) {
            *lock_session(&self.session_id) = Some(value.clone());
        }
    }

    /// POST a request and decode its JSON or event-stream response body.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Response, ConnectionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let send = async {
            let response = self
                .http
                .post(&self.url)
                .headers(self.request_headers())
                .json(&Request::new(id, method, params))
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| network_failed(&self.url, &e))?;

            self.capture_session(&response);

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();

            if content_type.starts_with("text/event-stream") {
                self.read_stream_response(response, id).await
            } else if content_type.starts_with("application/json") {
                let resp: Response = response
                    .json()
                    .await
                    .map_err(|e| ConnectionError::Protocol(format!("bad response body: {e}")))?;
                Ok(resp)
            } else {
                Err(ConnectionError::Protocol(format!(
                    "unexpected content type '{content_type}' for '{method}'"
                )))
            }
        };

        tokio::time::timeout(self.read_timeout, send)
            .await
            .map_err(|_| ConnectionError::Timeout {
                method: method.to_string(),
                timeout_ms: self.read_timeout.as_millis() as u64,
            })?
    }

    /// Scan a per-request SSE body for the response matching `id`.
    async fn read_stream_response(
        &self,
        response: reqwest::Response,
        id: u64,
    ) -> Result<Response, ConnectionError> {
        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| network_failed(&self.url, &e))?;
            let text = String::from_utf8_lossy(&chunk);
            for event in parser.feed(&text) {
                let resp: Response = match serde_json::from_str(&event.data) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::debug!("skipping unparseable stream event: {e}");
                        continue;
                    }
                };
                if resp.id == Some(id) {
                    return Ok(resp);
                }
            }
        }

        Err(ConnectionError::Protocol(
            "stream ended before the response arrived".to_string(),
        ))
    }

    /// POST a notification; the server acknowledges with 202.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ConnectionError> {
        let response = self
            .http
            .post(&self.url)
            .headers(self.request_headers())
            .timeout(self.read_timeout)
            .json(&Notification::new(method, params))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| network_failed(&self.url, &e))?;

        self.capture_session(&response);
        Ok(())
    }

    /// Release the channel, explicitly ending the server session when
    /// configured to; otherwise the server times the session out.
    pub async fn close(self) {
        if !self.terminate_on_close {
            return;
        }
        let session = lock_session(&self.session_id).clone();
        if let Some(session) = session {
            let mut headers = self.headers.clone();
            headers.insert(SESSION_HEADER, session);
            let result = self
                .http
                .delete(&self.url)
                .headers(headers)
                .timeout(Duration::from_secs(5))
                .send()
                .await;
            if let Err(e) = result {
                tracing::debug!("session teardown request failed: {e}");
            }
        }
    }
}

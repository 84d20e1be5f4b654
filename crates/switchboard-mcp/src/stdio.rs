//! Child-process channel speaking newline-delimited JSON-RPC over stdio.

use crate::config::ServerConfig;
use crate::error::ConnectionError;
use crate::jsonrpc::{Notification, Request, Response};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// Channel backed by a spawned child process.
///
/// A writer task drains outgoing lines into the child's stdin; a reader
/// task parses stdout lines and completes the waiter registered under
/// the response id. The child is spawned with `kill_on_drop`, so the
/// process dies even on exit paths that never reach [`close`].
///
/// [`close`]: StdioChannel::close
pub struct StdioChannel {
    next_id: AtomicU64,
    outgoing: mpsc::Sender<String>,
    pending: PendingMap,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    child: Arc<Mutex<Child>>,
    read_timeout: Duration,
}

impl StdioChannel {
    /// Spawn the configured command and start the I/O tasks.
    ///
    /// The child environment is the config's `env` with the host `PATH`
    /// injected when the caller did not set one; launchers like `npx`
    /// and `uvx` need it to resolve the real server binary.
    pub fn open(config: &ServerConfig) -> Result<Self, ConnectionError> {
        let command = config.command.as_deref().unwrap_or_default();

        let mut env = config.env.clone();
        if !env.contains_key("PATH") {
            if let Ok(path) = std::env::var("PATH") {
                env.insert("PATH".to_string(), path);
            }
        }

        let mut cmd = Command::new(command);
        cmd.args(&config.args)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| ConnectionError::SpawnFailed {
            command: command.to_string(),
            source,
        })?;

        let stdin = child.stdin.take().ok_or(ConnectionError::ChannelClosed)?;
        let stdout = child.stdout.take().ok_or(ConnectionError::ChannelClosed)?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let (outgoing, mut outgoing_rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = outgoing_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err()
                    || stdin.write_all(b"\n").await.is_err()
                    || stdin.flush().await.is_err()
                {
                    break;
                }
            }
        });

        let pending_for_reader = Arc::clone(&pending);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            // next_line is strict UTF-8; a malformed line ends the loop.
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                let resp: Response = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::debug!("skipping unparseable stdout line: {e}");
                        continue;
                    }
                };
                if let Some(id) = resp.id {
                    if let Some(tx) = pending_for_reader.lock().await.remove(&id) {
                        let _ = tx.send(resp);
                    }
                }
                // Server-initiated notifications (no id) are ignored.
            }
        });

        Ok(Self {
            next_id: AtomicU64::new(1),
            outgoing,
            pending,
            reader,
            writer,
            child: Arc::new(Mutex::new(child)),
            read_timeout: config.read_timeout(),
        })
    }

    /// Send a request and wait for the matching response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<Response, ConnectionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&Request::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.outgoing.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(ConnectionError::ChannelClosed);
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

    /// Send a notification; no response is expected.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), ConnectionError> {
        let line = serde_json::to_string(&Notification::new(method, params))?;
        self.outgoing
            .send(line)
            .await
            .map_err(|_| ConnectionError::ChannelClosed)
    }

    /// Release the channel: EOF the child's stdin, give it a moment to
    /// exit on its own, then kill it.
    pub async fn close(self) {
        drop(self.outgoing);

        let child = self.child;
        let graceful = tokio::time::timeout(Duration::from_secs(5), async {
            let _ = child.lock().await.wait().await;
        })
        .await;

        if graceful.is_err() {
            let _ = child.lock().await.kill().await;
        }

        self.reader.abort();
        self.writer.abort();
    }
}

//! Server registry: known servers, their configs, and capability
//! snapshots.
//!
//! Per server name the lifecycle is `Unregistered → Connected →
//! Disconnected → Unregistered` (re-addable). No connecting state is
//! ever persisted: an add either fully succeeds and stores a record, or
//! fully fails and leaves whatever was there before untouched.

use crate::channel::ScopedChannel;
use crate::config::{ServerConfig, TransportKind};
use crate::discovery::{Capabilities, discover};
use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, SemaphorePermit};

/// How many channels may be opening or in use at once, across adds,
/// health checks, and tool calls. Excess operations queue.
const DEFAULT_CHANNEL_LIMIT: usize = 10;

/// One registered server.
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub config: ServerConfig,
    /// Snapshot from the last successful discovery; never refreshed
    /// automatically. `health_check` re-validates liveness without
    /// re-discovering.
    pub capabilities: Capabilities,
    /// Cleared by a failed health check or invocation; never retried
    /// automatically.
    pub connected: bool,
    /// Last successful discovery or health check.
    pub last_checked: DateTime<Utc>,
}

/// Read-only snapshot of a record for callers outside the core.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfoView {
    pub name: String,
    pub transport: TransportKind,
    pub connected: bool,
    pub tools: Vec<String>,
    pub resources: Vec<String>,
    pub prompts: Vec<String>,
    pub last_checked: DateTime<Utc>,
}

/// Tracks known servers and orchestrates add/remove/health-check.
///
/// No channel outlives the operation that opened it; the registry holds
/// configs and snapshots, never live connections.
pub struct ServerRegistry {
    records: RwLock<HashMap<String, ServerRecord>>,
    permits: Semaphore,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::with_channel_limit(DEFAULT_CHANNEL_LIMIT)
    }

    /// Registry with a custom bound on concurrent channel opens.
    pub fn with_channel_limit(limit: usize) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            permits: Semaphore::new(limit),
        }
    }

    pub(crate) async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        // acquire only fails on a closed semaphore; this one never is.
        self.permits.acquire().await.ok()
    }

    /// Validate the config, open a transient channel, discover the
    /// server's capabilities, and store the record.
    ///
    /// A successful re-add of an existing name overwrites its record.
    /// On any failure the prior record for that name is left untouched
    /// and the channel is released before returning.
    pub async fn add_server(&self, config: ServerConfig) -> Result<(), RegistryError> {
        config.validate()?;

        let _permit = self.permit().await;
        let channel = ScopedChannel::open(&config).await?;
        let outcome = discover(&channel).await;
        channel.close().await;
        let capabilities = outcome?;

        let name = config.name.clone();
        let record = ServerRecord {
            config,
            capabilities,
            connected: true,
            last_checked: Utc::now(),
        };

        tracing::info!(
            server = %name,
            tools = record.capabilities.tools.len(),
            resources = record.capabilities.resources.len(),
            prompts = record.capabilities.prompts.len(),
            "registered server"
        );

        self.records.write().await.insert(name, record);
        Ok(())
    }

    /// Delete a server's record. There is no live channel to close —
    /// none is ever held between operations.
    pub async fn remove_server(&self, name: &str) -> Result<(), RegistryError> {
        match self.records.write().await.remove(name) {
            Some(_) => {
                tracing::info!(server = %name, "removed server");
                Ok(())
            }
            None => Err(RegistryError::ServerNotFound {
                name: name.to_string(),
            }),
        }
    }

    /// Snapshot view of one server; `None` if unregistered.
    pub async fn get_info(&self, name: &str) -> Option<ServerInfoView> {
        let records = self.records.read().await;
        records.get(name).map(|record| ServerInfoView {
            name: record.config.name.clone(),
            transport: record.config.transport,
            connected: record.connected,
            tools: record
                .capabilities
                .tools
                .iter()
                .map(|t| t.name.clone())
                .collect(),
            resources: record
                .capabilities
                .resources
                .iter()
                .map(|r| r.uri.clone())
                .collect(),
            prompts: record
                .capabilities
                .prompts
                .iter()
                .map(|p| p.name.clone())
                .collect(),
            last_checked: record.last_checked,
        })
    }

    /// Registered server names, sorted for stable output.
    pub async fn list_servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Probe liveness by re-issuing only the tool listing over a fresh
    /// channel. Success refreshes `last_checked`; failure flips
    /// `connected` off but keeps the record so an operator can inspect
    /// and retry.
    pub async fn health_check(&self, name: &str) -> bool {
        let Some(config) = self.config_snapshot(name).await else {
            return false;
        };

        let _permit = self.permit().await;
        let probe = async {
            let channel = ScopedChannel::open(&config).await?;
            let outcome = channel.list_tools().await;
            channel.close().await;
            outcome
        };

        match probe.await {
            Ok(_) => {
                let mut records = self.records.write().await;
                if let Some(record) = records.get_mut(name) {
                    record.connected = true;
                    record.last_checked = Utc::now();
                }
                true
            }
            Err(e) => {
                tracing::warn!(server = %name, "health check failed: {e}");
                self.mark_disconnected(name).await;
                false
            }
        }
    }

    /// [`health_check`] bounded by a caller-supplied deadline; expiry
    /// counts as failure and still marks the server disconnected.
    ///
    /// [`health_check`]: ServerRegistry::health_check
    pub async fn health_check_with_deadline(&self, name: &str, deadline: Duration) -> bool {
        match tokio::time::timeout(deadline, self.health_check(name)).await {
            Ok(alive) => alive,
            Err(_) => {
                self.mark_disconnected(name).await;
                false
            }
        }
    }

    /// Config copy for a registered server, disconnected or not.
    pub(crate) async fn config_snapshot(&self, name: &str) -> Option<ServerConfig> {
        self.records
            .read()
            .await
            .get(name)
            .map(|record| record.config.clone())
    }

    /// Config copy for a server that must be registered and connected;
    /// the error message distinguishes the two precondition failures.
    pub(crate) async fn connected_config(&self, name: &str) -> Result<ServerConfig, String> {
        let records = self.records.read().await;
        match records.get(name) {
            None => Err(format!("server '{name}' not found")),
            Some(record) if !record.connected => Err(format!("server '{name}' is not connected")),
            Some(record) => Ok(record.config.clone()),
        }
    }

    pub(crate) async fn mark_disconnected(&self, name: &str) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(name) {
            record.connected = false;
        }
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, ConnectionError};

    #[tokio::test]
    async fn add_server_rejects_invalid_config_before_io() {
        let registry = ServerRegistry::new();
        let mut config = ServerConfig::stdio("calc", "");
        config.command = None;

        match registry.add_server(config).await {
            Err(RegistryError::Config(ConfigError::MissingField { field, .. })) => {
                assert_eq!(field, "command");
            }
            other => panic!("expected config error, got {other:?}"),
        }
        assert!(registry.list_servers().await.is_empty());
    }

    #[tokio::test]
    async fn add_server_spawn_failure_leaves_no_record() {
        let registry = ServerRegistry::new();
        let config = ServerConfig::stdio("ghost", "no_such_binary_qq51");

        match registry.add_server(config).await {
            Err(RegistryError::Connection(ConnectionError::SpawnFailed { .. })) => {}
            other => panic!("expected spawn failure, got {other:?}"),
        }
        assert!(registry.get_info("ghost").await.is_none());
    }

    #[tokio::test]
    async fn remove_unregistered_server_is_not_found() {
        let registry = ServerRegistry::new();
        match registry.remove_server("absent").await {
            Err(RegistryError::ServerNotFound { name }) => assert_eq!(name, "absent"),
            other => panic!("expected ServerNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_check_unknown_server_is_false_without_io() {
        let registry = ServerRegistry::new();
        assert!(!registry.health_check("absent").await);
    }

    #[tokio::test]
    async fn get_info_on_empty_registry_is_none() {
        let registry = ServerRegistry::new();
        assert!(registry.get_info("anything").await.is_none());
        assert!(registry.list_servers().await.is_empty());
    }
}

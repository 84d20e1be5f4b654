//! In-memory, TTL-expiring conversation store.
//!
//! Two lock levels: an outer map lock for session lookup and
//! create/evict, and a per-session inner lock serializing appends.
//! Every path takes them outer-then-inner. The sweeper only evicts
//! sessions whose inner lock it can take without waiting, so an
//! in-flight append is never torn and readers never observe a
//! partially-cleared history.

use crate::error::SessionError;
use crate::types::{SessionMessage, SessionSummary};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Idle time after which a session may be evicted.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

struct SessionState {
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    idle_since: Instant,
    messages: Vec<SessionMessage>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            last_activity: Utc::now(),
            idle_since: Instant::now(),
            messages: Vec::new(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
        self.idle_since = Instant::now();
    }
}

type SessionSlot = Arc<Mutex<SessionState>>;

/// Keyed store of per-conversation message history.
///
/// Sessions are created lazily on first reference and destroyed by
/// explicit [`clear`] or by [`sweep`] once idle past the TTL.
///
/// [`clear`]: SessionStore::clear
/// [`sweep`]: SessionStore::sweep
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch or lazily create the slot for `session_id`.
    async fn slot(&self, session_id: &str) -> SessionSlot {
        let mut sessions = self.sessions.lock().await;
        Arc::clone(
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SessionState::new()))),
        )
    }

    /// Append one message, creating the session if absent.
    pub async fn append(&self, session_id: &str, message: SessionMessage) {
        let slot = self.slot(session_id).await;
        let mut state = slot.lock().await;
        state.messages.push(message);
        state.touch();
    }

    /// Full history in insertion order, creating the session if absent.
    /// Reading counts as activity for TTL purposes.
    pub async fn read(&self, session_id: &str) -> Vec<SessionMessage> {
        let slot = self.slot(session_id).await;
        let mut state = slot.lock().await;
        state.touch();
        state.messages.clone()
    }

    /// The last `n` messages, oldest first.
    pub async fn read_recent(&self, session_id: &str, n: usize) -> Vec<SessionMessage> {
        let slot = self.slot(session_id).await;
        let mut state = slot.lock().await;
        state.touch();
        let skip = state.messages.len().saturating_sub(n);
        state.messages[skip..].to_vec()
    }

    /// Destroy a session outright.
    pub async fn clear(&self, session_id: &str) -> Result<(), SessionError> {
        match self.sessions.lock().await.remove(session_id) {
            Some(_) => Ok(()),
            None => Err(SessionError::SessionNotFound {
                id: session_id.to_string(),
            }),
        }
    }

    /// Summaries of all live sessions, most recently active first.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        let mut summaries = Vec::with_capacity(sessions.len());
        for (id, slot) in sessions.iter() {
            let state = slot.lock().await;
            summaries.push(SessionSummary {
                session_id: id.clone(),
                created_at: state.created_at,
                last_activity: state.last_activity,
                message_count: state.messages.len(),
            });
        }
        summaries.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        summaries
    }

    /// Evict every session idle for at least the TTL; returns how many
    /// were removed. A session whose inner lock is held (an append in
    /// flight) is skipped until the next sweep.
    pub async fn sweep(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let mut expired = Vec::new();

        for (id, slot) in sessions.iter() {
            if let Ok(state) = slot.try_lock() {
                if state.idle_since.elapsed() >= self.ttl {
                    expired.push(id.clone());
                }
            }
        }

        for id in &expired {
            sessions.remove(id);
            tracing::debug!(session = %id, "evicted idle session");
        }

        expired.len()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Error types for the session store.

use thiserror::Error;

/// Errors from session store operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{id}' not found")]
    SessionNotFound { id: String },
}

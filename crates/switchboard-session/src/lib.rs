//! Conversation session tracking with TTL eviction.
//!
//! Keyed, concurrency-safe message history for many simultaneous
//! callers. Message content is opaque data; the store owns ordering,
//! activity tracking, and idle eviction, nothing else.

pub mod error;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use store::{DEFAULT_TTL, SessionStore};
pub use types::{SessionMessage, SessionSummary};

//! Session persistence: a keyed mapping from session id to a [`Context`]
//! plus [`SessionMetadata`], backed by an in-memory store or Redis.
//!
//! Grounded on `original_source/agent_cores/core/redis_context_manager.py`
//! (`RedisContextManager`, its key layout and `to_redis_dict`/
//! `from_redis_dict` round-trip) for the Redis backend, generalized to a
//! shared [`SessionStore`] trait so the Agent Runtime doesn't care which
//! backend is configured (spec §4.3).
//!
//! [`Context`]: crate::context::Context

mod access;
mod bridge;
mod memory;
mod redis_store;
mod types;

pub use access::SessionAccessPolicy;
pub use bridge::SessionBridge;
pub use memory::InMemorySessionStore;
pub use redis_store::RedisSessionStore;
pub use types::{Session, SessionMetadata, SessionStatus, SessionStoreStats};

use crate::context::Context;
use crate::types::Message;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Shared interface implemented by every session backend (spec §4.3):
/// `create`, `load`, `save`, `delete`, `list`, `append_message`,
/// `update_metadata`, `clear_messages`, `touch`, `statistics`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates and persists a fresh, empty session bound to `owner_id`.
    async fn create(&self, session_id: &str, owner_id: &str, user_name: &str, now: u64) -> Result<Session>;

    /// Loads a session, or `None` if it does not exist (including if it
    /// expired and was swept).
    async fn load(&self, session_id: &str) -> Result<Option<Session>>;

    /// Persists a session's full current state.
    async fn save(&self, session: &Session) -> Result<()>;

    /// Removes a session entirely.
    async fn delete(&self, session_id: &str) -> Result<()>;

    /// Lists session ids, optionally filtered by owner, tag, or status.
    async fn list(
        &self,
        owner_id: Option<&str>,
        tag: Option<&str>,
        status: Option<SessionStatus>,
    ) -> Result<Vec<String>>;

    /// Appends a message to a session's context and updates its
    /// derived metadata (`message_count`, `token_count`).
    async fn append_message(&self, session_id: &str, message: Message, now: u64) -> Result<()>;

    /// Merges `updates` into a session's metadata properties.
    async fn update_metadata(
        &self,
        session_id: &str,
        updates: HashMap<String, serde_json::Value>,
    ) -> Result<()>;

    /// Clears a session's message history, leaving metadata intact.
    async fn clear_messages(&self, session_id: &str) -> Result<()>;

    /// Refreshes a session's TTL/`last_accessed_at` without otherwise
    /// touching it.
    async fn touch(&self, session_id: &str, now: u64) -> Result<()>;

    /// Aggregate counts for observability.
    async fn statistics(&self) -> Result<SessionStoreStats>;
}

/// Convenience used by both backends to build a fresh [`Context`] for a
/// newly created session.
pub(crate) fn fresh_context(owner_id: &str, user_name: &str, now: u64) -> Context {
    Context::new(owner_id, user_name, now, 20, 10_000)
}

//! Session metadata types shared by every backend.

use crate::context::{estimate_tokens, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle state of a session (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Ended,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// Everything about a session except its conversation history — the
/// part the access-control policy and listing queries reason about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub created_at: u64,
    pub last_accessed_at: u64,
    pub expires_at: u64,
    pub status: SessionStatus,
    pub tags: Vec<String>,
    pub properties: HashMap<String, serde_json::Value>,
    pub message_count: usize,
    pub token_count: usize,
    pub turn_count: usize,
    pub owner_id: String,
    pub shared_with: Vec<String>,
    pub is_public: bool,
}

impl SessionMetadata {
    pub fn new(owner_id: impl Into<String>, now: u64, ttl_secs: u64) -> Self {
        Self {
            created_at: now,
            last_accessed_at: now,
            expires_at: now + ttl_secs,
            status: SessionStatus::Active,
            tags: Vec::new(),
            properties: HashMap::new(),
            message_count: 0,
            token_count: 0,
            turn_count: 0,
            owner_id: owner_id.into(),
            shared_with: Vec::new(),
            is_public: false,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn refresh_ttl(&mut self, now: u64, ttl_secs: u64) {
        self.last_accessed_at = now;
        self.expires_at = now + ttl_secs;
    }
}

/// A session: one [`Context`] plus its [`SessionMetadata`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub context: Context,
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new(session_id: impl Into<String>, context: Context, metadata: SessionMetadata) -> Self {
        Self {
            session_id: session_id.into(),
            context,
            metadata,
        }
    }

    /// Recomputes `message_count`/`token_count` from the current context.
    /// Called after every mutation so the derived fields never drift.
    pub fn refresh_derived_counts(&mut self) {
        self.metadata.message_count = self.context.messages.len();
        self.metadata.token_count = estimate_tokens(&self.context.messages);
    }
}

/// Aggregate counts returned by [`super::SessionStore::statistics`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStoreStats {
    pub total_sessions: usize,
    pub active_sessions: usize,
}

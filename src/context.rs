//! The per-turn dependency-injection record.
//!
//! The original system defined `SimpleContext`, `AgentContext`, a
//! `RunContextWrapper`, a Redis-specific `AgentContext`, and a
//! `SessionContext` — five variants of the same idea. This module collapses
//! them to one [`Context`] type; [`crate::session::bridge`] is the sole
//! place that maps between a stored [`crate::session::Session`] and this
//! in-memory form.
//!
//! Token estimation and manual truncation helpers are adapted from the
//! teacher crate's character-based approximation, now operating on
//! [`Context::messages`] instead of a bare `Vec<Message>` parameter.

use crate::types::{ContentBlock, Message, MessageRole, TextBlock};
use std::collections::{HashMap, HashSet};

/// Suffix appended to any message content truncated to fit the per-message
/// content cap (spec default 10 000 characters).
pub const TRUNCATION_SUFFIX: &str = "…(truncated)";

/// The per-turn in-memory record of user identity, message history,
/// metadata, and permissions.
///
/// `Context` is mutable: the runtime appends the user's input and the
/// model's output to it as a turn progresses, then the bridge persists it
/// back to the session store.
#[derive(Debug, Clone)]
pub struct Context {
    /// Stable identifier for the user driving this turn.
    pub user_id: String,
    /// Display name for the user, used in the synthesized system prompt.
    pub user_name: String,
    /// Session this context is bound to, if any. `None` until the runtime
    /// allocates or resolves one.
    pub session_id: Option<String>,
    /// Ordered conversation history. Invariant: at most one `System`
    /// message, and if present it is always at index 0.
    pub messages: Vec<Message>,
    /// Arbitrary metadata (preferences, language, role hints, …).
    pub metadata: HashMap<String, serde_json::Value>,
    /// Permission tags granted to this caller for this turn.
    pub permissions: HashSet<String>,
    /// Role tags granted to this caller for this turn.
    pub roles: HashSet<String>,
    /// UNIX seconds this context was created.
    pub created_at: u64,
    /// UNIX seconds of the most recent activity.
    pub last_active: u64,
    /// Maximum messages retained; overflow evicts the oldest non-system
    /// message first (FIFO).
    pub max_messages: usize,
    /// Maximum characters retained per message before truncation.
    pub max_content_length: usize,
}

impl Context {
    /// Creates a fresh context for `user_id` at `now` (UNIX seconds), using
    /// the runtime's configured history bounds.
    pub fn new(
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        now: u64,
        max_messages: usize,
        max_content_length: usize,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            session_id: None,
            messages: Vec::new(),
            metadata: HashMap::new(),
            permissions: HashSet::new(),
            roles: HashSet::new(),
            created_at: now,
            last_active: now,
            max_messages,
            max_content_length,
        }
    }

    /// Appends a message, truncating its rendered text content to
    /// `max_content_length` (with [`TRUNCATION_SUFFIX`]) and then enforcing
    /// `max_messages` by evicting the oldest non-system message.
    ///
    /// The system message, if present, is always kept at index 0 and is
    /// never evicted by this path — only [`Context::set_system_message`]
    /// replaces it.
    pub fn append_message(&mut self, mut message: Message, now: u64) {
        message = self.truncate_message_content(message);
        self.last_active = now;

        if message.role == MessageRole::System {
            if self.messages.first().map(|m| m.role) == Some(MessageRole::System) {
                self.messages[0] = message;
            } else {
                self.messages.insert(0, message);
            }
            self.enforce_bound();
            return;
        }

        self.messages.push(message);
        self.enforce_bound();
    }

    /// Replaces the system message (inserting at index 0 if absent).
    pub fn set_system_message(&mut self, text: impl Into<String>, now: u64) {
        self.append_message(Message::system(text, now), now);
    }

    fn truncate_message_content(&self, message: Message) -> Message {
        let rendered = message.text_content();
        if rendered.chars().count() <= self.max_content_length {
            return message;
        }

        let truncated: String = rendered.chars().take(self.max_content_length).collect();
        let mut new_text = truncated;
        new_text.push_str(TRUNCATION_SUFFIX);

        Message {
            role: message.role,
            content: vec![ContentBlock::Text(TextBlock::new(new_text))],
            timestamp: message.timestamp,
            truncated: true,
        }
    }

    fn enforce_bound(&mut self) {
        if self.messages.len() <= self.max_messages {
            return;
        }

        let has_system = self.messages.first().map(|m| m.role) == Some(MessageRole::System);
        let keep_from = if has_system { 1 } else { 0 };

        while self.messages.len() > self.max_messages {
            // Evict the oldest non-system message (FIFO).
            self.messages.remove(keep_from);
        }
    }

    /// Returns all non-system messages, in arrival order — the slice the
    /// Agent Runtime sends to the model.
    pub fn non_system_messages(&self) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .collect()
    }

    /// True iff `permission` is present among this context's permissions.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Estimate token count for a message list.
///
/// Character-based approximation (1 token ≈ 4 characters); see module docs
/// on [`Context`] for provenance. This is intentionally conservative and
/// model-family agnostic — always include a safety margin when checking
/// limits (see [`is_approaching_limit`]).
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;

    for message in messages {
        total_chars += 8; // role formatting overhead

        for block in &message.content {
            match block {
                ContentBlock::Text(text) => total_chars += text.text.len(),
                ContentBlock::ToolUse(tool) => {
                    total_chars += tool.name.len();
                    total_chars += tool.id.len();
                    total_chars += tool.input.to_string().len();
                }
                ContentBlock::ToolResult(result) => {
                    total_chars += result.tool_use_id.len();
                    total_chars += result.content.to_string().len();
                }
            }
        }
    }

    total_chars += 16; // conversation-level overhead

    (total_chars + 3) / 4
}

/// Truncate message history, keeping recent messages and (optionally) the
/// system prompt. A manual utility — the runtime's own bound enforcement
/// (see [`Context::append_message`]) is what actually runs during a turn.
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system = preserve_system && messages[0].role == MessageRole::System;

    if has_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start.max(1)..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

/// Convenience check combining [`estimate_tokens`] with a safety margin.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}

/// Metadata keys surfaced in the synthesized "User info:" block (spec
/// §4.1 step 4). Anything else in [`Context::metadata`] is withheld from
/// the model.
pub const USER_INFO_METADATA_WHITELIST: &[&str] =
    &["preference", "language", "role", "permission_level"];

/// Builds the fixed-format "User info:" block appended to every turn's
/// synthesized system message, and prepended by [`crate::session::SessionBridge`]
/// on every context retrieval (spec §4.1, §4.3).
pub fn build_user_info_block(user_id: &str, user_name: &str, metadata: &HashMap<String, serde_json::Value>) -> String {
    let mut lines = vec![
        "User info:".to_string(),
        format!("- user_id: {user_id}"),
        format!("- user_name: {user_name}"),
    ];

    for key in USER_INFO_METADATA_WHITELIST {
        if let Some(value) = metadata.get(*key) {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("- {key}: {rendered}"));
        }
    }

    lines.join("\n")
}

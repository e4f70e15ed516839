//! Core type definitions shared across the runtime.
//!
//! This module holds the conversation data model (messages and content
//! blocks) plus a handful of validated newtypes used when describing a
//! model reference inside an [`AgentTemplate`](crate::template::AgentTemplate).
//! Everything here is plain data: no I/O, no async, no knowledge of how a
//! turn is executed.

use crate::Error;
use serde::{Deserialize, Serialize};

// ============================================================================
// NEWTYPE WRAPPERS FOR COMPILE-TIME TYPE SAFETY
// ============================================================================

/// Validated model name with compile-time type safety.
///
/// # Validation Rules
///
/// - Must not be empty
/// - Must not be only whitespace
///
/// # Example
///
/// ```
/// use agent_orchestrator::ModelName;
///
/// let model = ModelName::new("gpt-4o-mini").unwrap();
/// assert_eq!(model.as_str(), "gpt-4o-mini");
/// assert!(ModelName::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelName(String);

impl ModelName {
    /// Creates a new `ModelName` after validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is empty or contains only whitespace.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(Error::invalid_input(
                "model name cannot be empty or whitespace",
            ));
        }

        Ok(ModelName(name))
    }

    /// Returns the model name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `ModelName` and returns the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ModelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated base URL for a model provider.
///
/// # Validation Rules
///
/// - Must not be empty
/// - Must start with `http://` or `https://`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Creates a new `BaseUrl` after validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is empty or doesn't start with http:// or https://.
    pub fn new(url: impl Into<String>) -> crate::Result<Self> {
        let url = url.into();
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(Error::invalid_input("base_url cannot be empty"));
        }

        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(Error::invalid_input(
                "base_url must start with http:// or https://",
            ));
        }

        Ok(BaseUrl(url))
    }

    /// Returns the base URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated sampling temperature.
///
/// # Validation Rules
///
/// - Must be between 0.0 and 2.0 (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Temperature(f32);

impl Temperature {
    /// Creates a new `Temperature` after validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the temperature is not between 0.0 and 2.0 (inclusive).
    pub fn new(temp: f32) -> crate::Result<Self> {
        if !(0.0..=2.0).contains(&temp) {
            return Err(Error::invalid_input(
                "temperature must be between 0.0 and 2.0",
            ));
        }

        Ok(Temperature(temp))
    }

    /// Returns the temperature value.
    pub fn value(&self) -> f32 {
        self.0
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// MESSAGE SYSTEM
// ============================================================================

/// Who sent a message.
///
/// Mirrors the roles an OpenAI-compatible chat API recognizes, plus `Tool`
/// for results handed back after a tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Establishes agent behavior and context. At most one per conversation,
    /// always at index 0 when present.
    System,
    /// Input from the human or the calling application.
    User,
    /// Response produced by the model.
    Assistant,
    /// Result of a tool execution, handed back to the model.
    Tool,
}

/// Multi-modal content blocks that can appear in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text(TextBlock),
    /// Request from the model to execute a tool.
    ToolUse(ToolUseBlock),
    /// Result of a tool execution sent back to the model.
    ToolResult(ToolResultBlock),
}

/// Plain text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    /// The text content.
    pub text: String,
}

impl TextBlock {
    /// Creates a new text block from any string-like type.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A tool invocation the model asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    /// Unique identifier for this tool call, used to correlate the result.
    pub id: String,
    /// Name of the tool to execute.
    pub name: String,
    /// JSON parameters to pass to the tool.
    pub input: serde_json::Value,
}

impl ToolUseBlock {
    /// Creates a new tool use block.
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The result of executing a tool, to be handed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    /// ID of the [`ToolUseBlock`] this result corresponds to.
    pub tool_use_id: String,
    /// JSON result of the tool execution.
    pub content: serde_json::Value,
}

impl ToolResultBlock {
    /// Creates a new tool result block.
    pub fn new(tool_use_id: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content,
        }
    }
}

/// A complete message in a conversation.
///
/// Beyond role and content, every message carries the UNIX timestamp it was
/// appended at and a `truncated` flag set when the message's content was
/// shortened to fit the per-message length cap, or when the message was
/// persisted mid-turn after a cancellation or timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The role/sender of this message.
    pub role: MessageRole,
    /// The content blocks that make up this message.
    pub content: Vec<ContentBlock>,
    /// UNIX seconds this message was appended.
    pub timestamp: u64,
    /// Set when this message's content was shortened or the turn that
    /// produced it was cancelled/timed out before completion.
    #[serde(default)]
    pub truncated: bool,
}

impl Message {
    /// Creates a new message with the specified role and content, stamped
    /// with `timestamp`.
    pub fn new(role: MessageRole, content: Vec<ContentBlock>, timestamp: u64) -> Self {
        Self {
            role,
            content,
            timestamp,
            truncated: false,
        }
    }

    /// Creates a user message with simple text content.
    pub fn user(text: impl Into<String>, timestamp: u64) -> Self {
        Self::new(MessageRole::User, vec![ContentBlock::Text(TextBlock::new(text))], timestamp)
    }

    /// Creates an assistant message with the specified content blocks.
    pub fn assistant(content: Vec<ContentBlock>, timestamp: u64) -> Self {
        Self::new(MessageRole::Assistant, content, timestamp)
    }

    /// Creates a system message with simple text content.
    pub fn system(text: impl Into<String>, timestamp: u64) -> Self {
        Self::new(MessageRole::System, vec![ContentBlock::Text(TextBlock::new(text))], timestamp)
    }

    /// Creates a tool-result message.
    pub fn tool_result(tool_use_id: impl Into<String>, content: serde_json::Value, timestamp: u64) -> Self {
        Self::new(
            MessageRole::Tool,
            vec![ContentBlock::ToolResult(ToolResultBlock::new(tool_use_id, content))],
            timestamp,
        )
    }

    /// Renders this message's content as a single string, concatenating
    /// text blocks and summarizing non-text blocks. Used by truncation and
    /// token estimation, which operate on a flattened view of the message.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            match block {
                ContentBlock::Text(t) => out.push_str(&t.text),
                ContentBlock::ToolUse(t) => {
                    out.push_str(&format!("[tool_use:{}]", t.name));
                }
                ContentBlock::ToolResult(_) => out.push_str("[tool_result]"),
            }
        }
        out
    }

    /// Marks this message as truncated.
    pub fn mark_truncated(mut self) -> Self {
        self.truncated = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_validation() {
        assert!(ModelName::new("gpt-4o").is_ok());
        assert!(ModelName::new("").is_err());
        assert!(ModelName::new("   ").is_err());
    }

    #[test]
    fn test_base_url_validation() {
        assert!(BaseUrl::new("https://api.openai.com/v1").is_ok());
        assert!(BaseUrl::new("localhost:1234").is_err());
        assert!(BaseUrl::new("").is_err());
    }

    #[test]
    fn test_temperature_validation() {
        assert!(Temperature::new(0.0).is_ok());
        assert!(Temperature::new(2.0).is_ok());
        assert!(Temperature::new(-0.1).is_err());
        assert!(Temperature::new(2.1).is_err());
    }

    #[test]
    fn test_message_text_content() {
        let msg = Message::user("hello", 0);
        assert_eq!(msg.text_content(), "hello");
    }

    #[test]
    fn test_message_mark_truncated() {
        let msg = Message::user("hello", 0).mark_truncated();
        assert!(msg.truncated);
    }

    #[test]
    fn test_system_message_role() {
        let msg = Message::system("be helpful", 0);
        assert_eq!(msg.role, MessageRole::System);
    }
}

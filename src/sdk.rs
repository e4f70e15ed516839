//! The model-invocation seam: [`AgentSdk`] is the boundary between this
//! crate's orchestration (sessions, handoffs, security) and whatever
//! actually talks to a model provider.
//!
//! The teacher crate's `client::query`/`Client` hit an OpenAI-compatible
//! HTTP endpoint directly via `reqwest`. That concrete transport isn't
//! part of what this crate's specification covers — the orchestration
//! layer needs to *call* a model, not implement a wire protocol for one
//! — so the concrete `reqwest`-based streaming client is replaced here
//! with a trait seam, following the same `Arc<dyn Fn>`/async-trait
//! pattern the teacher uses for [`crate::tools::ToolHandler`] and
//! [`crate::hooks::Hooks`]. Production callers implement [`AgentSdk`]
//! against their own provider integration (an adapted version of the
//! teacher's `client.rs` is one valid implementation); this crate ships
//! only [`FakeAgentSdk`], a deterministic scripted double used by the
//! runtime's own tests.

use crate::handoff::HandoffDescriptor;
use crate::template::ToolSpec;
use crate::types::{ContentBlock, Message, TextBlock, ToolUseBlock};
use crate::Result;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;

/// One increment of a streamed turn, mirroring the wire envelope (spec
/// §6): `content` deltas concatenate in arrival order to reconstruct
/// the full response; `ToolCall`/`ToolResult` surface tool activity;
/// `Done`/`Error`/`Cancelled` are terminal.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    Content(String),
    ToolCall(ToolUseBlock),
    ToolResult { tool_use_id: String, content: serde_json::Value },
    Done,
    Error(String),
    Cancelled,
}

pub type TurnEventStream = Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send>>;

/// The non-streaming result of one model invocation: the assistant's
/// content blocks, ready to append to the context.
#[derive(Debug, Clone)]
pub struct AgentRunOutcome {
    pub content: Vec<ContentBlock>,
}

impl AgentRunOutcome {
    /// Convenience constructor for a plain-text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text(TextBlock::new(text))],
        }
    }

    /// Concatenated text content, ignoring tool-use/tool-result blocks
    /// — the `output` field of a turn record (spec §4.1).
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// An agent configuration capable of running a turn against some model
/// provider. Implementations own whatever transport/credentials they
/// need; this crate only depends on the shape below.
#[async_trait]
pub trait AgentSdk: Send + Sync {
    fn name(&self) -> &str;
    fn instructions(&self) -> &str;
    fn tools(&self) -> &[ToolSpec];
    fn handoffs(&self) -> &[HandoffDescriptor];

    /// Returns a new agent with the given overrides applied, leaving
    /// anything not overridden as this agent's current value — the
    /// same "clone with overrides" shape the teacher's `AgentOptions`
    /// builder uses for per-call overrides, generalized here to whole
    /// agent identity so the Cooperation Service's triage agent can be
    /// built from an expert's configuration (spec §4.5).
    fn clone_with(
        &self,
        instructions: Option<String>,
        tools: Option<Vec<ToolSpec>>,
        handoffs: Option<Vec<HandoffDescriptor>>,
    ) -> Arc<dyn AgentSdk>;

    /// Runs one turn to completion and returns the full result.
    async fn run(&self, messages: &[Message]) -> Result<AgentRunOutcome>;

    /// Runs one turn, yielding incremental [`TurnEvent`]s as they
    /// become available.
    async fn run_streamed(&self, messages: &[Message]) -> Result<TurnEventStream>;
}

/// A deterministic, scriptable [`AgentSdk`] double. Each call to
/// [`FakeAgentSdk::run`]/`run_streamed` pops the next scripted
/// [`AgentRunOutcome`] (or replays the last one forever, if
/// `repeat_last` is set) — there is no real model behind it.
///
/// This is the only concrete [`AgentSdk`] implementation this crate
/// ships; it exists so the runtime and cooperation modules have
/// something to run their pipeline against in tests.
pub struct FakeAgentSdk {
    name: String,
    instructions: String,
    tools: Vec<ToolSpec>,
    handoffs: Vec<HandoffDescriptor>,
    script: std::sync::Mutex<std::collections::VecDeque<AgentRunOutcome>>,
    repeat_last: bool,
}

impl FakeAgentSdk {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            script: std::sync::Mutex::new(std::collections::VecDeque::new()),
            repeat_last: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_handoffs(mut self, handoffs: Vec<HandoffDescriptor>) -> Self {
        self.handoffs = handoffs;
        self
    }

    /// Queues `outcome` to be returned by the next `run`/`run_streamed`
    /// call. Calls beyond the queued outcomes return the last queued
    /// outcome if `repeat_last` was set, and otherwise a generic
    /// placeholder reply.
    pub fn push_outcome(self, outcome: AgentRunOutcome) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    fn next_outcome(&self) -> AgentRunOutcome {
        let mut script = self.script.lock().unwrap();
        if self.repeat_last {
            let front = script.front().cloned();
            if let Some(outcome) = front {
                return outcome;
            }
        } else if let Some(outcome) = script.pop_front() {
            return outcome;
        }
        AgentRunOutcome::text(format!("[{}] no scripted reply", self.name))
    }
}

#[async_trait]
impl AgentSdk for FakeAgentSdk {
    fn name(&self) -> &str {
        &self.name
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    fn handoffs(&self) -> &[HandoffDescriptor] {
        &self.handoffs
    }

    fn clone_with(
        &self,
        instructions: Option<String>,
        tools: Option<Vec<ToolSpec>>,
        handoffs: Option<Vec<HandoffDescriptor>>,
    ) -> Arc<dyn AgentSdk> {
        Arc::new(FakeAgentSdk {
            name: self.name.clone(),
            instructions: instructions.unwrap_or_else(|| self.instructions.clone()),
            tools: tools.unwrap_or_else(|| self.tools.clone()),
            handoffs: handoffs.unwrap_or_else(|| self.handoffs.clone()),
            script: std::sync::Mutex::new(self.script.lock().unwrap().clone()),
            repeat_last: self.repeat_last,
        })
    }

    async fn run(&self, _messages: &[Message]) -> Result<AgentRunOutcome> {
        Ok(self.next_outcome())
    }

    async fn run_streamed(&self, _messages: &[Message]) -> Result<TurnEventStream> {
        let outcome = self.next_outcome();
        let text = outcome.text_content();
        let events: Vec<Result<TurnEvent>> = vec![Ok(TurnEvent::Content(text)), Ok(TurnEvent::Done)];
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_fake_sdk_returns_scripted_outcome() {
        let sdk = FakeAgentSdk::new("assistant", "be helpful")
            .push_outcome(AgentRunOutcome::text("hello there"));

        let outcome = sdk.run(&[]).await.unwrap();
        assert_eq!(outcome.text_content(), "hello there");
    }

    #[tokio::test]
    async fn test_fake_sdk_default_reply_when_script_empty() {
        let sdk = FakeAgentSdk::new("assistant", "be helpful");
        let outcome = sdk.run(&[]).await.unwrap();
        assert!(outcome.text_content().contains("no scripted reply"));
    }

    #[tokio::test]
    async fn test_fake_sdk_streamed_emits_content_then_done() {
        let sdk = FakeAgentSdk::new("assistant", "be helpful")
            .push_outcome(AgentRunOutcome::text("streamed text"));

        let mut stream = sdk.run_streamed(&[]).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert!(matches!(first, TurnEvent::Content(ref s) if s == "streamed text"));
        let second = stream.next().await.unwrap().unwrap();
        assert!(matches!(second, TurnEvent::Done));
    }

    #[tokio::test]
    async fn test_clone_with_overrides_instructions_only() {
        let sdk = FakeAgentSdk::new("assistant", "original").with_tools(vec![]);
        let cloned = sdk.clone_with(Some("overridden".to_string()), None, None);
        assert_eq!(cloned.instructions(), "overridden");
        assert_eq!(cloned.name(), "assistant");
    }

    #[tokio::test]
    async fn test_repeating_script_replays_first_outcome() {
        let sdk = FakeAgentSdk::new("assistant", "be helpful")
            .push_outcome(AgentRunOutcome::text("always this"))
            .repeating();

        assert_eq!(sdk.run(&[]).await.unwrap().text_content(), "always this");
        assert_eq!(sdk.run(&[]).await.unwrap().text_content(), "always this");
    }
}

//! The Agent Runtime: the pipeline every turn goes through, shared by
//! `run_turn_sync`, `run_turn_async`, and `stream_turn` (spec §4.1).
//!
//! Session resolution, the security gate, context assembly, system-
//! message synthesis, handoff normalization, the model call, and
//! persistence are each one step of [`AgentRuntime::execute_turn`];
//! the three public entry points differ only in how they drive that
//! one pipeline and how they emit its result. This mirrors the teacher
//! crate's own `query`/`Client` split (one-shot vs. stateful) generalized
//! to three emission styles instead of two.

use crate::context::build_user_info_block;
use crate::handoff::{self, HandoffDescriptor};
use crate::security::{Credentials, SecurityGate};
use crate::sdk::{AgentSdk, TurnEvent};
use crate::session::{SessionBridge, SessionStore};
use crate::template::{AgentTemplate, TemplateRegistry};
use crate::types::{ContentBlock, Message, MessageRole};
use crate::{Error, Result};
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default total-duration budget for one turn (spec §5).
pub const DEFAULT_TOTAL_DURATION: Duration = Duration::from_secs(30);
/// Default per-streamed-event budget (spec §5).
pub const DEFAULT_PER_EVENT_BUDGET: Duration = Duration::from_secs(10);
/// Default handoff recursion bound (spec §4.2).
pub const DEFAULT_MAX_HANDOFF_DEPTH: usize = 3;

/// A request to run one turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Existing session to continue, or `None` to mint a fresh one.
    pub session_id: Option<String>,
    pub user_id: String,
    pub user_name: String,
    pub input: String,
    /// Name of the template (and, by convention, the registered
    /// [`AgentSdk`]) to run.
    pub agent_name: String,
    /// Overrides the template's `instructions` for this turn only.
    pub system_override: Option<String>,
}

/// One item attached to a [`TurnRecord`] beyond plain text output.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnItem {
    HandoffResult { agent_name: String, body: String },
}

/// The sync/async return record (spec §6).
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub session_id: String,
    pub input: String,
    pub output: Option<String>,
    pub success: bool,
    pub error: Option<String>,
    pub items: Vec<TurnItem>,
}

impl TurnRecord {
    fn failed(session_id: impl Into<String>, input: impl Into<String>, err: &Error) -> Self {
        Self {
            session_id: session_id.into(),
            input: input.into(),
            output: None,
            success: false,
            error: Some(err.to_string()),
            items: Vec::new(),
        }
    }
}

/// Cooperative cancellation signal for [`AgentRuntime::stream_turn`].
/// Checked between streamed events (spec §5's "next suspension point").
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The wire envelope for one streamed event (spec §6).
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    Content,
    ToolCall,
    ToolResult,
    Done,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamEvent {
    pub session_id: String,
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub done: bool,
}

/// Produces a JSON value matching the "Runtime return record" shape
/// (spec §6), used as the `data` payload of the terminal stream event.
fn record_to_json(record: &TurnRecord) -> serde_json::Value {
    serde_json::json!({
        "session_id": record.session_id,
        "input": record.input,
        "output": record.output,
        "success": record.success,
        "error": record.error,
        "items": record.items,
    })
}

/// Owns the template registry, session store, security gate, and the
/// registered [`AgentSdk`] implementations, and drives the per-turn
/// pipeline over them.
pub struct AgentRuntime {
    templates: Arc<TemplateRegistry>,
    sessions: Arc<dyn crate::session::SessionStore>,
    gate: Arc<SecurityGate>,
    agents: DashMap<String, Arc<dyn AgentSdk>>,
    session_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    total_duration: Duration,
    per_event_budget: Duration,
    max_handoff_depth: usize,
}

impl AgentRuntime {
    pub fn new(
        templates: Arc<TemplateRegistry>,
        sessions: Arc<dyn crate::session::SessionStore>,
        gate: Arc<SecurityGate>,
    ) -> Self {
        Self {
            templates,
            sessions,
            gate,
            agents: DashMap::new(),
            session_locks: DashMap::new(),
            total_duration: DEFAULT_TOTAL_DURATION,
            per_event_budget: DEFAULT_PER_EVENT_BUDGET,
            max_handoff_depth: DEFAULT_MAX_HANDOFF_DEPTH,
        }
    }

    pub fn with_total_duration(mut self, d: Duration) -> Self {
        self.total_duration = d;
        self
    }

    pub fn with_per_event_budget(mut self, d: Duration) -> Self {
        self.per_event_budget = d;
        self
    }

    pub fn with_max_handoff_depth(mut self, depth: usize) -> Self {
        self.max_handoff_depth = depth;
        self
    }

    /// Registers the executable [`AgentSdk`] backing `agent_name`. A
    /// template of the same name must already (or will eventually)
    /// exist in the template registry; the runtime looks both up by
    /// name at turn time.
    pub fn register_agent(&self, agent_name: impl Into<String>, sdk: Arc<dyn AgentSdk>) {
        self.agents.insert(agent_name.into(), sdk);
    }

    pub fn templates(&self) -> &Arc<TemplateRegistry> {
        &self.templates
    }

    pub fn sessions(&self) -> &Arc<dyn crate::session::SessionStore> {
        &self.sessions
    }

    pub fn gate(&self) -> &Arc<SecurityGate> {
        &self.gate
    }

    async fn session_lock(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Runs a turn to completion and returns its record. Must not be
    /// called from inside a running async executor — use
    /// [`AgentRuntime::run_turn_async`] there instead (spec §4.1's
    /// `AsyncReentry` rule).
    pub fn run_turn_sync(&self, request: TurnRequest, credentials: &Credentials, now: u64) -> Result<TurnRecord> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::AsyncReentry);
        }

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::internal(format!("failed to start sync runtime: {e}")))?;

        rt.block_on(self.run_turn_async(request, credentials, now))
    }

    /// Runs a turn to completion from within an async context.
    pub async fn run_turn_async(&self, request: TurnRequest, credentials: &Credentials, now: u64) -> Result<TurnRecord> {
        match tokio::time::timeout(self.total_duration, self.execute_turn(request.clone(), credentials, now, 0)).await {
            Ok(result) => result,
            Err(_) => Ok(TurnRecord::failed(
                request.session_id.unwrap_or_default(),
                request.input,
                &Error::Timeout,
            )),
        }
    }

    /// Runs a turn, yielding [`StreamEvent`]s as the model produces
    /// them. `cancel` is polled between events; once set, the stream
    /// emits a terminal `cancelled` event and stops.
    pub async fn stream_turn(
        &self,
        request: TurnRequest,
        credentials: &Credentials,
        now: u64,
        cancel: CancelToken,
    ) -> Result<Vec<StreamEvent>> {
        let session_id = request.session_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut events = Vec::new();

        let outcome = tokio::time::timeout(self.total_duration, async {
            self.execute_turn_streamed(request, credentials, now, 0, &cancel, &mut events).await
        })
        .await;

        match outcome {
            Ok(Ok(record)) => {
                events.push(StreamEvent {
                    session_id: record.session_id.clone(),
                    event_type: StreamEventType::Done,
                    content: None,
                    data: Some(record_to_json(&record)),
                    done: true,
                });
            }
            Ok(Err(err)) => {
                events.push(StreamEvent {
                    session_id: session_id.clone(),
                    event_type: StreamEventType::Error,
                    content: Some(err.to_string()),
                    data: None,
                    done: true,
                });
            }
            Err(_) => {
                events.push(StreamEvent {
                    session_id: session_id.clone(),
                    event_type: StreamEventType::Error,
                    content: Some(Error::Timeout.to_string()),
                    data: None,
                    done: true,
                });
            }
        }

        Ok(events)
    }

    /// Steps 1-5: resolve the session, authenticate, assemble context,
    /// synthesize the system message, and normalize handoffs. Returns
    /// everything [`Self::invoke_and_persist`] needs to finish the turn.
    async fn prepare_turn(
        &self,
        request: &TurnRequest,
        credentials: &Credentials,
        now: u64,
    ) -> Result<(SessionBridge, Arc<dyn AgentSdk>, Arc<AgentTemplate>, Vec<Message>)> {
        // Step 1: session resolution.
        let session_id = match &request.session_id {
            Some(id) => {
                if self.sessions.load(id).await?.is_some() {
                    id.clone()
                } else {
                    let fresh = Uuid::new_v4().to_string();
                    self.sessions.create(&fresh, &request.user_id, &request.user_name, now).await?;
                    fresh
                }
            }
            None => {
                let fresh = Uuid::new_v4().to_string();
                self.sessions.create(&fresh, &request.user_id, &request.user_name, now).await?;
                fresh
            }
        };

        let lock = self.session_lock(&session_id).await;
        let _guard = lock.lock_owned().await;

        // Step 2: security gate.
        let auth = self.gate.authenticate(credentials, now)?;
        self.gate.check_rate_limit(&auth, "model", now)?;
        let content_check = self.gate.check_content(&request.input)?;
        let effective_input = if content_check.is_flagged {
            content_check.filtered_content.clone()
        } else {
            request.input.clone()
        };

        // Step 3: context assembly.
        let bridge = SessionBridge::new(session_id.clone(), request.user_id.clone(), request.user_name.clone(), self.sessions.clone());
        bridge.add_message(Message::user(effective_input.clone(), now), now).await?;
        let context = bridge.get_context(true).await?;

        // Step 4: system-message synthesis.
        let template = self
            .templates
            .require(&request.agent_name)?;
        let base_instructions = request.system_override.clone().unwrap_or_else(|| template.instructions.clone());
        let user_info = build_user_info_block(&request.user_id, &request.user_name, &context.metadata);
        let synthesized = format!("{base_instructions}\n\n{user_info}");

        // Step 5: agent preparation.
        let normalized_handoffs = handoff::normalize_handoffs(&template.handoffs);
        let sdk = self
            .agents
            .get(&request.agent_name)
            .map(|e| e.clone())
            .ok_or_else(|| Error::template_not_found(&request.agent_name))?;
        let agent = sdk.clone_with(Some(synthesized), Some(template.tools.clone()), Some(normalized_handoffs));

        // Step 6 input: non-system messages, in order. The user input
        // was already appended above so it's already last.
        let messages: Vec<Message> = context.non_system_messages().into_iter().cloned().collect();

        Ok((bridge, agent, template, messages))
    }

    /// Steps 6-9 (non-streaming): invoke the model, persist its output,
    /// detect and follow a handoff if one was requested.
    async fn execute_turn(
        &self,
        request: TurnRequest,
        credentials: &Credentials,
        now: u64,
        depth: usize,
    ) -> Result<TurnRecord> {
        if depth > self.max_handoff_depth {
            return Err(Error::HandoffLoop(depth));
        }

        let (bridge, agent, _template, messages) = match self.prepare_turn(&request, credentials, now).await {
            Ok(v) => v,
            Err(err) => return Ok(TurnRecord::failed(request.session_id.unwrap_or_default(), request.input, &err)),
        };

        let outcome = match agent.run(&messages).await {
            Ok(o) => o,
            Err(err) => return Ok(TurnRecord::failed(bridge.session_id(), request.input, &err)),
        };

        bridge.add_message(Message::assistant(outcome.content.clone(), now), now).await?;

        let mut record = TurnRecord {
            session_id: bridge.session_id().to_string(),
            input: request.input.clone(),
            output: Some(outcome.text_content()),
            success: true,
            error: None,
            items: Vec::new(),
        };

        if let Some((target, reason)) = detect_handoff(&outcome.content, agent.handoffs()) {
            if depth >= self.max_handoff_depth {
                return Err(Error::HandoffLoop(depth + 1));
            }

            let handoff_request = TurnRequest {
                session_id: Some(bridge.session_id().to_string()),
                user_id: request.user_id.clone(),
                user_name: request.user_name.clone(),
                input: request.input.clone(),
                agent_name: target.clone(),
                system_override: Some(handoff_system_message(&target, &reason)),
            };

            let expert_record = Box::pin(self.execute_turn(handoff_request, credentials, now, depth + 1)).await?;

            record.items.push(TurnItem::HandoffResult {
                agent_name: target,
                body: record.output.clone().unwrap_or_default(),
            });
            record.output = expert_record.output;
            record.success = expert_record.success;
            record.error = expert_record.error;
            record.items.extend(expert_record.items);
        }

        Ok(record)
    }

    /// Streaming variant of [`Self::execute_turn`]: pushes `content`
    /// events as they arrive and checks `cancel` between them.
    async fn execute_turn_streamed(
        &self,
        request: TurnRequest,
        credentials: &Credentials,
        now: u64,
        depth: usize,
        cancel: &CancelToken,
        events: &mut Vec<StreamEvent>,
    ) -> Result<TurnRecord> {
        if depth > self.max_handoff_depth {
            return Err(Error::HandoffLoop(depth));
        }

        let (bridge, agent, _template, messages) = self.prepare_turn(&request, credentials, now).await?;
        let session_id = bridge.session_id().to_string();

        let mut stream = agent.run_streamed(&messages).await?;
        let mut accumulated = String::new();
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let next = match tokio::time::timeout(self.per_event_budget, stream.next()).await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(_) => return Err(Error::Timeout),
            };

            match next? {
                TurnEvent::Content(delta) => {
                    accumulated.push_str(&delta);
                    events.push(StreamEvent {
                        session_id: session_id.clone(),
                        event_type: StreamEventType::Content,
                        content: Some(delta),
                        data: None,
                        done: false,
                    });
                }
                TurnEvent::ToolCall(block) => {
                    events.push(StreamEvent {
                        session_id: session_id.clone(),
                        event_type: StreamEventType::ToolCall,
                        content: None,
                        data: Some(serde_json::json!({"name": block.name, "input": block.input, "id": block.id})),
                        done: false,
                    });
                }
                TurnEvent::ToolResult { tool_use_id, content } => {
                    events.push(StreamEvent {
                        session_id: session_id.clone(),
                        event_type: StreamEventType::ToolResult,
                        content: None,
                        data: Some(serde_json::json!({"tool_use_id": tool_use_id, "content": content})),
                        done: false,
                    });
                }
                TurnEvent::Done => break,
                TurnEvent::Error(msg) => return Err(Error::internal(msg)),
                TurnEvent::Cancelled => {
                    cancelled = true;
                    break;
                }
            }
        }

        let message = Message::assistant(vec![ContentBlock::Text(crate::types::TextBlock::new(accumulated.clone()))], now)
            .mark_truncated_if(cancelled);
        bridge.add_message(message, now).await?;

        if cancelled {
            events.push(StreamEvent {
                session_id: session_id.clone(),
                event_type: StreamEventType::Cancelled,
                content: None,
                data: None,
                done: true,
            });
            return Ok(TurnRecord {
                session_id,
                input: request.input,
                output: Some(accumulated),
                success: false,
                error: Some("cancelled".to_string()),
                items: Vec::new(),
            });
        }

        Ok(TurnRecord {
            session_id,
            input: request.input,
            output: Some(accumulated),
            success: true,
            error: None,
            items: Vec::new(),
        })
    }
}

/// Renders the handoff system message template (spec §4.2 step 2).
pub(crate) fn handoff_system_message(agent_name: &str, reason: &str) -> String {
    format!("You are {agent_name}. The user has been referred to you for {reason}. Continue the conversation.")
}

/// Scans assistant content for a tool call matching one of `descriptors`'
/// tool names, returning `(target_agent, reason)` if found.
fn detect_handoff(content: &[ContentBlock], descriptors: &[HandoffDescriptor]) -> Option<(String, String)> {
    for block in content {
        if let ContentBlock::ToolUse(tool) = block {
            if let Some(target) = handoff::resolve_target_agent(&tool.name, descriptors) {
                let reason = tool
                    .input
                    .get("reason")
                    .and_then(|v| v.as_str())
                    .unwrap_or("further assistance")
                    .to_string();
                return Some((target.to_string(), reason));
            }
        }
    }
    None
}

trait MarkTruncatedIf {
    fn mark_truncated_if(self, cond: bool) -> Self;
}

impl MarkTruncatedIf for Message {
    fn mark_truncated_if(self, cond: bool) -> Self {
        if cond {
            self.mark_truncated()
        } else {
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{AgentRunOutcome, FakeAgentSdk};
    use crate::session::InMemorySessionStore;
    use crate::template::AgentTemplate;
    use std::collections::HashSet;

    fn make_runtime() -> AgentRuntime {
        let templates = Arc::new(TemplateRegistry::new());
        templates.register(AgentTemplate::new("assistant_agent", "Be a helpful assistant."));
        let sessions: Arc<dyn crate::session::SessionStore> = Arc::new(InMemorySessionStore::new(3600));
        let gate = Arc::new(SecurityGate::new(b"test-secret"));
        AgentRuntime::new(templates, sessions, gate)
    }

    fn creds_for(gate: &SecurityGate, account: &str, perms: &[&str]) -> Credentials {
        let issued = gate
            .api_keys
            .create_key(account, perms.iter().map(|s| s.to_string()).collect::<HashSet<_>>(), 0, None)
            .unwrap();
        Credentials::api_key(issued.wire_key)
    }

    #[tokio::test]
    async fn test_fresh_turn_scenario() {
        let runtime = make_runtime();
        let creds = creds_for(&runtime.gate, "acct1", &["model:use"]);
        runtime.register_agent("assistant_agent", Arc::new(FakeAgentSdk::new("assistant_agent", "Be helpful").push_outcome(AgentRunOutcome::text("hi there"))));

        let request = TurnRequest {
            session_id: None,
            user_id: "acct1".to_string(),
            user_name: "Alice".to_string(),
            input: "hello".to_string(),
            agent_name: "assistant_agent".to_string(),
            system_override: None,
        };

        let record = runtime.run_turn_async(request, &creds, 1).await.unwrap();
        assert!(record.success);
        assert_eq!(record.output.as_deref(), Some("hi there"));
        assert!(!record.session_id.is_empty());

        let session = runtime.sessions.load(&record.session_id).await.unwrap().unwrap();
        assert_eq!(session.context.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_handoff_scenario() {
        let runtime = make_runtime();
        runtime.templates.register(AgentTemplate::new("finance_agent", "You are a finance expert."));

        let mut triage = AgentTemplate::new("triage_agent", "Route to the right expert.");
        triage.handoffs.push(crate::template::HandoffSpec {
            agent_name: "finance_agent".to_string(),
            tool_name: None,
            tool_description: None,
            input_filter: None,
            summarize_prefix: None,
            keep_recent_messages: None,
        });
        runtime.templates.register(triage);

        let creds = creds_for(&runtime.gate, "acct1", &["model:use"]);

        let triage_outcome = AgentRunOutcome {
            content: vec![ContentBlock::ToolUse(crate::types::ToolUseBlock::new(
                "call1",
                "handoff_to_finance_agent",
                serde_json::json!({"reason": "investment advice"}),
            ))],
        };
        runtime.register_agent("triage_agent", Arc::new(FakeAgentSdk::new("triage_agent", "Route").push_outcome(triage_outcome)));
        runtime.register_agent(
            "finance_agent",
            Arc::new(FakeAgentSdk::new("finance_agent", "Finance").push_outcome(AgentRunOutcome::text("invest in index funds"))),
        );

        let request = TurnRequest {
            session_id: None,
            user_id: "acct1".to_string(),
            user_name: "Alice".to_string(),
            input: "I have 100k to invest".to_string(),
            agent_name: "triage_agent".to_string(),
            system_override: None,
        };

        let record = runtime.run_turn_async(request, &creds, 1).await.unwrap();
        assert_eq!(record.output.as_deref(), Some("invest in index funds"));
        assert!(record.items.iter().any(|i| matches!(i, TurnItem::HandoffResult { agent_name, .. } if agent_name == "finance_agent")));
    }

    #[tokio::test]
    async fn test_permission_denied_scenario() {
        let runtime = make_runtime();
        let creds = creds_for(&runtime.gate, "acct1", &[]);
        runtime.register_agent("assistant_agent", Arc::new(FakeAgentSdk::new("assistant_agent", "Be helpful")));

        // Simulate a permission check the pipeline would run before a
        // privileged tool call; the turn pipeline itself only gates on
        // auth/rate/content, so this directly exercises the RBAC path
        // the runtime relies on before invoking an admin-scoped tool.
        let auth = runtime.gate.authenticate(&creds, 1).unwrap();
        let err = runtime.gate.require_permission(&auth, "admin:manage").unwrap_err();
        assert!(matches!(err, Error::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_rate_limited_scenario() {
        let runtime = make_runtime();
        runtime.gate.rate_limiter.set_config("model", crate::security::RateLimitConfig::new(2, 60));
        let creds = creds_for(&runtime.gate, "acct1", &["model:use"]);
        runtime.register_agent("assistant_agent", Arc::new(FakeAgentSdk::new("assistant_agent", "Be helpful").repeating().push_outcome(AgentRunOutcome::text("ok"))));

        let make_request = || TurnRequest {
            session_id: None,
            user_id: "acct1".to_string(),
            user_name: "Alice".to_string(),
            input: "hi".to_string(),
            agent_name: "assistant_agent".to_string(),
            system_override: None,
        };

        let r1 = runtime.run_turn_async(make_request(), &creds, 1).await.unwrap();
        let r2 = runtime.run_turn_async(make_request(), &creds, 1).await.unwrap();
        let r3 = runtime.run_turn_async(make_request(), &creds, 1).await.unwrap();

        assert!(r1.success);
        assert!(r2.success);
        assert!(!r3.success);
        assert!(r3.error.unwrap().contains("rate limit"));
    }

    #[tokio::test]
    async fn test_sync_reentry_detected() {
        let runtime = Arc::new(make_runtime());
        let creds = creds_for(&runtime.gate, "acct1", &["model:use"]);
        runtime.register_agent("assistant_agent", Arc::new(FakeAgentSdk::new("assistant_agent", "Be helpful")));

        let request = TurnRequest {
            session_id: None,
            user_id: "acct1".to_string(),
            user_name: "Alice".to_string(),
            input: "hi".to_string(),
            agent_name: "assistant_agent".to_string(),
            system_override: None,
        };

        let err = runtime.run_turn_sync(request, &creds, 1).unwrap_err();
        assert!(matches!(err, Error::AsyncReentry));
    }

    #[tokio::test]
    async fn test_streaming_cancellation_scenario() {
        let runtime = make_runtime();
        let creds = creds_for(&runtime.gate, "acct1", &["model:use"]);
        runtime.register_agent("assistant_agent", Arc::new(FakeAgentSdk::new("assistant_agent", "Be helpful").push_outcome(AgentRunOutcome::text("partial and more"))));

        let cancel = CancelToken::new();
        cancel.cancel();

        let request = TurnRequest {
            session_id: None,
            user_id: "acct1".to_string(),
            user_name: "Alice".to_string(),
            input: "hi".to_string(),
            agent_name: "assistant_agent".to_string(),
            system_override: None,
        };

        let events = runtime.stream_turn(request, &creds, 1, cancel).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == StreamEventType::Cancelled));
    }
}

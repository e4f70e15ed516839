//! Black-box integration tests driving `AgentRuntime` through its public
//! API: a fresh turn with no prior session, a triage-to-expert handoff,
//! and a mid-stream cancellation.

use agent_orchestrator::runtime::{AgentRuntime, CancelToken, StreamEventType, TurnItem, TurnRequest};
use agent_orchestrator::sdk::{AgentRunOutcome, AgentSdk, FakeAgentSdk};
use agent_orchestrator::security::{Credentials, SecurityGate};
use agent_orchestrator::session::InMemorySessionStore;
use agent_orchestrator::template::{AgentTemplate, HandoffSpec, TemplateRegistry};
use agent_orchestrator::ContentBlock;
use agent_orchestrator::ToolUseBlock;
use std::collections::HashSet;
use std::sync::Arc;

fn new_runtime() -> (AgentRuntime, Arc<SecurityGate>) {
    let templates = Arc::new(TemplateRegistry::new());
    let sessions: Arc<dyn agent_orchestrator::session::SessionStore> = Arc::new(InMemorySessionStore::new(3600));
    let gate = Arc::new(SecurityGate::new(b"integration-test-secret"));
    (AgentRuntime::new(templates.clone(), sessions, gate.clone()), gate)
}

fn credentials_for(gate: &SecurityGate, account: &str, permissions: &[&str]) -> Credentials {
    let issued = gate
        .api_keys
        .create_key(
            account,
            permissions.iter().map(|p| p.to_string()).collect::<HashSet<_>>(),
            0,
            None,
        )
        .unwrap();
    Credentials::api_key(issued.wire_key)
}

#[tokio::test]
async fn fresh_turn_allocates_a_session_and_returns_output() {
    let (runtime, gate) = new_runtime();
    runtime
        .templates()
        .register(AgentTemplate::new("assistant", "Be a helpful assistant."));
    runtime.register_agent(
        "assistant",
        Arc::new(FakeAgentSdk::new("assistant", "be helpful").push_outcome(AgentRunOutcome::text("hello there"))) as Arc<dyn AgentSdk>,
    );

    let creds = credentials_for(&gate, "acct-fresh", &["model:use"]);
    let request = TurnRequest {
        session_id: None,
        user_id: "user-1".to_string(),
        user_name: "Alice".to_string(),
        input: "hi".to_string(),
        agent_name: "assistant".to_string(),
        system_override: None,
    };

    let record = runtime.run_turn_async(request, &creds, 1).await.unwrap();

    assert!(record.success);
    assert_eq!(record.output.as_deref(), Some("hello there"));
    assert!(!record.session_id.is_empty());
    assert!(record.error.is_none());

    // The same session id can be continued on a second turn.
    let follow_up = TurnRequest {
        session_id: Some(record.session_id.clone()),
        user_id: "user-1".to_string(),
        user_name: "Alice".to_string(),
        input: "anything else?".to_string(),
        agent_name: "assistant".to_string(),
        system_override: None,
    };
    let second = runtime.run_turn_async(follow_up, &creds, 2).await.unwrap();
    assert_eq!(second.session_id, record.session_id);
}

#[tokio::test]
async fn handoff_from_triage_reaches_the_target_expert() {
    let (runtime, gate) = new_runtime();
    runtime
        .templates()
        .register(AgentTemplate::new("billing_expert", "You handle billing questions."));

    let mut triage = AgentTemplate::new("triage", "Route the user to the right expert.");
    triage.handoffs.push(HandoffSpec {
        agent_name: "billing_expert".to_string(),
        tool_name: None,
        tool_description: None,
        input_filter: None,
        summarize_prefix: None,
        keep_recent_messages: None,
    });
    runtime.templates().register(triage);

    let triage_outcome = AgentRunOutcome {
        content: vec![ContentBlock::ToolUse(ToolUseBlock::new(
            "call-1",
            "handoff_to_billing_expert",
            serde_json::json!({"reason": "a disputed charge"}),
        ))],
    };
    runtime.register_agent(
        "triage",
        Arc::new(FakeAgentSdk::new("triage", "route").push_outcome(triage_outcome)) as Arc<dyn AgentSdk>,
    );
    runtime.register_agent(
        "billing_expert",
        Arc::new(FakeAgentSdk::new("billing_expert", "billing").push_outcome(AgentRunOutcome::text("let's look into that charge")))
            as Arc<dyn AgentSdk>,
    );

    let creds = credentials_for(&gate, "acct-handoff", &["model:use"]);
    let request = TurnRequest {
        session_id: None,
        user_id: "user-2".to_string(),
        user_name: "Bob".to_string(),
        input: "I was charged twice".to_string(),
        agent_name: "triage".to_string(),
        system_override: None,
    };

    let record = runtime.run_turn_async(request, &creds, 1).await.unwrap();

    assert!(record.success);
    assert_eq!(record.output.as_deref(), Some("let's look into that charge"));
    assert!(record.items.iter().any(
        |item| matches!(item, TurnItem::HandoffResult { agent_name, .. } if agent_name == "billing_expert")
    ));
}

#[tokio::test]
async fn streaming_turn_stops_at_cancellation() {
    let (runtime, gate) = new_runtime();
    runtime
        .templates()
        .register(AgentTemplate::new("assistant", "Be a helpful assistant."));
    runtime.register_agent(
        "assistant",
        Arc::new(
            FakeAgentSdk::new("assistant", "be helpful").push_outcome(AgentRunOutcome::text("a long streamed reply")),
        ) as Arc<dyn AgentSdk>,
    );

    let creds = credentials_for(&gate, "acct-stream", &["model:use"]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let request = TurnRequest {
        session_id: None,
        user_id: "user-3".to_string(),
        user_name: "Carol".to_string(),
        input: "tell me a story".to_string(),
        agent_name: "assistant".to_string(),
        system_override: None,
    };

    let events = runtime.stream_turn(request, &creds, 1, cancel).await.unwrap();

    assert!(events.iter().any(|e| e.event_type == StreamEventType::Cancelled));
    let terminal = events.last().unwrap();
    assert!(terminal.done);
}

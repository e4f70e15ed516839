//! # Agent Orchestrator
//!
//! Core runtime for a multi-agent orchestration platform: session
//! lifecycle, typed agent handoffs, Redis-backed context persistence, and
//! a unified authentication/RBAC/rate-limit/content-safety security gate.
//!
//! ## Overview
//!
//! A caller registers one or more [`template::AgentTemplate`]s and a
//! concrete [`sdk::AgentSdk`] per agent name, then drives turns through an
//! [`runtime::AgentRuntime`]. Each turn runs the same nine-step pipeline
//! regardless of caller (sync, async, or streamed): resolve or allocate a
//! session, pass the security gate, assemble context from session
//! history, synthesize the system message, prepare the agent (normalizing
//! its handoffs), invoke the underlying SDK, translate its events,
//! persist the result, and return a uniform record. A turn whose model
//! invokes a handoff tool is transparently re-run against the target
//! agent, bounded by a configurable recursion depth.
//!
//! The [`cooperation::CooperationService`] is a convenience layer over the
//! same primitives for the common "one triage agent routes to several
//! named experts" shape: register each expert once, build a triage
//! template with handoffs to all of them, or bypass triage and dispatch
//! directly to a named expert.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_orchestrator::runtime::{AgentRuntime, TurnRequest};
//! use agent_orchestrator::security::{Credentials, SecurityGate};
//! use agent_orchestrator::session::InMemorySessionStore;
//! use agent_orchestrator::sdk::{AgentSdk, FakeAgentSdk, AgentRunOutcome};
//! use agent_orchestrator::template::{AgentTemplate, TemplateRegistry};
//! use std::sync::Arc;
//!
//! # async fn example() -> agent_orchestrator::Result<()> {
//! let templates = Arc::new(TemplateRegistry::new());
//! templates.register(AgentTemplate::new("assistant", "You are a helpful assistant."));
//!
//! let sessions = Arc::new(InMemorySessionStore::new(3600));
//! let gate = Arc::new(SecurityGate::new(b"hmac-secret"));
//!
//! let runtime = AgentRuntime::new(templates, sessions, gate.clone());
//! runtime.register_agent(
//!     "assistant",
//!     Arc::new(FakeAgentSdk::new("assistant", "be helpful")
//!         .push_outcome(AgentRunOutcome::text("Hello! How can I help?"))) as Arc<dyn AgentSdk>,
//! );
//!
//! let issued = gate.api_keys.create_key("caller", Default::default(), 0, None)?;
//! let creds = Credentials::api_key(issued.wire_key);
//!
//! let request = TurnRequest {
//!     session_id: None,
//!     user_id: "user-1".to_string(),
//!     user_name: "Alice".to_string(),
//!     input: "hi there".to_string(),
//!     agent_name: "assistant".to_string(),
//!     system_override: None,
//! };
//!
//! let record = runtime.run_turn_async(request, &creds, 1).await?;
//! assert!(record.success);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **runtime**: The Agent Runtime — the nine-step turn pipeline, sync/
//!   async/streaming entry points, handoff recursion, and cancellation.
//! - **cooperation**: The Cooperation Service — expert registration and
//!   triage-agent assembly on top of the runtime and handoff engine.
//! - **template**: Agent template definitions and the in-memory template
//!   registry.
//! - **handoff**: The Handoff Engine — normalizing heterogeneous handoff
//!   configuration and filtering conversation history across a handoff.
//! - **context**: The in-memory conversation context model: message
//!   history, metadata, and truncation.
//! - **session**: Session persistence behind a shared `SessionStore`
//!   trait, with in-memory and Redis-backed implementations.
//! - **security**: The Security Gate — API-key and JWT authentication,
//!   RBAC, rate limiting, quota tracking, and content-safety scanning.
//! - **sdk**: The `AgentSdk` trait — the seam between this crate's
//!   orchestration and whatever actually talks to a model provider.
//! - **tools**: Tool definition system with automatic JSON schema
//!   generation, reused by templates to describe callable tools.
//! - **hooks**: Lifecycle event system for intercepting execution at key
//!   points (used to implement template input/output guardrails).
//! - **config**: Environment-driven runtime configuration.
//! - **error**: Comprehensive error types and conversions.
//! - **retry**: Exponential backoff retry logic with jitter, used by the
//!   session store's Redis backend and security gate lookups.

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

/// The Cooperation Service: expert registration and triage-agent assembly
/// on top of the runtime and handoff engine.
pub mod cooperation;

/// Environment-driven runtime configuration.
pub mod config;

/// The in-memory conversation context model: message history, metadata,
/// and truncation.
pub mod context;

/// Error types and conversions for comprehensive error handling throughout
/// the crate. Defines the `Error` enum and `Result<T>` type alias used
/// across all public APIs.
mod error;

/// The Handoff Engine: normalizing heterogeneous handoff configuration and
/// filtering conversation history carried across a handoff.
pub mod handoff;

/// Lifecycle hooks system for intercepting and controlling execution at
/// key points. The runtime uses it to implement a template's
/// `input_guardrails`/`output_guardrails`.
pub mod hooks;

/// The Agent Runtime: the nine-step turn pipeline, sync/async/streaming
/// entry points, handoff recursion, and cancellation.
pub mod runtime;

/// The external LLM SDK seam: the `AgentSdk` trait and the in-crate
/// `FakeAgentSdk` test double.
pub mod sdk;

/// Session persistence behind a shared `SessionStore` trait, with
/// in-memory and Redis-backed implementations.
pub mod session;

/// The Security Gate: API-key and JWT authentication, RBAC, rate
/// limiting, quota tracking, and content-safety scanning.
pub mod security;

/// Agent template definitions and the in-memory template registry.
pub mod template;

/// Tool definition and execution system with automatic JSON schema
/// generation. Reused by templates to describe callable tools.
pub mod tools;

/// Core type definitions for messages, content blocks, and roles.
mod types;

// ============================================================================
// PUBLIC EXPORTS
// ============================================================================

/// Retry utilities with exponential backoff and jitter.
pub mod retry;

// --- Context Management ---

pub use context::Context;

// --- Error Handling ---

pub use error::{Error, Result};

// --- Tool System ---

pub use tools::{Tool, ToolBuilder, tool};

// --- Core Types ---

pub use types::{
    BaseUrl, ContentBlock, Message, MessageRole, ModelName, TextBlock, Temperature,
    ToolResultBlock, ToolUseBlock,
};

// ============================================================================
// CONVENIENCE PRELUDE
// ============================================================================

/// Convenience module containing the most commonly used types for typical
/// usage. Import with `use agent_orchestrator::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Context, ContentBlock, Error, Message, MessageRole, Result, TextBlock, Tool,
        ToolResultBlock, ToolUseBlock, tool,
    };
    pub use crate::cooperation::CooperationService;
    pub use crate::runtime::{AgentRuntime, TurnRequest};
    pub use crate::sdk::AgentSdk;
    pub use crate::security::{Credentials, SecurityGate};
    pub use crate::session::SessionStore;
    pub use crate::template::{AgentTemplate, TemplateRegistry};
}

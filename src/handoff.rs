//! The Handoff Engine: normalizing heterogeneous handoff configuration
//! into canonical descriptors, and safely filtering the conversation
//! history carried across a handoff.
//!
//! Grounded on `original_source/extensions/handoff_manager.py` (the
//! `HandoffManager`, its `_ensure_safe_input_filter` guard) and
//! `original_source/extensions/handoff_filters.py` (the built-in filter
//! library: `remove_all_tools`, `keep_user_messages_only`,
//! `summarize_history`, `custom_filter`).
//!
//! The original guard did a lot of runtime work that Rust's type system
//! makes unnecessary: an [`InputFilter`] is `Fn(HandoffInputData) ->
//! HandoffInputData`, so it can never return the wrong type and never
//! needs a tuple/dict-reconstruction fallback. What's still worth
//! keeping is (a) the panic barrier — a filter is still third-party code
//! that can misbehave — and (b) the higher-order-factory pattern for
//! `summarize_history`, which needs `(prefix, keep_n)` supplied from
//! config before it becomes a concrete filter. [`resolve_named_filter`]
//! plays the role the Python guard's introspection played, but it reads
//! a config tag instead of inspecting a callable.

use crate::template::HandoffSpec;
use crate::types::MessageRole;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// What kind of conversation item a [`HandoffItem`] represents. Needed
/// because `remove_all_tools` filters on item kind, independent of role
/// (an assistant message and an assistant tool call share a role).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffItemKind {
    Text,
    ToolCall,
    ToolResult,
}

/// One item of conversation history as seen by a handoff filter — a
/// flattened, filter-friendly view distinct from [`crate::types::Message`].
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffItem {
    pub role: MessageRole,
    pub kind: HandoffItemKind,
    pub content: String,
}

impl HandoffItem {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            kind: HandoffItemKind::Text,
            content: content.into(),
        }
    }

    pub fn tool_call(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            kind: HandoffItemKind::ToolCall,
            content: content.into(),
        }
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            kind: HandoffItemKind::ToolResult,
            content: content.into(),
        }
    }
}

/// The three ordered sequences of conversation items a handoff filter
/// reads and rewrites (spec §3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandoffInputData {
    pub input_history: Vec<HandoffItem>,
    pub pre_handoff_items: Vec<HandoffItem>,
    pub new_items: Vec<HandoffItem>,
}

/// A handoff input filter. Total by construction: the signature itself
/// rules out the "raises" and "wrong variant" failure modes the
/// original's filters had to guard against at runtime.
pub type InputFilter = Arc<dyn Fn(HandoffInputData) -> HandoffInputData + Send + Sync>;

/// Wraps `filter` in a panic barrier: if the filter panics, log it and
/// return the original input unchanged, rather than unwinding into the
/// runtime's turn pipeline.
pub fn guarded(filter: InputFilter) -> InputFilter {
    Arc::new(move |data: HandoffInputData| {
        let snapshot = data.clone();
        match catch_unwind(AssertUnwindSafe(|| filter(data))) {
            Ok(result) => result,
            Err(_) => {
                log::error!("handoff input filter panicked; passing history through unchanged");
                snapshot
            }
        }
    })
}

/// Drops tool-call and tool-result items from `input_history`; keeps
/// user, assistant text, and system messages (spec §4.2).
pub fn remove_all_tools(data: HandoffInputData) -> HandoffInputData {
    let input_history = data
        .input_history
        .into_iter()
        .filter(|item| item.kind == HandoffItemKind::Text)
        .collect();

    HandoffInputData {
        input_history,
        ..data
    }
}

/// Retains only items whose role is `user`.
pub fn keep_user_messages_only(data: HandoffInputData) -> HandoffInputData {
    let input_history = data
        .input_history
        .into_iter()
        .filter(|item| item.role == MessageRole::User)
        .collect();

    HandoffInputData {
        input_history,
        ..data
    }
}

/// Factory: returns a filter that keeps the last `2 * keep_n` items of
/// `input_history` verbatim and replaces everything older with a single
/// synthetic system item (spec §4.2).
pub fn summarize_history(prefix: impl Into<String>, keep_n: usize) -> InputFilter {
    let prefix = prefix.into();
    Arc::new(move |data: HandoffInputData| {
        let keep = 2 * keep_n;
        if data.input_history.len() <= keep {
            return data;
        }

        let split_at = data.input_history.len() - keep;
        let (old, recent) = data.input_history.split_at(split_at);

        let mut lines = Vec::with_capacity(old.len());
        for item in old {
            let role = role_label(item.role);
            let snippet: String = item.content.chars().take(100).collect();
            lines.push(format!("{role}: {snippet}..."));
        }

        let summary = HandoffItem::text(
            MessageRole::System,
            format!("{}:\n{}", prefix, lines.join("\n")),
        );

        let mut new_history = vec![summary];
        new_history.extend_from_slice(recent);

        HandoffInputData {
            input_history: new_history,
            ..data
        }
    })
}

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

/// Adapts a plain `Vec<HandoffItem> -> Vec<HandoffItem>` function (the
/// signature a caller is most likely to already have) into the canonical
/// [`InputFilter`] shape, applying it to `input_history` only.
pub fn custom_filter<F>(f: F) -> InputFilter
where
    F: Fn(Vec<HandoffItem>) -> Vec<HandoffItem> + Send + Sync + 'static,
{
    Arc::new(move |data: HandoffInputData| HandoffInputData {
        input_history: f(data.input_history.clone()),
        ..data
    })
}

/// Resolves a [`HandoffSpec`]'s `input_filter` tag (`"remove_tools"`,
/// `"user_only"`, `"summarize"`, `"custom"`) into a concrete, guarded
/// filter. `"custom"` has no config-resolvable implementation — a
/// caller supplying a custom filter must attach it after normalization.
pub fn resolve_named_filter(spec: &HandoffSpec) -> Option<InputFilter> {
    match spec.input_filter.as_deref() {
        Some("remove_tools") => Some(guarded(Arc::new(remove_all_tools))),
        Some("user_only") => Some(guarded(Arc::new(keep_user_messages_only))),
        Some("summarize") => {
            let prefix = spec
                .summarize_prefix
                .clone()
                .unwrap_or_else(|| "History summary".to_string());
            let keep_n = spec.keep_recent_messages.unwrap_or(2);
            Some(guarded(summarize_history(prefix, keep_n)))
        }
        _ => None,
    }
}

/// A canonical handoff descriptor — what every heterogeneous `handoffs`
/// entry normalizes to (spec §3).
#[derive(Clone)]
pub struct HandoffDescriptor {
    pub target_agent: String,
    pub tool_name: String,
    pub tool_description: String,
    /// JSON-Schema for the LLM tool call's arguments, typically
    /// `{reason: string, details?: string}` (spec §4.2).
    pub input_type: serde_json::Value,
    pub input_filter: Option<InputFilter>,
}

impl std::fmt::Debug for HandoffDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffDescriptor")
            .field("target_agent", &self.target_agent)
            .field("tool_name", &self.tool_name)
            .field("tool_description", &self.tool_description)
            .field("input_type", &self.input_type)
            .field("input_filter", &self.input_filter.is_some())
            .finish()
    }
}

impl HandoffDescriptor {
    /// Default `{reason: string, details?: string}` schema synthesized
    /// when a config entry omits `input_type` (spec §4.2).
    pub fn default_input_type() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {"type": "string"},
                "details": {"type": "string"}
            },
            "required": ["reason"]
        })
    }
}

/// Normalizes a template's `handoffs` list (§4.2's `pre_run_hook`).
///
/// Every entry is a [`HandoffSpec`] already (the JSON-file shape), so the
/// "dict vs raw agent vs already-canonical" branching the original had
/// to do at runtime collapses to one path: resolve `tool_name`/
/// `tool_description` defaults, synthesize `input_type` if needed, and
/// attach the named filter. Idempotent: calling this twice on an already
/// normalized list produces the same result, since normalization is a
/// pure function of the spec.
pub fn normalize_handoffs(specs: &[HandoffSpec]) -> Vec<HandoffDescriptor> {
    specs
        .iter()
        .map(|spec| {
            let tool_name = spec
                .tool_name
                .clone()
                .unwrap_or_else(|| format!("handoff_to_{}", spec.agent_name));
            let tool_description = spec
                .tool_description
                .clone()
                .unwrap_or_else(|| format!("Delegate to {}", spec.agent_name));

            HandoffDescriptor {
                target_agent: spec.agent_name.clone(),
                tool_name,
                tool_description,
                input_type: HandoffDescriptor::default_input_type(),
                input_filter: resolve_named_filter(spec),
            }
        })
        .collect()
}

/// Matches a produced tool-call name against a list of normalized
/// handoff descriptors, falling back to a `handoff_to_<agent>` prefix
/// inference when no descriptor's `tool_name` matches exactly (spec
/// §4.2's "infers from the tool-name prefix" fallback).
pub fn resolve_target_agent<'a>(
    tool_call_name: &str,
    descriptors: &'a [HandoffDescriptor],
) -> Option<&'a str> {
    if let Some(found) = descriptors
        .iter()
        .find(|d| d.tool_name == tool_call_name)
    {
        return Some(&found.target_agent);
    }

    tool_call_name
        .strip_prefix("handoff_to_")
        .map(|_| ())
        .and_then(|_| {
            let inferred = tool_call_name.strip_prefix("handoff_to_").unwrap();
            descriptors
                .iter()
                .find(|d| d.target_agent == inferred)
                .map(|d| d.target_agent.as_str())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_history() -> Vec<HandoffItem> {
        vec![
            HandoffItem::text(MessageRole::System, "be helpful"),
            HandoffItem::text(MessageRole::User, "what's the weather"),
            HandoffItem::tool_call("get_weather({})"),
            HandoffItem::tool_result("sunny"),
            HandoffItem::text(MessageRole::Assistant, "it's sunny"),
        ]
    }

    #[test]
    fn test_remove_all_tools_drops_tool_items_only() {
        let data = HandoffInputData {
            input_history: sample_history(),
            ..Default::default()
        };
        let result = remove_all_tools(data);
        assert_eq!(result.input_history.len(), 3);
        assert!(result
            .input_history
            .iter()
            .all(|i| i.kind == HandoffItemKind::Text));
    }

    #[test]
    fn test_keep_user_messages_only() {
        let data = HandoffInputData {
            input_history: sample_history(),
            ..Default::default()
        };
        let result = keep_user_messages_only(data);
        assert_eq!(result.input_history.len(), 1);
        assert_eq!(result.input_history[0].role, MessageRole::User);
    }

    #[test]
    fn test_summarize_history_passthrough_when_short() {
        let filter = summarize_history("Summary", 2);
        let data = HandoffInputData {
            input_history: sample_history(),
            ..Default::default()
        };
        let result = filter(data.clone());
        assert_eq!(result.input_history, data.input_history);
    }

    #[test]
    fn test_summarize_history_summarizes_old_messages() {
        let filter = summarize_history("Summary", 1);
        let mut history = Vec::new();
        for i in 0..10 {
            history.push(HandoffItem::text(MessageRole::User, format!("msg {i}")));
        }
        let data = HandoffInputData {
            input_history: history,
            ..Default::default()
        };
        let result = filter(data);
        // keep_n=1 keeps the last 2 verbatim, everything else collapses to one system item.
        assert_eq!(result.input_history.len(), 3);
        assert_eq!(result.input_history[0].role, MessageRole::System);
        assert!(result.input_history[0].content.starts_with("Summary:\n"));
        assert_eq!(result.input_history[1].content, "msg 8");
        assert_eq!(result.input_history[2].content, "msg 9");
    }

    #[test]
    fn test_custom_filter_adapts_vec_function() {
        let filter = custom_filter(|items: Vec<HandoffItem>| {
            items.into_iter().rev().collect::<Vec<_>>()
        });
        let data = HandoffInputData {
            input_history: vec![
                HandoffItem::text(MessageRole::User, "a"),
                HandoffItem::text(MessageRole::User, "b"),
            ],
            ..Default::default()
        };
        let result = filter(data);
        assert_eq!(result.input_history[0].content, "b");
    }

    #[test]
    fn test_guarded_recovers_from_panic() {
        let panicking: InputFilter = Arc::new(|_data| panic!("boom"));
        let wrapped = guarded(panicking);
        let data = HandoffInputData {
            input_history: vec![HandoffItem::text(MessageRole::User, "safe")],
            ..Default::default()
        };
        let result = wrapped(data.clone());
        assert_eq!(result, data);
    }

    #[test]
    fn test_normalize_handoffs_sets_defaults() {
        let specs = vec![HandoffSpec {
            agent_name: "travel_expert".to_string(),
            tool_name: None,
            tool_description: None,
            input_filter: None,
            summarize_prefix: None,
            keep_recent_messages: None,
        }];
        let descriptors = normalize_handoffs(&specs);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].tool_name, "handoff_to_travel_expert");
        assert_eq!(descriptors[0].tool_description, "Delegate to travel_expert");
        assert!(descriptors[0].input_filter.is_none());
    }

    #[test]
    fn test_normalize_handoffs_attaches_named_filter() {
        let specs = vec![HandoffSpec {
            agent_name: "finance_expert".to_string(),
            tool_name: Some("transfer_to_finance".to_string()),
            tool_description: None,
            input_filter: Some("remove_tools".to_string()),
            summarize_prefix: None,
            keep_recent_messages: None,
        }];
        let descriptors = normalize_handoffs(&specs);
        assert!(descriptors[0].input_filter.is_some());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let specs = vec![HandoffSpec {
            agent_name: "travel_expert".to_string(),
            tool_name: None,
            tool_description: None,
            input_filter: None,
            summarize_prefix: None,
            keep_recent_messages: None,
        }];
        let first = normalize_handoffs(&specs);
        let second = normalize_handoffs(&specs);
        assert_eq!(first[0].tool_name, second[0].tool_name);
        assert_eq!(first[0].target_agent, second[0].target_agent);
    }

    #[test]
    fn test_resolve_target_agent_exact_match() {
        let descriptors = normalize_handoffs(&[HandoffSpec {
            agent_name: "travel_expert".to_string(),
            tool_name: Some("transfer_to_travel".to_string()),
            tool_description: None,
            input_filter: None,
            summarize_prefix: None,
            keep_recent_messages: None,
        }]);
        assert_eq!(
            resolve_target_agent("transfer_to_travel", &descriptors),
            Some("travel_expert")
        );
    }

    #[test]
    fn test_resolve_target_agent_prefix_fallback() {
        let descriptors = normalize_handoffs(&[HandoffSpec {
            agent_name: "travel_expert".to_string(),
            tool_name: None,
            tool_description: None,
            input_filter: None,
            summarize_prefix: None,
            keep_recent_messages: None,
        }]);
        assert_eq!(
            resolve_target_agent("handoff_to_travel_expert", &descriptors),
            Some("travel_expert")
        );
    }

    #[test]
    fn test_resolve_target_agent_unknown_returns_none() {
        let descriptors: Vec<HandoffDescriptor> = vec![];
        assert_eq!(resolve_target_agent("handoff_to_nothing", &descriptors), None);
    }
}

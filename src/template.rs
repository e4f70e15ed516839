//! Agent template loading and the in-memory template registry.
//!
//! The original runtime's `TemplateManager` scanned a directory of JSON
//! files, lazily built an `Agent` instance per file, and cached the
//! result (`original_source/agent_cores/core/template_manager.py`).
//! Directory traversal is out of scope here — [`TemplateRegistry`] takes
//! already-read JSON text and leaves walking a config directory to the
//! caller. What survives is the config shape itself and the tolerant,
//! log-and-continue parsing style: a malformed tool or handoff entry is
//! skipped rather than failing the whole template.
//!
//! A template is immutable once registered. The Agent Runtime never
//! mutates one in place; it calls [`AgentTemplate::with_instructions`] (the
//! Rust analogue of the Python `Agent.clone(...)`) to get a per-turn
//! working copy.

use crate::{Error, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Per-tool JSON-Schema-ish parameter description carried by a template.
///
/// This is deliberately not `crate::tools::Tool` — a template file has no
/// way to carry a Rust closure. Wiring a [`ToolSpec`] to a live `Tool`
/// (with its handler) is the caller's job once the template is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub required: Vec<String>,
}

/// One entry of a template's `handoffs` list, exactly as it appears in the
/// JSON file (spec §6). [`crate::handoff`] normalizes these into canonical
/// `HandoffDescriptor`s at runtime; this type is the pre-normalization,
/// serializable shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandoffSpec {
    pub agent_name: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_description: Option<String>,
    #[serde(default)]
    pub input_filter: Option<String>,
    #[serde(default)]
    pub summarize_prefix: Option<String>,
    #[serde(default)]
    pub keep_recent_messages: Option<usize>,
}

/// Sampling parameters, present only when the template's `model` field
/// carries them (either under `settings` or inlined).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelSettings {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
}

impl ModelSettings {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.presence_penalty.is_none()
            && self.frequency_penalty.is_none()
    }
}

/// An immutable agent definition: `{name, instructions, model_ref,
/// model_settings, tools[], handoffs[], input_guardrails[],
/// output_guardrails[]}` (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentTemplate {
    pub name: String,
    pub instructions: String,
    pub model_ref: String,
    #[serde(default)]
    pub model_provider: Option<String>,
    #[serde(default)]
    pub model_settings: ModelSettings,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default)]
    pub handoffs: Vec<HandoffSpec>,
    #[serde(default)]
    pub input_guardrails: Vec<String>,
    #[serde(default)]
    pub output_guardrails: Vec<String>,
}

impl AgentTemplate {
    /// Builds a minimal template with just a name and instructions — handy
    /// for tests and for the cooperation service's default triage agent.
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model_ref: "gpt-3.5-turbo".to_string(),
            model_provider: None,
            model_settings: ModelSettings::default(),
            tools: Vec::new(),
            handoffs: Vec::new(),
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
        }
    }

    /// Returns a clone with `instructions` replaced — the Rust analogue of
    /// the original `Agent.clone(instructions=...)` call used at the start
    /// of every turn (spec §4.1 step 5).
    pub fn with_instructions(&self, instructions: impl Into<String>) -> Self {
        let mut cloned = self.clone();
        cloned.instructions = instructions.into();
        cloned
    }

    /// Returns a clone with `handoffs` replaced — used by the Handoff
    /// Engine's `pre_run_hook` once it has normalized the list (spec
    /// §4.2: "a template whose handoffs required any rewrite is replaced
    /// via clone with the normalized list").
    pub fn with_handoffs(&self, handoffs: Vec<HandoffSpec>) -> Self {
        let mut cloned = self.clone();
        cloned.handoffs = handoffs;
        cloned
    }

    /// Parses an agent template from its JSON file representation (spec
    /// §6). Unlike the original `_create_agent_from_config`, which built a
    /// live `Agent` (and thus needed a model-provider factory, a tool
    /// factory, and so on), this only needs to produce the inert
    /// [`AgentTemplate`] record — so there is no "fall back to direct
    /// creation" branch to carry over.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_input("template must be a JSON object"))?;

        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or("unnamed_agent")
            .to_string();

        let instructions = obj
            .get("instructions")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        let (model_ref, model_provider, mut model_settings) = match obj.get("model") {
            Some(serde_json::Value::String(s)) => (s.clone(), None, ModelSettings::default()),
            Some(serde_json::Value::Object(model_obj)) => {
                let model_ref = model_obj
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("gpt-3.5-turbo")
                    .to_string();
                let provider = model_obj
                    .get("provider")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                let settings = model_obj
                    .get("settings")
                    .map(|s| serde_json::from_value(s.clone()).unwrap_or_default())
                    .unwrap_or_default();
                (model_ref, provider, settings)
            }
            _ => ("gpt-3.5-turbo".to_string(), None, ModelSettings::default()),
        };

        // If `settings` was absent but sampling params were inlined
        // directly on the model object, fall back to those — mirrors the
        // original's "model_settings_from_config or model_settings_dict".
        if model_settings.is_empty() {
            if let Some(serde_json::Value::Object(model_obj)) = obj.get("model") {
                model_settings = serde_json::from_value(serde_json::Value::Object(
                    model_obj.clone(),
                ))
                .unwrap_or_default();
            }
        }

        let tools = obj
            .get("tools")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| parse_tool_spec(entry))
                    .collect()
            })
            .unwrap_or_default();

        let handoffs = obj
            .get("handoffs")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| serde_json::from_value::<HandoffSpec>(entry.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let input_guardrails = string_list(obj.get("input_guardrails"));
        let output_guardrails = string_list(obj.get("output_guardrails"));

        Ok(Self {
            name,
            instructions,
            model_ref,
            model_provider,
            model_settings,
            tools,
            handoffs,
            input_guardrails,
            output_guardrails,
        })
    }
}

fn parse_tool_spec(entry: &serde_json::Value) -> Option<ToolSpec> {
    let obj = entry.as_object()?;
    let name = obj.get("name").and_then(|v| v.as_str())?.to_string();
    let description = obj
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let (parameters, required) = match obj.get("config").and_then(|v| v.as_object()) {
        Some(config) => {
            let parameters = config
                .get("parameters")
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));
            let required = config
                .get("required")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            (parameters, required)
        }
        None => (serde_json::json!({}), Vec::new()),
    };

    Some(ToolSpec {
        name,
        description,
        parameters,
        required,
    })
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// The in-memory, read-mostly store of loaded templates.
///
/// Registration and reload are single atomic `DashMap` operations, so no
/// external locking is needed for the "hot-reloadable under a write lock"
/// requirement (spec §5) — a reload is just an insert that replaces the
/// prior entry, and concurrent readers never observe a torn template.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: DashMap<String, Arc<AgentTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
        }
    }

    /// Registers (or replaces) a template under its own `name`.
    pub fn register(&self, template: AgentTemplate) {
        self.templates
            .insert(template.name.clone(), Arc::new(template));
    }

    /// Parses `text` as a single template's JSON and registers it,
    /// returning the registered name.
    pub fn load_str(&self, text: &str) -> Result<String> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let template = AgentTemplate::from_json(&value)?;
        let name = template.name.clone();
        self.register(template);
        Ok(name)
    }

    /// Looks up a template by name.
    pub fn get(&self, name: &str) -> Option<Arc<AgentTemplate>> {
        self.templates.get(name).map(|entry| entry.clone())
    }

    /// Looks up a template by name, failing with [`Error::TemplateNotFound`]
    /// if absent — the form the Agent Runtime uses (spec §4.1 step 5).
    pub fn require(&self, name: &str) -> Result<Arc<AgentTemplate>> {
        self.get(name)
            .ok_or_else(|| Error::template_not_found(name))
    }

    /// Removes a template, returning it if present.
    pub fn remove(&self, name: &str) -> Option<Arc<AgentTemplate>> {
        self.templates.remove(name).map(|(_, v)| v)
    }

    /// Names of every currently registered template.
    pub fn names(&self) -> Vec<String> {
        self.templates.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_minimal() {
        let value = json!({
            "name": "triage_agent",
            "instructions": "Route the user to the right expert."
        });
        let template = AgentTemplate::from_json(&value).unwrap();
        assert_eq!(template.name, "triage_agent");
        assert_eq!(template.model_ref, "gpt-3.5-turbo");
        assert!(template.tools.is_empty());
        assert!(template.handoffs.is_empty());
    }

    #[test]
    fn test_from_json_string_model() {
        let value = json!({"name": "a", "instructions": "i", "model": "gpt-4o"});
        let template = AgentTemplate::from_json(&value).unwrap();
        assert_eq!(template.model_ref, "gpt-4o");
        assert!(template.model_provider.is_none());
    }

    #[test]
    fn test_from_json_detailed_model_with_settings() {
        let value = json!({
            "name": "a",
            "instructions": "i",
            "model": {
                "name": "glm-4",
                "provider": "zhipu",
                "settings": {"temperature": 0.2, "top_p": 0.9}
            }
        });
        let template = AgentTemplate::from_json(&value).unwrap();
        assert_eq!(template.model_ref, "glm-4");
        assert_eq!(template.model_provider.as_deref(), Some("zhipu"));
        assert_eq!(template.model_settings.temperature, Some(0.2));
    }

    #[test]
    fn test_from_json_inlined_sampling_params() {
        let value = json!({
            "name": "a",
            "instructions": "i",
            "model": {"name": "gpt-4o", "temperature": 0.5}
        });
        let template = AgentTemplate::from_json(&value).unwrap();
        assert_eq!(template.model_settings.temperature, Some(0.5));
    }

    #[test]
    fn test_tool_spec_parsing_skips_unnamed() {
        let value = json!({
            "name": "a",
            "instructions": "i",
            "tools": [
                {"name": "search", "description": "web search",
                 "config": {"parameters": {"query": {"type": "string"}}, "required": ["query"]}},
                {"description": "missing name, skipped"}
            ]
        });
        let template = AgentTemplate::from_json(&value).unwrap();
        assert_eq!(template.tools.len(), 1);
        assert_eq!(template.tools[0].name, "search");
        assert_eq!(template.tools[0].required, vec!["query".to_string()]);
    }

    #[test]
    fn test_handoff_spec_parsing() {
        let value = json!({
            "name": "triage",
            "instructions": "i",
            "handoffs": [
                {"agent_name": "travel_expert", "input_filter": "summarize",
                 "summarize_prefix": "History summary", "keep_recent_messages": 2}
            ]
        });
        let template = AgentTemplate::from_json(&value).unwrap();
        assert_eq!(template.handoffs.len(), 1);
        assert_eq!(template.handoffs[0].agent_name, "travel_expert");
        assert_eq!(template.handoffs[0].input_filter.as_deref(), Some("summarize"));
    }

    #[test]
    fn test_with_instructions_does_not_mutate_original() {
        let template = AgentTemplate::new("a", "original");
        let cloned = template.with_instructions("synthesized");
        assert_eq!(template.instructions, "original");
        assert_eq!(cloned.instructions, "synthesized");
    }

    #[test]
    fn test_registry_load_str_and_require() {
        let registry = TemplateRegistry::new();
        let name = registry
            .load_str(r#"{"name": "triage_agent", "instructions": "route"}"#)
            .unwrap();
        assert_eq!(name, "triage_agent");
        assert!(registry.require("triage_agent").is_ok());
        assert!(matches!(
            registry.require("missing").unwrap_err(),
            Error::TemplateNotFound(_)
        ));
    }

    #[test]
    fn test_registry_reload_replaces_entry() {
        let registry = TemplateRegistry::new();
        registry.register(AgentTemplate::new("a", "v1"));
        registry.register(AgentTemplate::new("a", "v2"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().instructions, "v2");
    }

    #[test]
    fn test_registry_names_and_remove() {
        let registry = TemplateRegistry::new();
        registry.register(AgentTemplate::new("a", "i"));
        registry.register(AgentTemplate::new("b", "i"));
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        assert!(registry.remove("a").is_some());
        assert_eq!(registry.len(), 1);
    }
}

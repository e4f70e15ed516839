//! The Cooperation Service: a thin convenience layer over
//! [`crate::template`]/[`crate::handoff`] for the common "one triage
//! agent routes to several named experts" shape (spec §4.5).
//!
//! Nothing here talks to a model or a session directly — every call
//! bottoms out in either a [`TemplateRegistry`] mutation or an
//! [`AgentRuntime::run_turn_async`] call, so a triage handoff and a
//! direct expert dispatch go through exactly the same security,
//! persistence, and recursion-depth machinery as any other turn.
//! Grounded on `original_source/services/agent_cooperation_service.py`
//! (`register_expert`, `create_triage_agent`, `direct_handoff_to_expert`);
//! the config-driven `_agent_configs`/`expert_factory`/decorator surface
//! that file also exposes has no Rust analogue here — this crate doesn't
//! have a decorator story, and a config-ID indirection over two already-
//! simple constructors would just be another name for the same thing.

use crate::handoff::resolve_named_filter;
use crate::runtime::{handoff_system_message, AgentRuntime, TurnRecord, TurnRequest};
use crate::security::Credentials;
use crate::template::{AgentTemplate, HandoffSpec, TemplateRegistry};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;

/// Where an expert's [`AgentTemplate`] comes from when registering it.
/// Mirrors the original's `Union[str, Agent]`: either a template already
/// sitting in the registry, or a fresh one to register now.
pub enum ExpertSource {
    /// Register `template` under its own name.
    Template(AgentTemplate),
    /// Reuse whatever is already registered under this name.
    Existing(String),
}

impl From<AgentTemplate> for ExpertSource {
    fn from(template: AgentTemplate) -> Self {
        ExpertSource::Template(template)
    }
}

impl From<&str> for ExpertSource {
    fn from(name: &str) -> Self {
        ExpertSource::Existing(name.to_string())
    }
}

impl From<String> for ExpertSource {
    fn from(name: String) -> Self {
        ExpertSource::Existing(name)
    }
}

/// What [`CooperationService::register_expert`] remembers about one
/// expert, so a later [`CooperationService::create_triage_agent`] call
/// can build that expert's [`HandoffSpec`] entry without the caller
/// having to repeat the tool name/description/filter choice.
#[derive(Debug, Clone)]
struct ExpertRegistration {
    agent_name: String,
    tool_name: String,
    tool_description: String,
    input_filter: Option<String>,
    summarize_prefix: Option<String>,
    keep_recent_messages: Option<usize>,
}

/// Registers experts and assembles triage agents against a shared
/// [`TemplateRegistry`]. One service instance per set of experts that
/// should be reachable from the same triage front door.
pub struct CooperationService {
    templates: Arc<TemplateRegistry>,
    experts: DashMap<String, ExpertRegistration>,
}

impl CooperationService {
    pub fn new(templates: Arc<TemplateRegistry>) -> Self {
        Self {
            templates,
            experts: DashMap::new(),
        }
    }

    /// Registers an expert under `name` (the name used to refer to it
    /// from [`Self::create_triage_agent`]/[`Self::direct_handoff_to_expert`]
    /// — distinct from the expert's own template name). Defaults: tool
    /// name `transfer_to_<name>_expert`, description `Delegate to
    /// <agent_name>`, filter `remove_tools` (spec §4.5: "default input
    /// filter is remove_all_tools").
    ///
    /// Returns the [`HandoffSpec`] this registration would contribute to
    /// a triage agent's handoff list, for callers that want to assemble
    /// one manually instead of going through [`Self::create_triage_agent`].
    pub fn register_expert(
        &self,
        name: impl Into<String>,
        source: impl Into<ExpertSource>,
        description: Option<String>,
        tool_name: Option<String>,
        input_filter: Option<String>,
    ) -> Result<HandoffSpec> {
        let name = name.into();
        let agent_name = match source.into() {
            ExpertSource::Template(template) => {
                let agent_name = template.name.clone();
                self.templates.register(template);
                agent_name
            }
            ExpertSource::Existing(existing) => {
                self.templates.require(&existing)?;
                existing
            }
        };

        let tool_name = tool_name.unwrap_or_else(|| format!("transfer_to_{name}_expert"));
        let tool_description = description.unwrap_or_else(|| format!("Delegate to {agent_name}"));
        let input_filter = Some(input_filter.unwrap_or_else(|| "remove_tools".to_string()));

        self.experts.insert(
            name,
            ExpertRegistration {
                agent_name: agent_name.clone(),
                tool_name: tool_name.clone(),
                tool_description: tool_description.clone(),
                input_filter: input_filter.clone(),
                summarize_prefix: None,
                keep_recent_messages: None,
            },
        );

        Ok(HandoffSpec {
            agent_name,
            tool_name: Some(tool_name),
            tool_description: Some(tool_description),
            input_filter,
            summarize_prefix: None,
            keep_recent_messages: None,
        })
    }

    /// Registers an expert whose handoffs should carry a `summarize`
    /// filter with the given prefix/recent-message count, rather than
    /// the default `remove_tools` (spec §4.5's note on per-expert
    /// history-summarization overrides).
    pub fn register_expert_with_summary(
        &self,
        name: impl Into<String>,
        source: impl Into<ExpertSource>,
        description: Option<String>,
        tool_name: Option<String>,
        summarize_prefix: impl Into<String>,
        keep_recent_messages: usize,
    ) -> Result<HandoffSpec> {
        let name = name.into();
        let mut spec = self.register_expert(name.clone(), source, description, tool_name, Some("summarize".to_string()))?;

        spec.summarize_prefix = Some(summarize_prefix.into());
        spec.keep_recent_messages = Some(keep_recent_messages);

        let mut registration = self
            .experts
            .get_mut(&name)
            .expect("register_expert just inserted this entry");
        registration.summarize_prefix = spec.summarize_prefix.clone();
        registration.keep_recent_messages = spec.keep_recent_messages;

        Ok(spec)
    }

    /// Builds a triage [`AgentTemplate`] from `base`, with handoffs to
    /// every name in `expert_names` (each of which must already be
    /// registered via [`Self::register_expert`]). When `instructions` is
    /// `None`, synthesizes a default listing each expert's tool name
    /// (spec §4.5: "injects default instructions listing expert tool
    /// names if omitted").
    pub fn create_triage_agent(
        &self,
        base: &AgentTemplate,
        expert_names: &[String],
        instructions: Option<String>,
    ) -> Result<AgentTemplate> {
        let mut handoffs = Vec::with_capacity(expert_names.len());
        for name in expert_names {
            let expert = self
                .experts
                .get(name)
                .ok_or_else(|| Error::template_not_found(name))?;
            handoffs.push(HandoffSpec {
                agent_name: expert.agent_name.clone(),
                tool_name: Some(expert.tool_name.clone()),
                tool_description: Some(expert.tool_description.clone()),
                input_filter: expert.input_filter.clone(),
                summarize_prefix: expert.summarize_prefix.clone(),
                keep_recent_messages: expert.keep_recent_messages,
            });
        }

        let instructions = instructions.unwrap_or_else(|| self.default_triage_instructions(expert_names));
        Ok(base.with_handoffs(handoffs).with_instructions(instructions))
    }

    fn default_triage_instructions(&self, expert_names: &[String]) -> String {
        let mut lines = vec![
            "You are a triage assistant. Handle simple questions yourself; \
             for anything in an expert's domain, use that expert's tool \
             immediately rather than asking the user whether to transfer."
                .to_string(),
            String::new(),
            "Available experts:".to_string(),
        ];

        for name in expert_names {
            if let Some(expert) = self.experts.get(name) {
                lines.push(format!("- {name}: use the `{}` tool", expert.tool_name));
            }
        }

        lines.join("\n")
    }

    /// Runs `expert_name` directly against `user_message`, bypassing
    /// triage entirely — the caller already knows which expert this
    /// belongs to (spec §4.5: "direct_handoff_to_expert ... bypasses LLM
    /// triage, synthesizes handoff system message directly"). Goes
    /// through [`AgentRuntime::run_turn_async`] like any other turn, so
    /// the usual security/persistence/recursion-limit handling still
    /// applies.
    #[allow(clippy::too_many_arguments)]
    pub async fn direct_handoff_to_expert(
        &self,
        runtime: &AgentRuntime,
        expert_name: &str,
        user_message: impl Into<String>,
        reason: &str,
        session_id: Option<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        credentials: &Credentials,
        now: u64,
    ) -> Result<TurnRecord> {
        let expert = self
            .experts
            .get(expert_name)
            .ok_or_else(|| Error::template_not_found(expert_name))?;

        let request = TurnRequest {
            session_id,
            user_id: user_id.into(),
            user_name: user_name.into(),
            input: user_message.into(),
            agent_name: expert.agent_name.clone(),
            system_override: Some(handoff_system_message(&expert.agent_name, reason)),
        };

        runtime.run_turn_async(request, credentials, now).await
    }

    /// Names of every currently registered expert.
    pub fn expert_names(&self) -> Vec<String> {
        self.experts.iter().map(|e| e.key().clone()).collect()
    }

    /// Validates that `spec.input_filter` (if set) resolves to a known
    /// filter tag — useful for catching a typo'd tag at registration
    /// time instead of silently getting no filter at normalization time.
    pub fn validate_filter_tag(spec: &HandoffSpec) -> Result<()> {
        if spec.input_filter.is_some() && resolve_named_filter(spec).is_none() {
            return Err(Error::config(format!(
                "unknown input_filter tag '{}'",
                spec.input_filter.as_deref().unwrap_or_default()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::{AgentRunOutcome, FakeAgentSdk};
    use crate::security::SecurityGate;
    use crate::session::InMemorySessionStore;
    use std::collections::HashSet;

    fn make_service() -> (CooperationService, Arc<TemplateRegistry>) {
        let templates = Arc::new(TemplateRegistry::new());
        let service = CooperationService::new(templates.clone());
        (service, templates)
    }

    #[test]
    fn test_register_expert_defaults() {
        let (service, _templates) = make_service();
        let spec = service
            .register_expert("finance", AgentTemplate::new("finance_agent", "You are a finance expert."), None, None, None)
            .unwrap();

        assert_eq!(spec.agent_name, "finance_agent");
        assert_eq!(spec.tool_name.as_deref(), Some("transfer_to_finance_expert"));
        assert_eq!(spec.input_filter.as_deref(), Some("remove_tools"));
    }

    #[test]
    fn test_register_expert_existing_template_requires_presence() {
        let (service, templates) = make_service();
        let err = service
            .register_expert("finance", "missing_template", None, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(_)));

        templates.register(AgentTemplate::new("finance_agent", "Finance."));
        let spec = service
            .register_expert("finance", "finance_agent", None, None, None)
            .unwrap();
        assert_eq!(spec.agent_name, "finance_agent");
    }

    #[test]
    fn test_create_triage_agent_lists_expert_tools_by_default() {
        let (service, _templates) = make_service();
        service
            .register_expert("finance", AgentTemplate::new("finance_agent", "Finance."), None, None, None)
            .unwrap();
        service
            .register_expert("travel", AgentTemplate::new("travel_agent", "Travel."), None, None, None)
            .unwrap();

        let base = AgentTemplate::new("triage_agent", "Route the user.");
        let triage = service
            .create_triage_agent(&base, &["finance".to_string(), "travel".to_string()], None)
            .unwrap();

        assert_eq!(triage.handoffs.len(), 2);
        assert!(triage.instructions.contains("transfer_to_finance_expert"));
        assert!(triage.instructions.contains("transfer_to_travel_expert"));
    }

    #[test]
    fn test_create_triage_agent_with_custom_instructions() {
        let (service, _templates) = make_service();
        service
            .register_expert("finance", AgentTemplate::new("finance_agent", "Finance."), None, None, None)
            .unwrap();

        let base = AgentTemplate::new("triage_agent", "unused");
        let triage = service
            .create_triage_agent(&base, &["finance".to_string()], Some("Custom routing rules.".to_string()))
            .unwrap();

        assert_eq!(triage.instructions, "Custom routing rules.");
    }

    #[test]
    fn test_create_triage_agent_unknown_expert_errors() {
        let (service, _templates) = make_service();
        let base = AgentTemplate::new("triage_agent", "Route.");
        let err = service
            .create_triage_agent(&base, &["nonexistent".to_string()], None)
            .unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn test_direct_handoff_to_expert_bypasses_triage() {
        let templates = Arc::new(TemplateRegistry::new());
        let service = CooperationService::new(templates.clone());
        templates.register(AgentTemplate::new("finance_agent", "Finance."));
        service
            .register_expert("finance", "finance_agent", None, None, None)
            .unwrap();

        let sessions: Arc<dyn crate::session::SessionStore> = Arc::new(InMemorySessionStore::new(3600));
        let gate = Arc::new(SecurityGate::new(b"test-secret"));
        let runtime = AgentRuntime::new(templates, sessions, gate.clone());
        runtime.register_agent(
            "finance_agent",
            Arc::new(FakeAgentSdk::new("finance_agent", "Finance").push_outcome(AgentRunOutcome::text("put it in a 401k"))),
        );

        let issued = gate
            .api_keys
            .create_key("acct1", HashSet::from(["model:use".to_string()]), 0, None)
            .unwrap();
        let creds = Credentials::api_key(issued.wire_key);

        let record = service
            .direct_handoff_to_expert(&runtime, "finance", "what should I do with my bonus", "financial planning", None, "acct1", "Alice", &creds, 1)
            .await
            .unwrap();

        assert!(record.success);
        assert_eq!(record.output.as_deref(), Some("put it in a 401k"));
    }

    #[test]
    fn test_validate_filter_tag_rejects_unknown() {
        let spec = HandoffSpec {
            agent_name: "x".to_string(),
            tool_name: None,
            tool_description: None,
            input_filter: Some("not_a_real_tag".to_string()),
            summarize_prefix: None,
            keep_recent_messages: None,
        };
        assert!(CooperationService::validate_filter_tag(&spec).is_err());
    }

    #[test]
    fn test_validate_filter_tag_accepts_known() {
        let spec = HandoffSpec {
            agent_name: "x".to_string(),
            tool_name: None,
            tool_description: None,
            input_filter: Some("remove_tools".to_string()),
            summarize_prefix: None,
            keep_recent_messages: None,
        };
        assert!(CooperationService::validate_filter_tag(&spec).is_ok());
    }
}

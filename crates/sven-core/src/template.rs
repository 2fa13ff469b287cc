// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §3 AgentTemplate / Template Registry, and §4.8 the Step Handler Driver.
//!
//! Templates are immutable declarations; a [`TemplateRegistry`] is cloned
//! per session so client-supplied local templates can shadow built-ins
//! without mutating the process-global set (§9: "the existing approach of
//! module-level singletons is an anti-pattern the port should replace with
//! explicit dependency containers").

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;

use crate::agent_state::AgentState;

/// How the Sub-Agent Orchestrator extracts a finished child's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// The child's last assistant message text becomes its result.
    LastMessage,
    /// The child's `output` field (set via the `set_output` local tool)
    /// becomes its result.
    StructuredOutput,
}

/// One directive yielded by a [`StepHandler`] between steps (§4.8).
#[derive(Debug, Clone)]
pub enum Directive {
    /// Inject this tool call into the next step's DISPATCH phase instead
    /// of (or in addition to) whatever the model itself requests.
    InjectToolCall { tool_name: String, input: Value },
    /// Relinquish control: run one ordinary streaming step.
    Step,
    /// Append `text` as the assistant output of the next step without
    /// calling the LLM, then relinquish.
    StepText { text: String },
    /// The step handler will no longer be consulted for this agent run.
    Done,
}

/// A cooperative, resumable step handler. The donor has no native
/// generators to model `handleSteps` with, so each template that wants one
/// supplies a factory producing a fresh boxed handler per agent instance
/// (§9: "a small internal struct carries its own progress counter").
pub trait StepHandler: Send {
    /// Inspect the current state and decide the next directive. Called
    /// once per PREPARE and once per STEP_HANDLER phase of the loop (§4.7).
    fn next(&mut self, state: &AgentState) -> Directive;
}

/// Convenience handler for templates with no step logic of their own: asks
/// for one ordinary step, forever, i.e. equivalent to no `handleSteps` at
/// all. Not normally constructed directly — templates with no step
/// handler simply leave `handle_steps` as `None`.
pub struct NullStepHandler;

impl StepHandler for NullStepHandler {
    fn next(&mut self, _state: &AgentState) -> Directive {
        Directive::Done
    }
}

/// Declarative description of an agent type (§3). Cheap to clone: the
/// `handle_steps` factory is an `Arc`, not the handler itself.
#[derive(Clone)]
pub struct AgentTemplate {
    pub id: String,
    pub display_name: String,
    /// Opaque model identifier passed through to the LLM collaborator.
    pub model: String,
    /// JSON-schema-like shape for `prompt` and `params`; validated at the
    /// session boundary, not inside the step loop (§9).
    pub input_schema: Value,
    pub tool_names: BTreeSet<String>,
    pub spawnable_agents: BTreeSet<String>,
    pub system_prompt: Option<String>,
    pub instructions_prompt: Option<String>,
    pub step_prompt: Option<String>,
    pub output_mode: OutputMode,
    pub include_message_history: bool,
    pub inherit_parent_system_prompt: bool,
    pub reasoning_options: Option<Value>,
    pub provider_options: Option<Value>,
    /// Factory producing a fresh [`StepHandler`] per agent instance, or
    /// `None` for templates with no cooperative step logic.
    pub handle_steps: Option<Arc<dyn Fn() -> Box<dyn StepHandler> + Send + Sync>>,
}

impl std::fmt::Debug for AgentTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTemplate")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("model", &self.model)
            .field("tool_names", &self.tool_names)
            .field("spawnable_agents", &self.spawnable_agents)
            .field("output_mode", &self.output_mode)
            .field("has_handle_steps", &self.handle_steps.is_some())
            .finish()
    }
}

impl AgentTemplate {
    /// Minimal builder for tests and the binary entry point: no tools, no
    /// spawnable children, no step handler, last-message output.
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            model: model.into(),
            input_schema: Value::Null,
            tool_names: BTreeSet::new(),
            spawnable_agents: BTreeSet::new(),
            system_prompt: None,
            instructions_prompt: None,
            step_prompt: None,
            output_mode: OutputMode::LastMessage,
            include_message_history: true,
            inherit_parent_system_prompt: false,
            reasoning_options: None,
            provider_options: None,
            handle_steps: None,
        }
    }

    pub fn with_tools(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tool_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_spawnable(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.spawnable_agents = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_step_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.step_prompt = Some(prompt.into());
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_handle_steps<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn StepHandler> + Send + Sync + 'static,
    {
        self.handle_steps = Some(Arc::new(factory));
        self
    }
}

/// Mapping from template id to [`AgentTemplate`]. Cloned per session so
/// that session-local templates (client-supplied) can shadow built-ins
/// without mutating a process-global registry.
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Arc<AgentTemplate>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, template: AgentTemplate) {
        self.templates.insert(template.id.clone(), Arc::new(template));
    }

    pub fn get(&self, id: &str) -> Option<Arc<AgentTemplate>> {
        self.templates.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    /// Session-scoped shadowing: templates in `local` override or add to
    /// this registry's entries without mutating `self`.
    pub fn with_local_overrides(&self, local: impl IntoIterator<Item = AgentTemplate>) -> Self {
        let mut merged = self.clone();
        for t in local {
            merged.register(t);
        }
        merged
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_get_returns_registered_template() {
        let mut reg = TemplateRegistry::new();
        reg.register(AgentTemplate::new("coder", "claude-x"));
        assert!(reg.get("coder").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn local_overrides_shadow_without_mutating_base() {
        let mut base = TemplateRegistry::new();
        base.register(AgentTemplate::new("coder", "base-model"));

        let shadowed = base.with_local_overrides([AgentTemplate::new("coder", "local-model")]);
        assert_eq!(base.get("coder").unwrap().model, "base-model");
        assert_eq!(shadowed.get("coder").unwrap().model, "local-model");
    }

    #[test]
    fn builder_sets_tool_and_spawnable_sets() {
        let t = AgentTemplate::new("main", "m").with_tools(["read_files", "run_terminal_command"]).with_spawnable(["reviewer"]);
        assert!(t.tool_names.contains("read_files"));
        assert!(t.spawnable_agents.contains("reviewer"));
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §4.7 Agent Step Loop: the state machine driving one [`AgentState`]
//! through PREPARE → STREAM → DISPATCH → APPLY → STEP_HANDLER, terminating
//! on budget exhaustion, `stepsComplete`, or cancellation.

use std::sync::Arc;

use sven_model::{Message, ModelProvider, ToolSchema};
use sven_tools::{RemoteToolCollaborator, ToolCall};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::agent_state::AgentState;
use crate::cache_control::apply_cache_control;
use crate::dispatcher::{dispatch, DispatchResult};
use crate::errors::RuntimeError;
use crate::orchestrator::run_children;
use crate::pruner::{prune, DEFAULT_MAX_MESSAGE_TOKENS, DEFAULT_NUM_TERMINAL_COMMANDS_TO_KEEP};
use crate::stream_adapter::{drain, AdaptedStream, StreamAdapter};
use crate::template::{AgentTemplate, Directive, TemplateRegistry};

/// Shared, immutable-after-construction collaborators a single top-level
/// `prompt` call threads down through every agent and sub-agent task
/// (§5, §9: "explicit dependency containers" rather than module-level
/// singletons).
pub struct RunContext<'a> {
    pub registry: Arc<TemplateRegistry>,
    pub provider: &'a dyn ModelProvider,
    pub remote: &'a dyn RemoteToolCollaborator,
    pub max_message_tokens: usize,
    pub num_terminal_commands_to_keep: usize,
    pub cancellation: CancellationToken,
}

impl<'a> RunContext<'a> {
    pub fn new(registry: Arc<TemplateRegistry>, provider: &'a dyn ModelProvider, remote: &'a dyn RemoteToolCollaborator) -> Self {
        Self {
            registry,
            provider,
            remote,
            max_message_tokens: DEFAULT_MAX_MESSAGE_TOKENS,
            num_terminal_commands_to_keep: DEFAULT_NUM_TERMINAL_COMMANDS_TO_KEEP,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Result of running one agent to completion. Always carries the final
/// state — even a fatal stream error preserves whatever history and
/// `creditsUsed` had already been committed (§4.7 Failure, §7 Propagation).
pub struct AgentOutcome {
    pub state: AgentState,
    pub error: Option<RuntimeError>,
}

impl AgentOutcome {
    fn ok(state: AgentState) -> Self {
        Self { state, error: None }
    }

    fn failed(state: AgentState, error: RuntimeError) -> Self {
        Self { state, error: Some(error) }
    }
}

/// Maximum stream retry attempts per §7 ("Retried by the adapter up to 3
/// attempts" — realized here, in the loop that owns the retry budget,
/// since the adapter itself is specified to perform no retries, §4.4).
const MAX_STREAM_ATTEMPTS: u32 = 3;

fn build_effective_messages(template: &AgentTemplate, parent_system_prompt: Option<&str>, state: &AgentState) -> Vec<Message> {
    let mut messages = Vec::new();

    if template.inherit_parent_system_prompt {
        if let Some(p) = parent_system_prompt {
            messages.push(Message::system(p));
        }
    }
    if let Some(p) = &template.system_prompt {
        messages.push(Message::system(p));
    }
    messages.extend(state.message_history.iter().cloned());
    if let Some(p) = &template.step_prompt {
        let mut m = Message::user(p);
        m.meta_mut().tags.insert("STEP_PROMPT".to_string());
        messages.push(m);
    }
    messages
}

fn tool_schemas(template: &AgentTemplate) -> Vec<ToolSchema> {
    template
        .tool_names
        .iter()
        .map(|name| ToolSchema { name: name.clone(), description: String::new(), parameters: serde_json::Value::Null })
        .collect()
}

/// Runs one step's STREAM phase with the loop's own retry budget, since
/// the Stream Adapter itself performs none (§4.4, §7 `StreamError`).
async fn stream_with_retries(
    ctx: &RunContext<'_>,
    template: &AgentTemplate,
    messages: Vec<Message>,
    override_text: Option<String>,
) -> Result<crate::stream_adapter::StreamResult, RuntimeError> {
    if let Some(text) = override_text {
        let adapted = StreamAdapter::text_override(text);
        return drain(adapted).await.map_err(|e| RuntimeError::Stream { attempts: 1, source: e });
    }

    let adapter = StreamAdapter::new(ctx.provider);
    let tools = tool_schemas(template);
    let mut last_err = None;
    for attempt in 1..=MAX_STREAM_ATTEMPTS {
        if ctx.cancellation.is_cancelled() {
            return Err(RuntimeError::Canceled);
        }
        let attempted: Result<AdaptedStream, anyhow::Error> =
            adapter.stream(template, messages.clone(), tools.clone(), None).await;
        match attempted {
            Ok(stream) => match drain(stream).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!(attempt, error = %e, "stream drain failed, retrying");
                    last_err = Some(e);
                }
            },
            Err(e) => {
                warn!(attempt, error = %e, "stream start failed, retrying");
                last_err = Some(e);
            }
        }
    }
    Err(RuntimeError::Stream { attempts: MAX_STREAM_ATTEMPTS, source: last_err.unwrap_or_else(|| anyhow::anyhow!("unknown stream failure")) })
}

/// Runs `template` against `state` to completion: budget exhaustion,
/// `stepsComplete`, explicit `Done` from the step handler, or cancellation.
///
/// Recursive through [`crate::orchestrator::run_children`] (`spawn_agents`/
/// `spawn_agent_inline` themselves call back into this function); the
/// recursion is broken with `Box::pin` at the orchestrator boundary.
#[instrument(skip(ctx, state), fields(agent_type = %state.agent_type, agent_id = %state.agent_id))]
pub async fn run_agent(ctx: &RunContext<'_>, template: Arc<AgentTemplate>, mut state: AgentState) -> AgentOutcome {
    let mut step_handler = template.handle_steps.as_ref().map(|factory| factory());
    let parent_system_prompt: Option<String> = None;

    loop {
        if ctx.cancellation.is_cancelled() {
            return AgentOutcome::failed(state, RuntimeError::Canceled);
        }
        if state.steps_remaining == 0 || state.steps_complete {
            break;
        }

        // PREPARE
        let mut injected_tool_call: Option<(String, serde_json::Value)> = None;
        let mut override_text: Option<String> = None;
        if let Some(handler) = step_handler.as_mut() {
            match handler.next(&state) {
                Directive::InjectToolCall { tool_name, input } => injected_tool_call = Some((tool_name, input)),
                Directive::StepText { text } => override_text = Some(text),
                Directive::Step => {}
                Directive::Done => step_handler = None,
            }
        }

        let pruned = prune(&state.message_history, ctx.max_message_tokens, ctx.num_terminal_commands_to_keep);
        if let Some(w) = pruned.warning {
            warn!(?w, "context pruner exhausted history without reaching budget");
        }
        state.message_history = pruned.messages;

        let mut effective = build_effective_messages(&template, parent_system_prompt.as_deref(), &state);
        apply_cache_control(&mut effective);

        // STREAM
        let stream_result = match stream_with_retries(ctx, &template, effective, override_text).await {
            Ok(r) => r,
            Err(e) => return AgentOutcome::failed(state, e),
        };

        if let Some(usage) = &stream_result.usage {
            state.credits_used += (usage.input_tokens + usage.output_tokens) as u64;
        }

        if !stream_result.text.is_empty() || !stream_result.reasoning.is_empty() {
            let mut assistant_message = Message::assistant(stream_result.text.clone());
            assistant_message.meta_mut().tags.insert("LAST_ASSISTANT_MESSAGE".to_string());
            state.message_history.push(assistant_message);
        }

        let mut tool_calls: Vec<ToolCall> = stream_result
            .tool_calls
            .into_iter()
            .map(|(tool_call_id, tool_name, input)| ToolCall { tool_call_id, tool_name, input })
            .collect();
        if let Some((tool_name, input)) = injected_tool_call {
            tool_calls.push(ToolCall { tool_call_id: format!("injected-{}", uuid::Uuid::new_v4()), tool_name, input });
        }

        // DISPATCH + APPLY
        for call in &tool_calls {
            state.message_history.push(Message::assistant_tool_call(call.tool_call_id.clone(), call.tool_name.clone(), call.input.clone()));

            let result = dispatch(call, &template, &mut state, ctx.remote, None, None).await;
            match result {
                DispatchResult::Output(output) => {
                    let parts = output.parts.clone();
                    state.message_history.push(Message::Tool {
                        content: parts,
                        tool_call_id: output.tool_call_id.clone(),
                        tool_name: call.tool_name.clone(),
                        meta: Default::default(),
                    });
                }
                DispatchResult::SpawnConcurrent { tool_call_id, descriptors } => {
                    let outputs = run_children(ctx, &template, &mut state, descriptors, true).await;
                    state.message_history.push(Message::tool_result(tool_call_id, call.tool_name.clone(), serde_json::to_value(&outputs).unwrap_or_default()));
                }
                DispatchResult::SpawnInline { tool_call_id, descriptor } => {
                    let outputs = run_children(ctx, &template, &mut state, vec![descriptor], false).await;
                    let value = outputs.first().map(|o| o.value.clone()).unwrap_or(serde_json::Value::Null);
                    state.message_history.push(Message::tool_result(tool_call_id, call.tool_name.clone(), value));
                }
            }
        }

        // STEP_HANDLER
        if let Some(handler) = step_handler.as_mut() {
            if let Directive::Done = handler.next(&state) {
                step_handler = None;
            }
        }

        state.steps_remaining = state.steps_remaining.saturating_sub(1);
        debug!(steps_remaining = state.steps_remaining, "step complete");

        if state.steps_remaining == 0 || state.steps_complete {
            break;
        }
    }

    info!(credits_used = state.credits_used, "agent run finished");
    AgentOutcome::ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::AgentTemplate;
    use sven_model::{MockProvider, ScriptedMockProvider};
    use sven_tools::ToolOutputPart;

    struct NullRemote;

    #[async_trait::async_trait]
    impl RemoteToolCollaborator for NullRemote {
        async fn request_tool_call(
            &self,
            _tool_name: &str,
            _input: serde_json::Value,
            _timeout: Option<std::time::Duration>,
            _mcp_config: Option<serde_json::Value>,
        ) -> anyhow::Result<Vec<ToolOutputPart>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn runs_until_budget_exhausted_with_no_tools() {
        let provider = MockProvider;
        let remote = NullRemote;
        let registry = Arc::new(TemplateRegistry::new());
        let ctx = RunContext::new(registry, &provider, &remote);
        let template = Arc::new(AgentTemplate::new("main", "mock"));
        let mut state = AgentState::new_top_level("main", 2);
        state.message_history.push(Message::user("Hello"));

        let outcome = run_agent(&ctx, template, state).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.state.steps_remaining, 0);
    }

    #[tokio::test]
    async fn end_turn_tool_call_stops_the_loop_early() {
        let provider = ScriptedMockProvider::tool_then_text("c1", "end_turn", serde_json::json!({}), "done");
        let remote = NullRemote;
        let registry = Arc::new(TemplateRegistry::new());
        let ctx = RunContext::new(registry, &provider, &remote);
        let template = Arc::new(AgentTemplate::new("main", "mock").with_tools(["end_turn"]));
        let state = AgentState::new_top_level("main", 20);

        let outcome = run_agent(&ctx, template, state).await;
        assert!(outcome.error.is_none());
        assert!(outcome.state.steps_complete);
        assert!(outcome.state.steps_remaining > 0);
    }
}

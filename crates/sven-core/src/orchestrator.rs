// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §4.6 Sub-Agent Orchestrator: runs the children validated by
//! [`crate::dispatcher`], concurrently (`spawn_agents`) or one at a time
//! (`spawn_agent_inline`), and folds their `creditsUsed` into the parent
//! exactly once.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use serde::Serialize;
use serde_json::Value;
use sven_model::Message;
use tracing::warn;

use crate::agent_state::AgentState;
use crate::dispatcher::SpawnDescriptor;
use crate::step_loop::{run_agent, AgentOutcome, RunContext};
use crate::template::{AgentTemplate, OutputMode};

/// One child's contribution to a `spawn_agents`/`spawn_agent_inline` tool
/// result, in input-descriptor order (§4.6 ordering guarantee).
#[derive(Debug, Clone, Serialize)]
pub struct ChildOutput {
    #[serde(rename = "agentType")]
    pub agent_type: String,
    pub value: Value,
}

fn extract_output(template: &AgentTemplate, state: &AgentState) -> Value {
    match template.output_mode {
        OutputMode::StructuredOutput => state.output.clone().unwrap_or(Value::Null),
        OutputMode::LastMessage => state
            .message_history
            .iter()
            .rev()
            .find(|m| matches!(m, Message::Assistant { .. }))
            .map(|m| Value::String(m.as_text_lossy()))
            .unwrap_or(Value::Null),
    }
}

fn build_child_state(descriptor: &SpawnDescriptor, child_template: &AgentTemplate, parent_state: &AgentState) -> AgentState {
    let mut child = AgentState::new_child(descriptor.agent_type.clone(), parent_state.steps_remaining, parent_state);

    if child_template.include_message_history {
        child.message_history = parent_state.message_history.clone();
    }
    if let Some(prompt) = &descriptor.prompt {
        child.message_history.push(Message::user(prompt.clone()));
    }
    child
}

/// Runs one validated child to completion and reports its outcome,
/// boxing the recursive call into [`run_agent`] to break the otherwise
/// infinitely-sized mutually-recursive future type.
fn run_one_child<'a>(ctx: &'a RunContext<'a>, child_template: Arc<AgentTemplate>, child_state: AgentState) -> BoxFuture<'a, AgentOutcome> {
    Box::pin(run_agent(ctx, child_template, child_state))
}

/// §4.6 entry point, invoked once the dispatcher has already validated
/// every descriptor against `parent_template.spawnableAgents` and ancestry
/// cycles. Runs children concurrently when `concurrent` is set
/// (`spawn_agents`), otherwise strictly one at a time (`spawn_agent_inline`,
/// always called with a single-element `descriptors`).
pub async fn run_children(
    ctx: &RunContext<'_>,
    parent_template: &AgentTemplate,
    parent_state: &mut AgentState,
    descriptors: Vec<SpawnDescriptor>,
    concurrent: bool,
) -> Vec<ChildOutput> {
    let _ = parent_template;
    let mut resolved = Vec::with_capacity(descriptors.len());
    for descriptor in &descriptors {
        match ctx.registry.get(&descriptor.agent_type) {
            Some(t) => resolved.push((descriptor.clone(), t)),
            None => {
                warn!(agent_type = %descriptor.agent_type, "spawn target has no registered template; skipping");
            }
        }
    }

    let outcomes: Vec<AgentOutcome> = if concurrent {
        let futures = resolved.iter().map(|(descriptor, template)| {
            let child_state = build_child_state(descriptor, template, parent_state);
            run_one_child(ctx, template.clone(), child_state)
        });
        join_all(futures).await
    } else {
        let mut out = Vec::with_capacity(resolved.len());
        for (descriptor, template) in &resolved {
            let child_state = build_child_state(descriptor, template, parent_state);
            out.push(run_one_child(ctx, template.clone(), child_state).await);
        }
        out
    };

    // Fold credits exactly once, after every child has terminated,
    // regardless of whether individual children errored (§4.7 Failure:
    // "a failing child agent does not zero the parent's accumulated
    // creditsUsed; partial costs are preserved").
    let mut results = Vec::with_capacity(outcomes.len());
    for ((descriptor, template), outcome) in resolved.iter().zip(outcomes.into_iter()) {
        parent_state.credits_used += outcome.state.credits_used;
        let value = match &outcome.error {
            None => extract_output(template, &outcome.state),
            Some(e) => serde_json::json!({ "error": e.to_string() }),
        };
        results.push(ChildOutput { agent_type: descriptor.agent_type.clone(), value });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateRegistry;
    use async_trait::async_trait;
    use sven_model::{MockProvider, ToolOutputPart};
    use sven_tools::RemoteToolCollaborator;

    struct NullRemote;

    #[async_trait]
    impl RemoteToolCollaborator for NullRemote {
        async fn request_tool_call(
            &self,
            _tool_name: &str,
            _input: Value,
            _timeout: Option<std::time::Duration>,
            _mcp_config: Option<Value>,
        ) -> anyhow::Result<Vec<ToolOutputPart>> {
            Ok(vec![])
        }
    }

    fn registry_with_reviewer() -> Arc<TemplateRegistry> {
        let mut reg = TemplateRegistry::new();
        reg.register(AgentTemplate::new("reviewer", "mock"));
        Arc::new(reg)
    }

    #[tokio::test]
    async fn concurrent_children_results_ordered_by_descriptor_index() {
        let provider = MockProvider;
        let remote = NullRemote;
        let registry = registry_with_reviewer();
        let ctx = RunContext::new(registry, &provider, &remote);
        let parent_template = AgentTemplate::new("main", "mock").with_spawnable(["reviewer"]);
        let mut parent_state = AgentState::new_top_level("main", 5);

        let descriptors = vec![
            SpawnDescriptor { agent_type: "reviewer".into(), prompt: Some("first".into()), params: None },
            SpawnDescriptor { agent_type: "reviewer".into(), prompt: Some("second".into()), params: None },
        ];

        let results = run_children(&ctx, &parent_template, &mut parent_state, descriptors, true).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].agent_type, "reviewer");
        assert_eq!(results[1].agent_type, "reviewer");
    }

    #[tokio::test]
    async fn credits_fold_into_parent_exactly_once() {
        let provider = MockProvider;
        let remote = NullRemote;
        let registry = registry_with_reviewer();
        let ctx = RunContext::new(registry, &provider, &remote);
        let parent_template = AgentTemplate::new("main", "mock").with_spawnable(["reviewer"]);
        let mut parent_state = AgentState::new_top_level("main", 1);
        parent_state.credits_used = 10;

        let descriptors = vec![SpawnDescriptor { agent_type: "reviewer".into(), prompt: Some("hi".into()), params: None }];
        run_children(&ctx, &parent_template, &mut parent_state, descriptors, false).await;
        // the parent's own pre-existing credits survive, plus exactly the
        // one child's accumulated usage (one step's worth, since the child
        // inherits a 1-step budget from the parent).
        assert_eq!(parent_state.credits_used, 10 + 20);
    }

    #[tokio::test]
    async fn missing_template_is_skipped_without_panicking() {
        let provider = MockProvider;
        let remote = NullRemote;
        let registry = Arc::new(TemplateRegistry::new());
        let ctx = RunContext::new(registry, &provider, &remote);
        let parent_template = AgentTemplate::new("main", "mock").with_spawnable(["ghost"]);
        let mut parent_state = AgentState::new_top_level("main", 5);

        let descriptors = vec![SpawnDescriptor { agent_type: "ghost".into(), prompt: None, params: None }];
        let results = run_children(&ctx, &parent_template, &mut parent_state, descriptors, true).await;
        assert!(results.is_empty());
    }
}

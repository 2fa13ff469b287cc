// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// End-to-end tests driving the public `sven_core` API through the mock
/// model provider: a full `prompt` round trip, two-level cost aggregation
/// across `spawn_agents`, and the context pruner invoked directly.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sven_core::{
    init_session, new_prompt_id, prompt, prune, AgentTemplate, OutputMode, PromptRequest, ResponseChunk, RunContext,
    SessionEvent, TemplateRegistry,
};
use sven_model::{Message, ResponseEvent, ScriptedMockProvider, ToolOutputPart, Usage};
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

#[tokio::test]
async fn prompt_round_trip_emits_response_chunk_and_cost_events() {
    let provider = ScriptedMockProvider::always_text("the answer is 4");
    let remote = NullRemote;
    let registry = Arc::new(TemplateRegistry::new());
    let ctx = RunContext::new(registry, &provider, &remote);
    let template = Arc::new(AgentTemplate::new("main", "mock"));

    let session_state = init_session("main", 3, "fp-1");
    let request = PromptRequest { prompt_id: new_prompt_id(), prompt: "what is 2+2?".into(), prompt_params: None, session_state };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SessionEvent>();
    let response = prompt(&ctx, template, request, Some(tx)).await;
    drop(ctx);

    let mut saw_text = false;
    let mut saw_cost = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            SessionEvent::ResponseChunk { chunk: ResponseChunk::Text { text }, .. } => {
                assert!(text.contains("the answer is 4"));
                saw_text = true;
            }
            SessionEvent::MessageCostResponse { credits, .. } => {
                assert!(credits > 0);
                saw_cost = true;
            }
            _ => {}
        }
    }
    assert!(saw_text, "expected a response-chunk text event");
    assert!(saw_cost, "expected a message-cost-response event");
    assert!(response.error.is_none());
}

/// §8 scenario 5: main spawns one child via `spawn_agents`; the child
/// itself runs a scripted step of its own before ending its turn. The
/// parent's final `creditsUsed` must equal its own usage plus the child's,
/// folded in exactly once.
///
/// The orchestrator drives the spawned child through [`sven_core::run_agent`]
/// using the *same* `RunContext` (and therefore the same model-provider
/// instance) as the parent, so all scripted calls share one queue, drained
/// in actual call order: the parent's `spawn_agents` step, then the
/// child's own step(s) (awaited to completion before the parent's loop
/// resumes), then the parent's final `end_turn` step.
#[tokio::test]
async fn two_level_spawn_aggregates_child_credits_into_parent_exactly_once() {
    fn usage_event(input: u32, output: u32) -> ResponseEvent {
        ResponseEvent::Usage(Usage { input_tokens: input, output_tokens: output, cache_read_tokens: 0, cache_write_tokens: 0 })
    }

    let provider = ScriptedMockProvider::new(vec![
        // 1. Parent step: spawns the reviewer, costing 6+4=10 credits.
        vec![
            ResponseEvent::ToolCall {
                tool_call_id: "spawn-1".into(),
                tool_name: "spawn_agents".into(),
                input: json!({ "agents": [{ "agentType": "reviewer", "prompt": "review this" }] }),
            },
            usage_event(6, 4),
            ResponseEvent::Done,
        ],
        // 2. Child's first step: plain text, costing 3+4=7 credits, no tool
        //    call, so the child's own loop takes a second step.
        vec![ResponseEvent::TextDelta { text: "working".into() }, usage_event(3, 4), ResponseEvent::Done],
        // 3. Child's second step: end_turn, no further usage.
        vec![
            ResponseEvent::ToolCall { tool_call_id: "c-end".into(), tool_name: "end_turn".into(), input: json!({}) },
            ResponseEvent::Done,
        ],
        // 4. Parent's final step, resumed after the child completes: end_turn.
        vec![
            ResponseEvent::ToolCall { tool_call_id: "p-end".into(), tool_name: "end_turn".into(), input: json!({}) },
            ResponseEvent::Done,
        ],
    ]);

    let mut registry = TemplateRegistry::new();
    registry.register(AgentTemplate::new("reviewer", "mock").with_tools(["end_turn"]).with_output_mode(OutputMode::LastMessage));
    let registry = Arc::new(registry);

    let remote = NullRemote;
    let ctx = RunContext::new(registry, &provider, &remote);
    let parent_template =
        Arc::new(AgentTemplate::new("main", "mock").with_spawnable(["reviewer"]).with_tools(["spawn_agents", "end_turn"]));

    let mut parent_state = sven_core::AgentState::new_top_level("main", 5);
    parent_state.message_history.push(Message::user("please review"));

    let outcome = sven_core::run_agent(&ctx, parent_template, parent_state).await;
    assert!(outcome.error.is_none());
    assert!(outcome.state.steps_complete);
    assert_eq!(outcome.state.credits_used, 10 + 7);
}

#[tokio::test]
async fn pruner_fast_path_is_directly_reachable_from_the_public_api() {
    let history = vec![Message::user("hi"), Message::assistant("hello!")];
    let outcome = prune(&history, 200_000, 5);
    assert_eq!(outcome.messages.len(), history.len());
    assert!(outcome.warning.is_none());
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §4.5 Tool Dispatcher: classifies a collected tool-call chunk as local,
//! remote, or unknown and executes it. Local tools mutate [`AgentState`]
//! in-process; `spawn_agents`/`spawn_agent_inline` are parsed here but
//! actually run by [`crate::orchestrator`], which owns the template
//! registry and model provider the dispatcher itself has no need of.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sven_model::Message;
use sven_tools::{events::TodoItem, is_local_tool, RemoteToolCollaborator, ToolCall, ToolOutput};

use crate::agent_state::AgentState;
use crate::errors::ToolDispatchError;
use crate::template::AgentTemplate;

/// One child descriptor parsed out of a `spawn_agents`/`spawn_agent_inline`
/// call, ready to be validated and handed to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnDescriptor {
    #[serde(rename = "agentType")]
    pub agent_type: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SpawnAgentsInput {
    agents: Vec<SpawnDescriptor>,
}

/// What the dispatcher decided to do with one tool call.
pub enum DispatchResult {
    /// The call is fully resolved; append this as the `tool` message.
    Output(ToolOutput),
    /// `spawn_agents`: run every descriptor concurrently, in parallel.
    SpawnConcurrent { tool_call_id: String, descriptors: Vec<SpawnDescriptor> },
    /// `spawn_agent_inline`: run exactly one descriptor, blocking the
    /// parent's loop until it completes.
    SpawnInline { tool_call_id: String, descriptor: SpawnDescriptor },
}

fn validate_spawn(template: &AgentTemplate, state: &AgentState, agent_type: &str) -> Result<(), ToolDispatchError> {
    if !template.spawnable_agents.contains(agent_type) {
        return Err(ToolDispatchError::AgentNotSpawnable {
            agent_type: template.id.clone(),
            child_type: agent_type.to_string(),
        });
    }
    if state.would_cycle(agent_type) {
        return Err(ToolDispatchError::Cycle { child_type: agent_type.to_string() });
    }
    Ok(())
}

fn error_output(tool_call_id: &str, err: ToolDispatchError) -> ToolOutput {
    ToolOutput::err(tool_call_id, err.to_string())
}

/// Dispatches one collected tool call (§4.5). Returns a [`DispatchResult`]
/// rather than mutating `state` for `spawn_*` calls, since those require
/// running child agents asynchronously before a result exists; every other
/// local tool is applied to `state` directly before returning.
pub async fn dispatch(
    call: &ToolCall,
    template: &AgentTemplate,
    state: &mut AgentState,
    remote: &dyn RemoteToolCollaborator,
    timeout: Option<Duration>,
    mcp_config: Option<Value>,
) -> DispatchResult {
    if !template.tool_names.contains(&call.tool_name) && !is_local_tool(&call.tool_name) {
        return DispatchResult::Output(error_output(
            &call.tool_call_id,
            ToolDispatchError::ToolNotPermitted { agent_type: template.id.clone(), tool_name: call.tool_name.clone() },
        ));
    }

    match call.tool_name.as_str() {
        "set_messages" => dispatch_set_messages(call, state),
        "add_message" => dispatch_add_message(call, state),
        "set_output" => dispatch_set_output(call, state, template),
        "end_turn" => dispatch_end_turn(call, state),
        "write_todos" => dispatch_write_todos(call, state),
        "spawn_agents" => dispatch_spawn_agents(call, template, state),
        "spawn_agent_inline" => dispatch_spawn_agent_inline(call, template, state),
        _ if is_local_tool(&call.tool_name) => {
            unreachable!("every local tool name is handled above")
        }
        _ => dispatch_remote(call, remote, timeout, mcp_config).await,
    }
}

fn dispatch_set_messages(call: &ToolCall, state: &mut AgentState) -> DispatchResult {
    let messages: Vec<Message> = match call.input.get("messages").cloned().map(serde_json::from_value) {
        Some(Ok(m)) => m,
        _ => {
            return DispatchResult::Output(ToolOutput::err(&call.tool_call_id, "set_messages requires a `messages` array"));
        }
    };
    let count = messages.len();
    state.message_history = messages;
    DispatchResult::Output(ToolOutput::ok(&call.tool_call_id, serde_json::json!({ "updated": true, "count": count })))
}

fn dispatch_add_message(call: &ToolCall, state: &mut AgentState) -> DispatchResult {
    match serde_json::from_value::<Message>(call.input.clone()) {
        Ok(message) => {
            state.message_history.push(message);
            DispatchResult::Output(ToolOutput::ok(&call.tool_call_id, serde_json::json!({ "added": true })))
        }
        Err(e) => DispatchResult::Output(ToolOutput::err(&call.tool_call_id, format!("add_message: invalid message: {e}"))),
    }
}

fn dispatch_set_output(call: &ToolCall, state: &mut AgentState, template: &AgentTemplate) -> DispatchResult {
    let value = call.input.get("value").cloned().unwrap_or_else(|| call.input.clone());
    state.output = Some(value);
    // set_output alone never ends the turn unless outputMode = structured_output
    // AND the template itself calls end_turn; this tool only records the value.
    let _ = template;
    DispatchResult::Output(ToolOutput::ok(&call.tool_call_id, serde_json::json!({ "set": true })))
}

fn dispatch_end_turn(call: &ToolCall, state: &mut AgentState) -> DispatchResult {
    state.steps_complete = true;
    DispatchResult::Output(ToolOutput::ok(&call.tool_call_id, serde_json::json!({ "ended": true })))
}

fn dispatch_write_todos(call: &ToolCall, state: &mut AgentState) -> DispatchResult {
    let todos: Vec<TodoItem> = match call.input.get("todos").cloned().map(serde_json::from_value) {
        Some(Ok(t)) => t,
        _ => {
            return DispatchResult::Output(ToolOutput::err(&call.tool_call_id, "write_todos requires a `todos` array"));
        }
    };
    state.todos = todos.clone();
    DispatchResult::Output(ToolOutput::ok(&call.tool_call_id, serde_json::json!({ "todos": todos })))
}

fn dispatch_spawn_agents(call: &ToolCall, template: &AgentTemplate, state: &AgentState) -> DispatchResult {
    let parsed: SpawnAgentsInput = match serde_json::from_value(call.input.clone()) {
        Ok(p) => p,
        Err(e) => {
            return DispatchResult::Output(ToolOutput::err(&call.tool_call_id, format!("spawn_agents: invalid input: {e}")));
        }
    };
    for d in &parsed.agents {
        if let Err(err) = validate_spawn(template, state, &d.agent_type) {
            return DispatchResult::Output(error_output(&call.tool_call_id, err));
        }
    }
    DispatchResult::SpawnConcurrent { tool_call_id: call.tool_call_id.clone(), descriptors: parsed.agents }
}

fn dispatch_spawn_agent_inline(call: &ToolCall, template: &AgentTemplate, state: &AgentState) -> DispatchResult {
    let descriptor: SpawnDescriptor = match serde_json::from_value(call.input.clone()) {
        Ok(d) => d,
        Err(e) => {
            return DispatchResult::Output(ToolOutput::err(&call.tool_call_id, format!("spawn_agent_inline: invalid input: {e}")));
        }
    };
    if let Err(err) = validate_spawn(template, state, &descriptor.agent_type) {
        return DispatchResult::Output(error_output(&call.tool_call_id, err));
    }
    DispatchResult::SpawnInline { tool_call_id: call.tool_call_id.clone(), descriptor }
}

async fn dispatch_remote(
    call: &ToolCall,
    remote: &dyn RemoteToolCollaborator,
    timeout: Option<Duration>,
    mcp_config: Option<Value>,
) -> DispatchResult {
    let call_future = remote.request_tool_call(&call.tool_name, call.input.clone(), timeout, mcp_config);

    let result = match timeout {
        Some(duration) => match tokio::time::timeout(duration, call_future).await {
            Ok(inner) => inner,
            Err(_elapsed) => {
                let dispatch_err = ToolDispatchError::ToolTimeout { tool_name: call.tool_name.clone() };
                return DispatchResult::Output(ToolOutput::err(&call.tool_call_id, format!("{dispatch_err}")));
            }
        },
        None => call_future.await,
    };

    match result {
        Ok(parts) => DispatchResult::Output(ToolOutput::with_parts(&call.tool_call_id, parts)),
        Err(e) => {
            let dispatch_err = ToolDispatchError::RemoteToolFailed { tool_name: call.tool_name.clone() };
            DispatchResult::Output(ToolOutput::err(&call.tool_call_id, format!("{dispatch_err}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sven_model::ToolOutputPart;

    struct NullRemote;

    #[async_trait]
    impl RemoteToolCollaborator for NullRemote {
        async fn request_tool_call(
            &self,
            _tool_name: &str,
            _input: Value,
            _timeout: Option<Duration>,
            _mcp_config: Option<Value>,
        ) -> anyhow::Result<Vec<ToolOutputPart>> {
            Ok(vec![ToolOutputPart::Json { value: serde_json::json!({"ok": true}), cache_control: false }])
        }
    }

    fn test_template() -> AgentTemplate {
        AgentTemplate::new("main", "mock")
            .with_tools(["read_files"])
            .with_spawnable(["reviewer"])
    }

    #[tokio::test]
    async fn unknown_tool_name_is_rejected_as_not_permitted() {
        let template = test_template();
        let mut state = AgentState::new_top_level("main", 10);
        let remote = NullRemote;
        let call = ToolCall { tool_call_id: "c1".into(), tool_name: "delete_everything".into(), input: serde_json::json!({}) };
        let result = dispatch(&call, &template, &mut state, &remote, None, None).await;
        match result {
            DispatchResult::Output(out) => assert!(out.is_error),
            _ => panic!("expected an Output"),
        }
    }

    #[tokio::test]
    async fn set_messages_overwrites_history() {
        let template = test_template();
        let mut state = AgentState::new_top_level("main", 10);
        let remote = NullRemote;
        let call = ToolCall {
            tool_call_id: "c1".into(),
            tool_name: "set_messages".into(),
            input: serde_json::json!({ "messages": [{"role": "user", "content": "hi"}] }),
        };
        let result = dispatch(&call, &template, &mut state, &remote, None, None).await;
        assert!(matches!(result, DispatchResult::Output(_)));
        assert_eq!(state.message_history.len(), 1);
    }

    #[tokio::test]
    async fn end_turn_sets_steps_complete() {
        let template = test_template();
        let mut state = AgentState::new_top_level("main", 10);
        let remote = NullRemote;
        let call = ToolCall { tool_call_id: "c1".into(), tool_name: "end_turn".into(), input: serde_json::json!({}) };
        dispatch(&call, &template, &mut state, &remote, None, None).await;
        assert!(state.steps_complete);
    }

    #[tokio::test]
    async fn spawn_agents_with_unspawnable_type_is_rejected() {
        let template = test_template();
        let mut state = AgentState::new_top_level("main", 10);
        let remote = NullRemote;
        let call = ToolCall {
            tool_call_id: "c1".into(),
            tool_name: "spawn_agents".into(),
            input: serde_json::json!({ "agents": [{"agentType": "tester"}] }),
        };
        let result = dispatch(&call, &template, &mut state, &remote, None, None).await;
        match result {
            DispatchResult::Output(out) => assert!(out.is_error),
            _ => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn spawn_agent_inline_with_cycle_is_rejected() {
        let template = test_template().with_spawnable(["main"]);
        let state = AgentState::new_top_level("main", 10);
        let remote = NullRemote;
        let call = ToolCall {
            tool_call_id: "c1".into(),
            tool_name: "spawn_agent_inline".into(),
            input: serde_json::json!({ "agentType": "main" }),
        };
        let mut state_mut = state;
        let result = dispatch(&call, &template, &mut state_mut, &remote, None, None).await;
        match result {
            DispatchResult::Output(out) => assert!(out.is_error),
            _ => panic!("expected cycle rejection"),
        }
    }

    #[tokio::test]
    async fn remote_tool_forwards_to_collaborator() {
        let template = test_template();
        let mut state = AgentState::new_top_level("main", 10);
        let remote = NullRemote;
        let call = ToolCall { tool_call_id: "c1".into(), tool_name: "read_files".into(), input: serde_json::json!({}) };
        let result = dispatch(&call, &template, &mut state, &remote, None, None).await;
        match result {
            DispatchResult::Output(out) => assert!(!out.is_error),
            _ => panic!("expected an Output"),
        }
    }
}

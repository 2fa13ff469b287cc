// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §6 External Interfaces: the session output events a collaborator (CI
//! runner, TUI, server) subscribes to in order to drive its own output,
//! plus the small set of request shapes the Session Authority accepts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::orchestrator::ChildOutput;
use crate::session::SessionState;

/// One streamed unit of an agent's output, shared by `response-chunk` and
/// `subagent-response-chunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseChunk {
    Text { text: String },
    Reasoning { text: String },
    ToolCall { tool_call_id: String, tool_name: String, input: Value },
}

/// Events emitted to the client while a `prompt` is being serviced (§6
/// Session outputs). Consumers subscribe to these the way the donor's own
/// `AgentEvent` subscribers do.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SessionEvent {
    ResponseChunk { user_input_id: String, chunk: ResponseChunk },
    SubagentResponseChunk {
        user_input_id: String,
        agent_id: String,
        agent_type: String,
        chunk: ResponseChunk,
        #[serde(skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        forward_to_prompt: Option<bool>,
    },
    ToolCallRequest {
        user_input_id: String,
        request_id: String,
        tool_name: String,
        input: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mcp_config: Option<Value>,
    },
    PromptResponse {
        prompt_id: String,
        session_state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_results: Option<Vec<ChildOutput>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    MessageCostResponse {
        prompt_id: String,
        credits: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
    },
    PromptError {
        user_input_id: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        remaining_balance: Option<u64>,
    },
}

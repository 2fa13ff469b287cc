// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;
use sven_model::ToolOutputPart;

/// The client-side collaborator the Tool Dispatcher forwards every
/// non-local tool call to. Implementations live outside this crate (the
/// concrete remote execution surface is out of scope for the runtime
/// core); this crate owns only the boundary contract.
#[async_trait]
pub trait RemoteToolCollaborator: Send + Sync {
    /// Execute `tool_name` with `input` and return its ordered output
    /// parts. `timeout` is the caller-specified per-call timeout, if any;
    /// implementations should surface an expiry as `Err` so the dispatcher
    /// can map it to a `ToolTimeoutError` tool result.
    async fn request_tool_call(
        &self,
        tool_name: &str,
        input: Value,
        timeout: Option<std::time::Duration>,
        mcp_config: Option<Value>,
    ) -> anyhow::Result<Vec<ToolOutputPart>>;
}

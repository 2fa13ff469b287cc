// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The error taxonomy of §7. Errors that occur while dispatching a single
//! tool call are demoted to an error-tagged [`sven_tools::ToolOutput`]
//! instead of propagating (see [`ToolDispatchError`]); everything else
//! bubbles up through `anyhow::Result` at the step-loop/orchestrator
//! boundary, matching the donor's own convention of `thiserror` enums for
//! matchable variants plus `anyhow::Context` at call sites.

use thiserror::Error;

/// Subset of the taxonomy the Tool Dispatcher converts to a tool-result
/// payload rather than propagating, per §7: "errors within tool execution
/// are demoted to tool-result payloads so that the assistant may observe
/// and react."
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolDispatchError {
    #[error("tool {tool_name:?} is not permitted for agent template {agent_type:?}")]
    ToolNotPermitted { agent_type: String, tool_name: String },

    #[error("agent type {child_type:?} is not spawnable by template {agent_type:?}")]
    AgentNotSpawnable { agent_type: String, child_type: String },

    #[error("spawning {child_type:?} would create an ancestor cycle")]
    Cycle { child_type: String },

    #[error("tool call {tool_name:?} timed out")]
    ToolTimeout { tool_name: String },

    #[error("remote tool call {tool_name:?} failed")]
    RemoteToolFailed { tool_name: String },
}

/// Errors that propagate upward out of the Agent Step Loop instead of being
/// demoted to a tool result: stream failures, orchestrator failures, and
/// cancellation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The LLM collaborator failed after the Stream Adapter's retry budget
    /// was exhausted. Surfaced to the client as `prompt-error`.
    #[error("stream failed after {attempts} attempt(s): {source}")]
    Stream {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The abort signal fired. Not reported as a client-visible failure
    /// beyond the top-level response reflecting the partial state.
    #[error("agent run was canceled")]
    Canceled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// `stepsRemaining` reached 0 while `stepsComplete` was false. This is a
/// graceful, non-error termination path (§7): the loop stops with whatever
/// output exists rather than returning an `Err`. Modeled as a plain value
/// rather than a `RuntimeError` variant so callers cannot accidentally
/// `?`-propagate it as a client-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhausted;

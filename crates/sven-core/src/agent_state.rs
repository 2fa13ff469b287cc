// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §3 AgentState: the per-agent-instance record the step loop mutates.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sven_model::Message;
use uuid::Uuid;

use sven_tools::events::TodoItem;

/// Per-agent-instance record (§3). Parent-child linkage is maintained only
/// through `ancestors`, never through pointers (§9), so an `AgentState` can
/// be constructed, serialized, and handed across task boundaries without
/// borrowing anything from its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_type: String,
    pub agent_id: String,
    pub message_history: Vec<Message>,
    pub steps_remaining: u32,
    /// Server-authoritative; reset to 0 on session entry (top-level) or on
    /// construction (nested). Never read client-submitted values back in.
    pub credits_used: u64,
    pub output: Option<Value>,
    pub steps_complete: bool,
    /// Ancestor template ids along this agent's spawn lineage (see
    /// [`AgentState::new_child`] for why this tracks types, not instance
    /// ids), used by §4.6 cycle detection.
    pub ancestors: Vec<String>,
    /// Bookkeeping populated by the `write_todos` local tool; surfaced to
    /// the client as a `TodoUpdate`-shaped output, no effect on
    /// `steps_complete`.
    #[serde(default)]
    pub todos: Vec<TodoItem>,
}

impl AgentState {
    /// Construct a fresh top-level agent state. `credits_used` always
    /// starts at 0 regardless of anything a client submitted (§3
    /// lifecycle, §6 `prompt` input).
    pub fn new_top_level(agent_type: impl Into<String>, steps_remaining: u32) -> Self {
        Self {
            agent_type: agent_type.into(),
            agent_id: Uuid::new_v4().to_string(),
            message_history: Vec::new(),
            steps_remaining,
            credits_used: 0,
            output: None,
            steps_complete: false,
            ancestors: Vec::new(),
            todos: Vec::new(),
        }
    }

    /// Construct a child state whose `ancestors` is the parent's ancestors
    /// plus the parent's own template id (§4.6).
    ///
    /// §4.6 detects cycles by asking whether a spawn target's `agent_type`
    /// already appears in the parent's lineage. A list of instance ids
    /// (each one a fresh UUID, never repeating) could never answer that
    /// question, so despite the field's name this tracks ancestor template
    /// ids, not ancestor run ids — the only reading of §3 that makes the
    /// §4.6 cycle check implementable.
    pub fn new_child(agent_type: impl Into<String>, steps_remaining: u32, parent: &AgentState) -> Self {
        let mut ancestors = parent.ancestors.clone();
        ancestors.push(parent.agent_type.clone());
        Self {
            agent_type: agent_type.into(),
            agent_id: Uuid::new_v4().to_string(),
            message_history: Vec::new(),
            steps_remaining,
            credits_used: 0,
            output: None,
            steps_complete: false,
            ancestors,
            todos: Vec::new(),
        }
    }

    /// Whether `agent_type` already appears among this agent's own type or
    /// its ancestor types (§4.6 cycle detection).
    pub fn would_cycle(&self, candidate_type: &str) -> bool {
        self.agent_type == candidate_type || self.ancestors.iter().any(|a| a == candidate_type)
    }
}

/// Reset applied to a client-submitted `sessionState` before a top-level
/// run begins (§6): the client's `creditsUsed` is advisory only.
pub fn reset_server_authoritative_fields(state: &mut AgentState) {
    state.credits_used = 0;
}

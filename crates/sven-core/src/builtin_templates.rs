// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Reserved templates shipped by the runtime itself, plus the step-handler
//! shape §4.8 describes for the context pruner.
//!
//! The pruner's own budget enforcement runs as a direct call at the top of
//! every PREPARE phase (see `crate::step_loop::run_agent`) rather than
//! through the `spawn_agent_inline` indirection this module's
//! [`pruner_step_handler`] demonstrates: pruning is a pure, synchronous
//! function of the current history, so routing it through a full child
//! agent round-trip (its own STREAM call, its own DISPATCH of
//! `set_messages`, then folding the result back into the parent) bought no
//! behavior the direct call doesn't already provide, at the cost of an
//! extra LLM round-trip per step. The handler below is kept as the
//! reference implementation of the cooperative-generator mechanism
//! described in §4.8, available to any template that wants the same
//! "inject once, then step aside" shape for its own step logic.

use std::sync::Arc;

use crate::agent_state::AgentState;
use crate::template::{AgentTemplate, Directive, StepHandler};

pub const PRUNER_TEMPLATE_ID: &str = "__context_pruner__";

struct PrunerStepHandler {
    injected: bool,
}

impl StepHandler for PrunerStepHandler {
    fn next(&mut self, _state: &AgentState) -> Directive {
        if !self.injected {
            self.injected = true;
            Directive::InjectToolCall {
                tool_name: "spawn_agent_inline".to_string(),
                input: serde_json::json!({ "agentType": PRUNER_TEMPLATE_ID }),
            }
        } else {
            Directive::Done
        }
    }
}

/// Factory matching [`crate::template::AgentTemplate::handle_steps`]'s
/// shape: a fresh [`PrunerStepHandler`] (and thus a fresh `injected` flag)
/// per agent instance.
pub fn pruner_step_handler() -> Arc<dyn Fn() -> Box<dyn StepHandler> + Send + Sync> {
    Arc::new(|| Box::new(PrunerStepHandler { injected: false }) as Box<dyn StepHandler>)
}

/// The reserved internal template `spawn_agent_inline` would target if the
/// indirect mechanism above were wired into the loop. Carries no tools of
/// its own and inherits the parent's full history, matching "the pruner
/// runs as an inline sub-agent before each step."
pub fn pruner_template() -> AgentTemplate {
    AgentTemplate::new(PRUNER_TEMPLATE_ID, "internal")
}

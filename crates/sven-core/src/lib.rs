// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod agent_state;
mod builtin_templates;
mod cache_control;
mod dispatcher;
mod errors;
mod events;
mod orchestrator;
mod pruner;
mod session;
mod stream_adapter;
mod step_loop;
mod template;
mod token_counter;

pub use agent_state::AgentState;
pub use builtin_templates::{pruner_step_handler, pruner_template, PRUNER_TEMPLATE_ID};
pub use cache_control::apply_cache_control;
pub use dispatcher::{dispatch, DispatchResult, SpawnDescriptor};
pub use errors::{BudgetExhausted, RuntimeError, ToolDispatchError};
pub use events::{ResponseChunk, SessionEvent};
pub use orchestrator::{run_children, ChildOutput};
pub use pruner::{prune, PruneOutcome, PruneWarning, DEFAULT_MAX_MESSAGE_TOKENS, DEFAULT_NUM_TERMINAL_COMMANDS_TO_KEEP};
pub use session::{init_session, new_prompt_id, prompt, ProjectFileContext, PromptRequest, PromptResponse, SessionState};
pub use step_loop::{run_agent, AgentOutcome, RunContext};
pub use template::{AgentTemplate, Directive, NullStepHandler, OutputMode, StepHandler, TemplateRegistry};
pub use token_counter::{count_tokens, count_tokens_of, count_tokens_str};

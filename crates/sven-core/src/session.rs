// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Session Authority (§6): owns the `sessionState` envelope across
//! `prompt` calls, enforces the server-authoritative `creditsUsed` reset,
//! and is the top-level entry point the binary / any collaborator drives.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sven_model::Message;
use uuid::Uuid;

use crate::agent_state::{reset_server_authoritative_fields, AgentState};
use crate::errors::RuntimeError;
use crate::events::{ResponseChunk, SessionEvent};
use crate::step_loop::{run_agent, RunContext};
use crate::template::AgentTemplate;

/// Opaque, passthrough project context (§6: deciding which files are
/// relevant is delegated to a file-finder collaborator; this crate only
/// carries whatever blob that collaborator handed it at `init` time).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFileContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, String>,
}

/// The persisted envelope (§6 "Persisted state layout"), opaque beyond
/// this schema to everything outside the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub main_agent_state: AgentState,
    #[serde(default)]
    pub file_context: ProjectFileContext,
}

impl SessionState {
    pub fn new(main_template_id: impl Into<String>, steps_remaining: u32) -> Self {
        Self {
            main_agent_state: AgentState::new_top_level(main_template_id, steps_remaining),
            file_context: ProjectFileContext::default(),
        }
    }
}

/// `prompt(...)` input (§6 Session inputs), trimmed to the fields this
/// crate actually interprets; `costMode`/`fingerprintId`/`repoUrl` are
/// forwarded to collaborators the runtime doesn't itself inspect.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub prompt_id: String,
    pub prompt: String,
    pub prompt_params: Option<Value>,
    pub session_state: SessionState,
}

#[derive(Debug, Clone)]
pub struct PromptResponse {
    pub prompt_id: String,
    pub session_state: SessionState,
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// §6 `prompt`: resets `creditsUsed` to 0 (server-authoritative, client
/// value is advisory only), seeds the user's prompt into the main agent's
/// history, runs the step loop to completion, and returns the updated
/// envelope. Emits `response-chunk`/`message-cost-response`/`prompt-error`
/// events on `emitter` as the run progresses, matching the donor's own
/// pattern of an `AgentEvent` channel the caller subscribes to.
pub async fn prompt(
    ctx: &RunContext<'_>,
    template: Arc<AgentTemplate>,
    mut request: PromptRequest,
    emitter: Option<tokio::sync::mpsc::UnboundedSender<SessionEvent>>,
) -> PromptResponse {
    reset_server_authoritative_fields(&mut request.session_state.main_agent_state);

    let mut state = request.session_state.main_agent_state;
    state.message_history.push(Message::user(request.prompt.clone()));
    if let Some(params) = &request.prompt_params {
        state.message_history.push(Message::user(format!("params: {params}")));
    }

    let outcome = run_agent(ctx, template, state).await;

    if let Some(tx) = &emitter {
        let is_top_level = outcome.state.ancestors.is_empty();
        if is_top_level {
            if let Some(text) = last_assistant_text(&outcome.state) {
                let _ = tx.send(SessionEvent::ResponseChunk {
                    user_input_id: request.prompt_id.clone(),
                    chunk: ResponseChunk::Text { text },
                });
            }
        }
        let _ = tx.send(SessionEvent::MessageCostResponse {
            prompt_id: request.prompt_id.clone(),
            credits: outcome.state.credits_used,
            agent_id: Some(outcome.state.agent_id.clone()),
        });
        if let Some(err) = &outcome.error {
            let _ = tx.send(SessionEvent::PromptError {
                user_input_id: request.prompt_id.clone(),
                message: err.to_string(),
                error: Some(format!("{err:?}")),
                remaining_balance: None,
            });
        }
    }

    let error = outcome.error.as_ref().map(RuntimeError::to_string);
    let output = outcome.state.output.clone();

    PromptResponse {
        prompt_id: request.prompt_id,
        session_state: SessionState { main_agent_state: outcome.state, file_context: request.session_state.file_context },
        output,
        error,
    }
}

fn last_assistant_text(state: &AgentState) -> Option<String> {
    state
        .message_history
        .iter()
        .rev()
        .find(|m| matches!(m, Message::Assistant { .. }))
        .map(|m| m.as_text_lossy())
}

/// `init(fingerprintId, fileContext)` (§6): registers session context
/// ahead of the first `prompt` call.
pub fn init_session(main_template_id: impl Into<String>, steps_remaining: u32, fingerprint_id: impl Into<String>) -> SessionState {
    let mut session = SessionState::new(main_template_id, steps_remaining);
    session.file_context.fingerprint_id = Some(fingerprint_id.into());
    session
}

pub fn new_prompt_id() -> String {
    Uuid::new_v4().to_string()
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

    #[tokio::test]
    async fn prompt_resets_client_submitted_credits_before_running() {
        let provider = MockProvider;
        let remote = NullRemote;
        let registry = Arc::new(TemplateRegistry::new());
        let ctx = RunContext::new(registry, &provider, &remote);
        let template = Arc::new(AgentTemplate::new("main", "mock"));

        let mut session_state = SessionState::new("main", 1);
        session_state.main_agent_state.credits_used = 999_999;

        let request = PromptRequest { prompt_id: "p1".into(), prompt: "hello".into(), prompt_params: None, session_state };
        let response = prompt(&ctx, template, request, None).await;

        assert!(response.session_state.main_agent_state.credits_used < 1_000);
        assert!(response.session_state.main_agent_state.credits_used > 0);
    }

    #[tokio::test]
    async fn prompt_seeds_user_message_into_history() {
        let provider = MockProvider;
        let remote = NullRemote;
        let registry = Arc::new(TemplateRegistry::new());
        let ctx = RunContext::new(registry, &provider, &remote);
        let template = Arc::new(AgentTemplate::new("main", "mock"));

        let request = PromptRequest {
            prompt_id: "p1".into(),
            prompt: "what is 2+2?".into(),
            prompt_params: None,
            session_state: SessionState::new("main", 1),
        };
        let response = prompt(&ctx, template, request, None).await;
        let has_prompt = response
            .session_state
            .main_agent_state
            .message_history
            .iter()
            .any(|m| m.as_text_lossy().contains("what is 2+2?"));
        assert!(has_prompt);
    }
}

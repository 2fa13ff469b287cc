// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Headless entry point: loads configuration, assembles a template
//! registry and a model provider, and drives a single `prompt` through
//! the Session Authority, printing the resulting session events as
//! newline-delimited JSON to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use async_trait::async_trait;
use serde_json::Value;
use sven_core::{init_session, new_prompt_id, prompt, AgentTemplate, PromptRequest, RunContext, SessionEvent, TemplateRegistry};
use sven_tools::RemoteToolCollaborator;

#[derive(Parser, Debug)]
#[command(name = "sven-runtime", about = "Headless multi-agent step-loop runner")]
struct Cli {
    /// The prompt text to run through the main agent template.
    prompt: String,

    /// Template id to run; must be registered by this binary or the
    /// session's local templates.
    #[arg(long, default_value = "main")]
    agent_type: String,

    /// Explicit config file path, in addition to the usual search path.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum steps the top-level agent may take before the budget is
    /// considered exhausted.
    #[arg(long, default_value_t = 20)]
    max_steps: u32,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// No outbound tool surface of its own — every non-local tool call is
/// rejected with a timeout-shaped error, matching a headless run with no
/// client attached to service remote tools.
struct NoRemoteCollaborator;

#[async_trait]
impl RemoteToolCollaborator for NoRemoteCollaborator {
    async fn request_tool_call(
        &self,
        tool_name: &str,
        _input: Value,
        _timeout: Option<std::time::Duration>,
        _mcp_config: Option<Value>,
    ) -> anyhow::Result<Vec<sven_model::ToolOutputPart>> {
        anyhow::bail!("no remote tool collaborator attached to service {tool_name:?}")
    }
}

fn default_registry() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    registry.register(AgentTemplate::new("main", "mock").with_system_prompt(
        "You are the main agent of a headless run. Use the tools available to you \
         and call end_turn once you have a final answer.",
    ));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = sven_config::load(cli.config.as_deref()).context("loading configuration")?;
    let provider = sven_model::from_config(&config.model).context("constructing model provider")?;
    let remote = NoRemoteCollaborator;
    let registry = Arc::new(default_registry());

    let template = registry
        .get(&cli.agent_type)
        .with_context(|| format!("no registered template named {:?}", cli.agent_type))?;

    let mut ctx = RunContext::new(registry.clone(), provider.as_ref(), &remote);
    ctx.max_message_tokens = config.runtime.max_message_tokens;
    ctx.num_terminal_commands_to_keep = config.runtime.num_terminal_commands_to_keep;

    let session_state = init_session(cli.agent_type.clone(), cli.max_steps, "headless");
    let request = PromptRequest {
        prompt_id: new_prompt_id(),
        prompt: cli.prompt,
        prompt_params: None,
        session_state,
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<SessionEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                println!("{line}");
            }
        }
    });

    let response = prompt(&ctx, template, request, Some(tx)).await;
    drop(ctx);
    let _ = printer.await;

    if let Some(err) = &response.error {
        eprintln!("run ended with error: {err}");
    }
    if let Some(output) = &response.output {
        println!("{}", serde_json::to_string(output)?);
    }

    Ok(())
}

/// Mirrors the donor's own suppress-unless-opted-in logging policy, minus
/// the TUI branch this binary has no use for: logs go to stderr only when
/// `--verbose`/`RUST_LOG` asks for them, so stdout stays clean newline-
/// delimited JSON for a calling collaborator to parse.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(true)).with(filter).try_init();
}

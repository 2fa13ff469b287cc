// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §4.2 Context Pruner: a three-pass shrinker over a message list. Pure
//! and deterministic — no I/O, no model calls — so the step loop (and the
//! pruner step handler in [`crate::pruner_step_handler`]) can invoke it
//! synchronously.

use serde_json::json;
use sven_model::{Message, ToolOutputPart};
use tracing::warn;

use crate::token_counter::count_tokens_of;

pub const DEFAULT_MAX_MESSAGE_TOKENS: usize = 200_000;
pub const DEFAULT_NUM_TERMINAL_COMMANDS_TO_KEEP: usize = 5;

const LARGE_RESULT_THRESHOLD_CHARS: usize = 1_000;
const PLACEHOLDER_TEXT: &str = "<system>Previous message(s) omitted due to length</system>";
const TERMINAL_COMMAND_TOOL_NAME: &str = "run_terminal_command";

/// Surfaced when pass 3 exhausts the history without reaching its removal
/// target (§9 resolved open question): the pruner never throws, it just
/// warns and returns the still-over-budget history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneWarning {
    pub max_message_tokens: usize,
    pub tokens_after_pruning: usize,
}

#[derive(Debug, Clone)]
pub struct PruneOutcome {
    pub messages: Vec<Message>,
    pub warning: Option<PruneWarning>,
}

fn message_tokens(m: &Message) -> usize {
    count_tokens_of(m)
}

fn history_tokens(history: &[Message]) -> usize {
    history.iter().map(message_tokens).sum()
}

/// §4.2 entry point. Executes passes in order, stopping at the first whose
/// result fits the budget.
pub fn prune(history: &[Message], max_message_tokens: usize, num_terminal_commands_to_keep: usize) -> PruneOutcome {
    // Pass 0 — fast path.
    if history_tokens(history) < max_message_tokens {
        return PruneOutcome { messages: history.to_vec(), warning: None };
    }

    // Pass 1 — terminal-result compaction.
    let after_pass1 = terminal_result_compaction(history, num_terminal_commands_to_keep);
    if history_tokens(&after_pass1) < max_message_tokens {
        return PruneOutcome { messages: after_pass1, warning: None };
    }

    // Pass 2 — large-result compaction.
    let after_pass2 = large_result_compaction(&after_pass1);
    if history_tokens(&after_pass2) < max_message_tokens {
        return PruneOutcome { messages: after_pass2, warning: None };
    }

    // Pass 3 — message-level pruning.
    message_level_pruning(&after_pass2, max_message_tokens)
}

fn is_terminal_command_result(m: &Message) -> bool {
    matches!(m, Message::Tool { tool_name, .. } if tool_name == TERMINAL_COMMAND_TOOL_NAME)
}

fn extract_command(content: &[ToolOutputPart]) -> String {
    content
        .iter()
        .find_map(|p| match p {
            ToolOutputPart::Json { value, .. } => value.get("command").and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        })
        .unwrap_or_default()
}

/// Pass 1 (§4.2): walking newest-to-oldest, the most recent
/// `num_terminal_commands_to_keep` `run_terminal_command` tool messages
/// are preserved verbatim; every older one is rewritten to a single json
/// part carrying just the original command and an omission marker.
fn terminal_result_compaction(history: &[Message], num_terminal_commands_to_keep: usize) -> Vec<Message> {
    let mut out = history.to_vec();
    let mut kept_seen = 0usize;
    for idx in (0..out.len()).rev() {
        if !is_terminal_command_result(&out[idx]) {
            continue;
        }
        if kept_seen < num_terminal_commands_to_keep {
            kept_seen += 1;
            continue;
        }
        if let Message::Tool { content, tool_call_id, tool_name, meta, .. } = &out[idx] {
            let command = extract_command(content);
            out[idx] = Message::Tool {
                content: vec![ToolOutputPart::Json {
                    value: json!({ "command": command, "stdoutOmittedForLength": true }),
                    cache_control: false,
                }],
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                meta: meta.clone(),
            };
        }
    }
    out
}

/// Pass 2 (§4.2): any `tool` message whose stringified content exceeds
/// 1000 characters is rewritten to a fixed omission marker carrying the
/// original byte size.
fn large_result_compaction(history: &[Message]) -> Vec<Message> {
    history
        .iter()
        .map(|m| {
            let Message::Tool { content, tool_call_id, tool_name, meta, .. } = m else {
                return m.clone();
            };
            let serialized = serde_json::to_string(content).unwrap_or_default();
            let size = serialized.len();
            if size <= LARGE_RESULT_THRESHOLD_CHARS {
                return m.clone();
            }
            Message::Tool {
                content: vec![ToolOutputPart::Json {
                    value: json!({ "message": "[LARGE_TOOL_RESULT_OMITTED]", "originalSize": size }),
                    cache_control: false,
                }],
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                meta: meta.clone(),
            }
        })
        .collect()
}

/// Pass 3 (§4.2): deletes messages in order (skipping anything
/// `keepDuringTruncation` or at a `keepLastTags` last-occurrence index)
/// until the running removed-token total reaches `T = (max - R) * 0.5`,
/// collapsing consecutive deletions into a single placeholder message.
fn message_level_pruning(history: &[Message], max_message_tokens: usize) -> PruneOutcome {
    let r: usize = history.iter().filter(|m| m.keep_during_truncation()).map(message_tokens).sum();
    let target = ((max_message_tokens.saturating_sub(r)) as f64 * (1.0 - 0.5)).max(0.0) as usize;

    let mut last_index_for_tag: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for (i, m) in history.iter().enumerate() {
        for tag in &m.meta().keep_last_tags {
            last_index_for_tag.insert(tag.clone(), i);
        }
    }
    let keep_indices: std::collections::HashSet<usize> = last_index_for_tag.values().copied().collect();

    let mut result = Vec::with_capacity(history.len());
    let mut removed_tokens = 0usize;
    let mut target_reached = target == 0;
    let mut i = 0;

    while i < history.len() {
        let keep_here = history[i].keep_during_truncation() || keep_indices.contains(&i);
        if keep_here || target_reached {
            result.push(history[i].clone());
            i += 1;
            continue;
        }

        // Consume a run of consecutive deletable messages, collapsing them
        // into a single placeholder.
        let run_start = i;
        while i < history.len() {
            let keep_i = history[i].keep_during_truncation() || keep_indices.contains(&i);
            if keep_i || target_reached {
                break;
            }
            removed_tokens += message_tokens(&history[i]);
            i += 1;
            if removed_tokens >= target {
                target_reached = true;
            }
        }
        if i > run_start {
            let placeholder = Message::user(PLACEHOLDER_TEXT);
            removed_tokens = removed_tokens.saturating_sub(message_tokens(&placeholder));
            result.push(placeholder);
        }
    }

    let tokens_after = history_tokens(&result);
    let warning = if tokens_after >= max_message_tokens {
        Some(PruneWarning { max_message_tokens, tokens_after_pruning: tokens_after })
    } else {
        None
    };
    if let Some(w) = &warning {
        warn!(
            max_message_tokens = w.max_message_tokens,
            tokens_after_pruning = w.tokens_after_pruning,
            "context pruner exhausted the history without reaching its token budget"
        );
    }

    PruneOutcome { messages: result, warning }
}

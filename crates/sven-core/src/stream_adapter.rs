// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §4.4 Stream Adapter: a thin wrapper over [`sven_model::ModelProvider`]
//! that applies per-template provider options and offers a text-override
//! shortcut for the step handler driver. Performs no retries of its own —
//! the step loop (§4.7, §7) owns the retry budget around a call to
//! [`StreamAdapter::stream`].

use anyhow::{Context, Result};
use futures::StreamExt;
use serde_json::Value;
use sven_model::{CompletionRequest, Message, ModelProvider, ProviderOptions, ResponseEvent, ResponseStream, ToolSchema};
use uuid::Uuid;

use crate::template::AgentTemplate;

/// A single accumulated result of one adapter call: either a normal
/// provider stream or the synthetic single-chunk shortcut produced when
/// the step handler pre-injects text (§4.4 "text override").
pub enum AdaptedStream {
    Provider { message_id: String, events: ResponseStream },
    TextOverride { message_id: String, text: String },
}

pub struct StreamAdapter<'a> {
    provider: &'a dyn ModelProvider,
}

impl<'a> StreamAdapter<'a> {
    pub fn new(provider: &'a dyn ModelProvider) -> Self {
        Self { provider }
    }

    /// Normal streaming path: merges the template's `reasoningOptions` and
    /// `providerOptions` into the request's provider-options block under
    /// every known provider key, forwards `stop_sequences`, and delegates
    /// to the provider. No retry: a failure here is the caller's to retry
    /// or surface as `StreamError`.
    pub async fn stream(
        &self,
        template: &AgentTemplate,
        messages: Vec<Message>,
        tools: Vec<ToolSchema>,
        stop_sequences: Option<Vec<String>>,
    ) -> Result<AdaptedStream> {
        let provider_options = merge_provider_options(template);
        let request = CompletionRequest {
            model: template.model.clone(),
            messages,
            tools,
            stream: true,
            stop_sequences,
            provider_options,
            max_output_tokens: None,
        };

        let stream = self
            .provider
            .complete(request)
            .await
            .context("model provider failed to start a completion stream")?;

        Ok(AdaptedStream::Provider { message_id: Uuid::new_v4().to_string(), events: stream })
    }

    /// Text-override shortcut (§4.4): used when the step handler driver
    /// injects a `StepText` directive. Emits a synthetic message id and a
    /// single `{text}` chunk without calling the collaborator at all.
    pub fn text_override(text: impl Into<String>) -> AdaptedStream {
        AdaptedStream::TextOverride { message_id: Uuid::new_v4().to_string(), text: text.into() }
    }
}

fn merge_provider_options(template: &AgentTemplate) -> Option<ProviderOptions> {
    if template.reasoning_options.is_none() && template.provider_options.is_none() {
        return None;
    }
    let mut merged: ProviderOptions = std::collections::BTreeMap::new();
    for key in sven_model::KNOWN_PROVIDER_KEYS {
        let mut entry = std::collections::BTreeMap::new();
        if let Some(Value::Object(map)) = &template.reasoning_options {
            entry.insert("reasoning".to_string(), Value::Object(map.clone()));
        }
        if let Some(Value::Object(map)) = &template.provider_options {
            for (k, v) in map {
                entry.insert(k.clone(), v.clone());
            }
        }
        if !entry.is_empty() {
            merged.insert(key.to_string(), entry);
        }
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

/// Drains an [`AdaptedStream`] into a finished assistant message plus the
/// tool calls collected along the way, applying the STREAM phase's
/// accumulation rule from §4.7 step 2: text/reasoning deltas accumulate
/// into a buffered message; tool-call chunks collect in arrival order.
pub struct StreamResult {
    pub message_id: String,
    pub text: String,
    pub reasoning: String,
    pub tool_calls: Vec<(String, String, Value)>,
    pub usage: Option<sven_model::Usage>,
}

pub async fn drain(stream: AdaptedStream) -> Result<StreamResult> {
    match stream {
        AdaptedStream::TextOverride { message_id, text } => {
            Ok(StreamResult { message_id, text, reasoning: String::new(), tool_calls: Vec::new(), usage: None })
        }
        AdaptedStream::Provider { message_id, mut events } => {
            let mut text = String::new();
            let mut reasoning = String::new();
            let mut tool_calls = Vec::new();
            let mut usage = None;
            while let Some(event) = events.next().await {
                match event.context("model provider stream yielded an error")? {
                    ResponseEvent::TextDelta { text: t } => text.push_str(&t),
                    ResponseEvent::ReasoningDelta { text: t } => reasoning.push_str(&t),
                    ResponseEvent::ToolCall { tool_call_id, tool_name, input } => {
                        tool_calls.push((tool_call_id, tool_name, input));
                    }
                    ResponseEvent::Usage(u) => usage = Some(u),
                    ResponseEvent::Done => {}
                    ResponseEvent::Error { message } => {
                        anyhow::bail!("model provider reported a stream error: {message}");
                    }
                }
            }
            Ok(StreamResult { message_id, text, reasoning, tool_calls, usage })
        }
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Providers whose option blocks receive cache-control markers. Kept as a
/// flat triple-write rather than a single active key because a router
/// downstream of this crate picks one at send time.
pub const KNOWN_PROVIDER_KEYS: [&str; 3] = ["anthropic", "openrouter", "openaiCompatible"];

/// Controls how long a message is allowed to survive routine pruning passes
/// driven by the step loop, independent of the context pruner's own budget
/// logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimeToLive {
    AgentStep,
    UserPrompt,
}

/// Per-provider, per-option nested overrides attached to a single message
/// (most commonly the cache-control markers written by the tagger).
pub type ProviderOptions = BTreeMap<String, BTreeMap<String, Value>>;

/// Fields shared by every message role. Flattened into the outer message
/// shape on the wire so a caller need not look inside a nested object to
/// find them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<TimeToLive>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub keep_during_truncation: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub keep_last_tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl MessageMeta {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Writes the same cache-control marker under every known provider key.
    pub fn set_cache_control(&mut self) {
        let marker = serde_json::json!({ "type": "ephemeral" });
        let opts = self.provider_options.get_or_insert_with(BTreeMap::new);
        for key in KNOWN_PROVIDER_KEYS {
            opts.entry(key.to_string())
                .or_default()
                .insert("cache_control".to_string(), marker.clone());
        }
    }
}

fn is_false(b: &bool) -> bool {
    !b
}

/// A single text-only part used by system messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
    /// Set by the cache-control tagger when this part is the last part of
    /// a `system.content` parts list selected for caching.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cache_control: bool,
}

/// `system.content`: either a bare string or an ordered sequence of text
/// parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemContent {
    Text(String),
    Parts(Vec<TextPart>),
}

impl SystemContent {
    pub fn as_text(&self) -> String {
        match self {
            SystemContent::Text(t) => t.clone(),
            SystemContent::Parts(parts) => parts
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Marks the last non-empty part cacheable. Returns `false` (and marks
    /// nothing) for the bare-string shape, which the cache-control tagger
    /// instead marks at the message level.
    pub fn mark_last_part_cacheable(&mut self) -> bool {
        match self {
            SystemContent::Text(_) => false,
            SystemContent::Parts(parts) => match parts.iter_mut().rev().find(|p| !p.text.is_empty()).or(parts.last_mut()) {
                Some(p) => {
                    p.cache_control = true;
                    true
                }
                None => false,
            },
        }
    }
}

/// `user.content` part shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContentPart {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
    Image {
        data: String,
        media_type: String,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
    File {
        data: String,
        media_type: String,
        name: Option<String>,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
}

/// `user.content`: either a bare string or an ordered sequence of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<UserContentPart>),
}

impl UserContent {
    /// Marks the last non-empty part cacheable. Only system messages carry
    /// a bare string content shape; bare-string user content has no parts to
    /// mark, so this returns `false` rather than guessing a message-level
    /// fallback.
    pub fn mark_last_part_cacheable(&mut self) -> bool {
        match self {
            UserContent::Text(_) => false,
            UserContent::Parts(parts) => match parts.last_mut() {
                Some(p) => {
                    set_user_part_cache_control(p);
                    true
                }
                None => false,
            },
        }
    }
}

fn set_user_part_cache_control(part: &mut UserContentPart) {
    match part {
        UserContentPart::Text { cache_control, .. }
        | UserContentPart::Image { cache_control, .. }
        | UserContentPart::File { cache_control, .. } => *cache_control = true,
    }
}

/// `assistant.content` part shapes. `ToolCall` carries the `input` mapping
/// the agent passed to the tool, keyed the same way the tool's own schema
/// names its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantContentPart {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
}

/// `assistant.content`: either a bare string or an ordered sequence of
/// parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssistantContent {
    Text(String),
    Parts(Vec<AssistantContentPart>),
}

impl AssistantContent {
    pub fn tool_calls(&self) -> Vec<&AssistantContentPart> {
        match self {
            AssistantContent::Text(_) => Vec::new(),
            AssistantContent::Parts(parts) => parts
                .iter()
                .filter(|p| matches!(p, AssistantContentPart::ToolCall { .. }))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AssistantContent::Text(t) => t.is_empty(),
            AssistantContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Marks the last part cacheable; see [`UserContent::mark_last_part_cacheable`].
    pub fn mark_last_part_cacheable(&mut self) -> bool {
        match self {
            AssistantContent::Text(_) => false,
            AssistantContent::Parts(parts) => match parts.last_mut() {
                Some(p) => {
                    set_assistant_part_cache_control(p);
                    true
                }
                None => false,
            },
        }
    }
}

fn set_assistant_part_cache_control(part: &mut AssistantContentPart) {
    match part {
        AssistantContentPart::Text { cache_control, .. }
        | AssistantContentPart::Reasoning { cache_control, .. }
        | AssistantContentPart::ToolCall { cache_control, .. } => *cache_control = true,
    }
}

/// `tool.content` part shapes: a tool result is an ordered sequence of
/// structured json values and/or raw media blobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolOutputPart {
    Json {
        value: Value,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
    Media {
        data: String,
        media_type: String,
        #[serde(default, skip_serializing_if = "is_false")]
        cache_control: bool,
    },
}

fn mark_tool_output_part_cacheable(part: &mut ToolOutputPart) {
    match part {
        ToolOutputPart::Json { cache_control, .. } | ToolOutputPart::Media { cache_control, .. } => {
            *cache_control = true
        }
    }
}

/// The canonical message record threaded through the step loop, the
/// pruner, and the cache-control tagger. Tagged by `role`; each variant
/// carries the content shape that role is allowed to hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    System {
        content: SystemContent,
        #[serde(flatten)]
        meta: MessageMeta,
    },
    User {
        content: UserContent,
        #[serde(flatten)]
        meta: MessageMeta,
    },
    Assistant {
        content: AssistantContent,
        #[serde(flatten)]
        meta: MessageMeta,
    },
    Tool {
        content: Vec<ToolOutputPart>,
        tool_call_id: String,
        tool_name: String,
        #[serde(flatten)]
        meta: MessageMeta,
    },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message::System {
            content: SystemContent::Text(text.into()),
            meta: MessageMeta::default(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            content: UserContent::Text(text.into()),
            meta: MessageMeta::default(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message::Assistant {
            content: AssistantContent::Text(text.into()),
            meta: MessageMeta::default(),
        }
    }

    pub fn assistant_tool_call(tool_call_id: impl Into<String>, tool_name: impl Into<String>, input: Value) -> Self {
        Message::Assistant {
            content: AssistantContent::Parts(vec![AssistantContentPart::ToolCall {
                tool_call_id: tool_call_id.into(),
                tool_name: tool_name.into(),
                input,
                cache_control: false,
            }]),
            meta: MessageMeta::default(),
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, tool_name: impl Into<String>, value: Value) -> Self {
        Message::Tool {
            content: vec![ToolOutputPart::Json { value, cache_control: false }],
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            meta: MessageMeta::default(),
        }
    }

    pub fn role_name(&self) -> &'static str {
        match self {
            Message::System { .. } => "system",
            Message::User { .. } => "user",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn meta(&self) -> &MessageMeta {
        match self {
            Message::System { meta, .. }
            | Message::User { meta, .. }
            | Message::Assistant { meta, .. }
            | Message::Tool { meta, .. } => meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut MessageMeta {
        match self {
            Message::System { meta, .. }
            | Message::User { meta, .. }
            | Message::Assistant { meta, .. }
            | Message::Tool { meta, .. } => meta,
        }
    }

    pub fn keep_during_truncation(&self) -> bool {
        self.meta().keep_during_truncation
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        }
    }

    /// Cache-control tagger entry point (§4.3): marks the last non-empty
    /// content part cacheable, or falls back to the message-level triple
    /// provider-key marker for the bare-string system shape. Returns
    /// `false` if the message had no content to mark (e.g. empty parts).
    pub fn mark_cacheable(&mut self) -> bool {
        match self {
            Message::System { content, meta } => {
                if content.mark_last_part_cacheable() {
                    true
                } else {
                    meta.set_cache_control();
                    true
                }
            }
            Message::User { content, .. } => content.mark_last_part_cacheable(),
            Message::Assistant { content, .. } => content.mark_last_part_cacheable(),
            Message::Tool { content, .. } => match content.last_mut() {
                Some(p) => {
                    mark_tool_output_part_cacheable(p);
                    true
                }
                None => false,
            },
        }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Message::user(text)
    }

    /// Best-effort plain-text rendering used by the pruner and by tests that
    /// need to recognize placeholder messages without matching on content
    /// shape. Not used for anything sent to a model.
    pub fn as_text_lossy(&self) -> String {
        match self {
            Message::System { content, .. } => content.as_text(),
            Message::User { content, .. } => match content {
                UserContent::Text(t) => t.clone(),
                UserContent::Parts(parts) => parts
                    .iter()
                    .filter_map(|p| match p {
                        UserContentPart::Text { text, .. } => Some(text.clone()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            },
            Message::Assistant { content, .. } => match content {
                AssistantContent::Text(t) => t.clone(),
                AssistantContent::Parts(parts) => parts
                    .iter()
                    .filter_map(|p| match p {
                        AssistantContentPart::Text { text, .. } | AssistantContentPart::Reasoning { text, .. } => {
                            Some(text.clone())
                        }
                        AssistantContentPart::ToolCall { .. } => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            },
            Message::Tool { content, .. } => serde_json::to_string(content).unwrap_or_default(),
        }
    }

    /// Stable JSON representation used by the token counter and by tests
    /// that compare pruner output structurally.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("Message always serializes")
    }
}

/// Schema advertised to the LLM collaborator for a single invocable tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One emitted unit from a streaming LLM collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEvent {
    TextDelta { text: String },
    ReasoningDelta { text: String },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    Usage(Usage),
    Done,
    Error { message: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_read_tokens: u32,
    pub cache_write_tokens: u32,
}

/// Request handed to a [`crate::ModelProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Opaque model identifier forwarded from the originating
    /// `AgentTemplate::model`; a provider backing more than one model uses
    /// this to route the call (§6: `promptAiSdkStream(messages, model, ...)`).
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<ProviderOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde_json::Value;
use sven_model::ToolOutputPart;

/// A single tool invocation requested by the model, already separated out
/// of the assistant message that carried it.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Id the model assigned to this call; echoed back on the matching
    /// `tool` message.
    pub tool_call_id: String,
    pub tool_name: String,
    pub input: Value,
}

/// The result of executing a tool, local or remote.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub parts: Vec<ToolOutputPart>,
    /// If true, execution failed non-fatally; the parts carry an error
    /// description the agent may observe and react to.
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful result carrying a single structured json value.
    pub fn ok(tool_call_id: impl Into<String>, value: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            parts: vec![ToolOutputPart::Json { value, cache_control: false }],
            is_error: false,
        }
    }

    /// Error result containing a plain-text message.
    pub fn err(tool_call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            parts: vec![ToolOutputPart::Json {
                value: serde_json::json!({ "error": msg.into() }),
                cache_control: false,
            }],
            is_error: true,
        }
    }

    /// Result with arbitrary parts (json and/or media).
    pub fn with_parts(tool_call_id: impl Into<String>, parts: Vec<ToolOutputPart>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            parts,
            is_error: false,
        }
    }

    pub fn has_media(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, ToolOutputPart::Media { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_produces_single_json_part() {
        let out = ToolOutput::ok("c1", serde_json::json!({"a": 1}));
        assert_eq!(out.parts.len(), 1);
        assert!(!out.is_error);
    }

    #[test]
    fn err_marks_is_error() {
        let out = ToolOutput::err("c1", "boom");
        assert!(out.is_error);
    }

    #[test]
    fn has_media_detects_media_part() {
        let out = ToolOutput::with_parts(
            "c1",
            vec![ToolOutputPart::Media {
                data: "abc".into(),
                media_type: "image/png".into(),
                cache_control: false,
            }],
        );
        assert!(out.has_media());
    }
}

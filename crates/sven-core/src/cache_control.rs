// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §4.3 Cache-Control Tagger: marks up to four messages for provider-side
//! caching after the step loop has assembled the outgoing message list.
//!
//! Assumes the caller has already converted internal messages to wire
//! format and aggregated consecutive same-role messages; this module only
//! performs selection and marking.

use sven_model::Message;

const LAST_ASSISTANT_MESSAGE: &str = "LAST_ASSISTANT_MESSAGE";
const USER_PROMPT: &str = "USER_PROMPT";
const STEP_PROMPT: &str = "STEP_PROMPT";

/// Maximum number of messages the tagger will mark, a provider-imposed
/// ceiling independent of how many candidate selections are found.
const MAX_CACHE_MARKS: usize = 4;

fn last_index_with_tag(messages: &[Message], tag: &str) -> Option<usize> {
    messages.iter().rposition(|m| m.meta().has_tag(tag))
}

/// Builds the ordered candidate index list (§4.3 selection rules a-d),
/// deduplicated and capped at [`MAX_CACHE_MARKS`].
fn select_indices(messages: &[Message]) -> Vec<usize> {
    let mut candidates = Vec::new();

    for tag in [LAST_ASSISTANT_MESSAGE, USER_PROMPT, STEP_PROMPT] {
        if let Some(tagged_idx) = last_index_with_tag(messages, tag) {
            if tagged_idx == 0 {
                continue;
            }
            let preceding = tagged_idx - 1;
            if preceding == 0 {
                continue;
            }
            candidates.push(preceding);
        }
    }

    if let Some(last) = messages.len().checked_sub(1) {
        candidates.push(last);
    }

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for idx in candidates {
        if seen.insert(idx) {
            out.push(idx);
        }
        if out.len() == MAX_CACHE_MARKS {
            break;
        }
    }
    out
}

/// Marks the selected messages cacheable in place. Returns the number of
/// messages actually marked (a message already lacking any content to mark
/// does not count, matching [`Message::mark_cacheable`]'s return value).
pub fn apply_cache_control(messages: &mut [Message]) -> usize {
    let indices = select_indices(messages);
    let mut marked = 0;
    for idx in indices {
        if let Some(m) = messages.get_mut(idx) {
            if m.mark_cacheable() {
                marked += 1;
            }
        }
    }
    marked
}

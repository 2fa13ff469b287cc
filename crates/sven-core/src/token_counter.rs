// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! §4.1 Token Counter. A single, deliberately coarse operation: every
//! budget comparison in the pruner goes through this formula so that test
//! fixtures stay portable across ports of this runtime.

use serde::Serialize;
use serde_json::Value;

/// `ceil(len(stringify(value)) / 3)`.
pub fn count_tokens(value: &Value) -> usize {
    let text = serde_json::to_string(value).unwrap_or_default();
    count_tokens_str(&text)
}

/// Same formula applied directly to an already-serialized string, to avoid
/// a redundant round-trip through `Value` for callers that already have
/// the JSON text (or, for plain strings, avoid quoting overhead entirely
/// changing the count — callers that want the exact `Value` formula should
/// use [`count_tokens`]).
pub fn count_tokens_str(text: &str) -> usize {
    text.len().div_ceil(3)
}

/// Token count of any JSON-serializable value, going through the same
/// `serde_json::to_string` path as [`count_tokens`].
pub fn count_tokens_of<T: Serialize>(value: &T) -> usize {
    let text = serde_json::to_string(value).unwrap_or_default();
    count_tokens_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_string_is_zero_tokens() {
        assert_eq!(count_tokens(&json!("")), 1); // `""` stringifies to 2 chars -> ceil(2/3)=1
    }

    #[test]
    fn counts_match_ceil_division_by_three() {
        // stringify("abc") == "\"abc\"" -> 5 chars -> ceil(5/3) = 2
        assert_eq!(count_tokens(&json!("abc")), 2);
    }

    #[test]
    fn object_counts_full_serialized_length() {
        let v = json!({"a": 1, "b": 2});
        let text = serde_json::to_string(&v).unwrap();
        assert_eq!(count_tokens(&v), text.len().div_ceil(3));
    }

    #[test]
    fn count_tokens_of_matches_count_tokens() {
        #[derive(Serialize)]
        struct S {
            x: u32,
        }
        let s = S { x: 7 };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(count_tokens_of(&s), count_tokens(&v));
    }
}

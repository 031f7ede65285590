// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Structured-output recovery
//!
//! Models asked to return JSON wrap it in prose, fence it in code blocks,
//! leave trailing commas, or answer in plain language. Recovery applies a
//! fixed sequence of fallback stages and stops at the first success:
//!
//! 1. direct parse of the trimmed text (with a trailing-comma retry)
//! 2. the interior of a fenced code block
//! 3. the outermost bracket span
//! 4. for list-shaped answers, "no issues found" sentinel phrases
//! 5. failure carrying the untouched original text
//!
//! Deliberately dependency-light: `serde_json` only.

pub mod audit;

use serde_json::Value;
use tracing::debug;

use crate::error::{GatewayError, Result};

/// Shape the caller expects from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    /// Any JSON value
    Any,
    /// A JSON array; enables the no-issues sentinel stage
    List,
}

/// Phrases, matched case-insensitively, that mean "no issues found"
const NO_ISSUE_SENTINELS: &[&str] = &[
    "未发现任何问题",
    "没有发现问题",
    "no issues found",
    "no problems found",
    "looks good",
];

/// Recover a JSON value from unreliable model text.
///
/// On failure the returned [`GatewayError::MalformedResponse`] carries the
/// untouched original text for display.
pub fn recover_json(text: &str, expected: ExpectedShape) -> Result<Value> {
    let trimmed = text.trim();

    // Stage 1: the whole text.
    if let Some(value) = try_parse(trimmed) {
        return Ok(value);
    }

    // Stage 2: fenced code block interior.
    if let Some(interior) = fenced_interior(trimmed) {
        if let Some(value) = try_parse(interior.trim()) {
            debug!("recovered JSON from fenced block");
            return Ok(value);
        }
    }

    // Stage 3: outermost bracket span.
    if let Some(span) = bracket_span(trimmed) {
        if let Some(value) = try_parse(span) {
            debug!("recovered JSON from bracket span");
            return Ok(value);
        }
    }

    // Stage 4: sentinel phrases meaning an empty list of issues.
    if expected == ExpectedShape::List {
        let lowered = trimmed.to_lowercase();
        if NO_ISSUE_SENTINELS
            .iter()
            .any(|phrase| lowered.contains(&phrase.to_lowercase()))
        {
            debug!("no-issues sentinel matched, returning empty list");
            return Ok(Value::Array(vec![]));
        }
    }

    Err(GatewayError::MalformedResponse {
        raw: text.to_string(),
    })
}

/// One parse attempt plus a retry with trailing commas stripped.
fn try_parse(candidate: &str) -> Option<Value> {
    if candidate.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }
    serde_json::from_str(&strip_trailing_commas(candidate)).ok()
}

/// Remove commas that immediately precede (modulo whitespace) a closing
/// brace or bracket. String contents are left alone.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = text.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// The interior of the first triple-backtick fence, tolerating an optional
/// `json` tag after the opening fence.
fn fenced_interior(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];

    // Skip the info string (e.g. "json") up to the end of the opening line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];

    let end = body.find("```")?;
    Some(&body[..end])
}

/// The outermost bracket span: the first `[` to the last `]` when that span
/// is valid, otherwise the first `{` to the last `}`.
fn bracket_span(text: &str) -> Option<&str> {
    if let (Some(first), Some(last)) = (text.find('['), text.rfind(']')) {
        if last > first {
            return Some(&text[first..=last]);
        }
    }
    if let (Some(first), Some(last)) = (text.find('{'), text.rfind('}')) {
        if last > first {
            return Some(&text[first..=last]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stage1_direct_parse() {
        let value = recover_json(r#"{"a":1}"#, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!({"a":1}));
    }

    #[test]
    fn test_stage1_trailing_comma_object() {
        let value = recover_json(r#"{"a":1,}"#, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!({"a":1}));
    }

    #[test]
    fn test_stage1_trailing_comma_array_with_whitespace() {
        let value = recover_json("[1, 2, \n ]", ExpectedShape::List).unwrap();
        assert_eq!(value, json!([1, 2]));
    }

    #[test]
    fn test_trailing_comma_inside_string_untouched() {
        let value = recover_json(r#"{"a":"x,}",}"#, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!({"a":"x,}"}));
    }

    #[test]
    fn test_stage2_fenced_block_with_prose() {
        let input = "Sure, here:\n```json\n[{\"problematicText\":\"foo\",\"suggestion\":\"bar\",\"checklistItem\":\"x\",\"explanation\":\"y\"}]\n```";
        let value = recover_json(input, ExpectedShape::List).unwrap();
        assert_eq!(value[0]["problematicText"], "foo");
        assert_eq!(value[0]["suggestion"], "bar");
        assert_eq!(value[0]["checklistItem"], "x");
        assert_eq!(value[0]["explanation"], "y");
    }

    #[test]
    fn test_stage2_untagged_fence() {
        let input = "```\n{\"k\":2}\n```";
        let value = recover_json(input, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!({"k":2}));
    }

    #[test]
    fn test_stage2_fenced_block_with_trailing_comma() {
        let input = "answer below\n```json\n{\"k\": 3,}\n```";
        let value = recover_json(input, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!({"k":3}));
    }

    #[test]
    fn test_stage3_bracket_span_object() {
        let input = "The result is {\"ok\": true} as requested.";
        let value = recover_json(input, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn test_stage3_prefers_array_over_object() {
        let input = "prefix [\"a\", {\"b\": 1}] suffix";
        let value = recover_json(input, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!(["a", {"b": 1}]));
    }

    #[test]
    fn test_stage3_invalid_array_span_falls_back_to_object() {
        // "]" precedes "[", so the array span is invalid; the object wins.
        let input = "see ] above, then {\"c\": 2} and a stray [";
        let value = recover_json(input, ExpectedShape::Any).unwrap();
        assert_eq!(value, json!({"c": 2}));
    }

    #[test]
    fn test_stage4_chinese_sentinel() {
        let value = recover_json("经检查，未发现任何问题。", ExpectedShape::List).unwrap();
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_stage4_english_sentinel_case_insensitive() {
        let value = recover_json("No Issues Found in this note.", ExpectedShape::List).unwrap();
        assert_eq!(value, json!([]));
    }

    #[test]
    fn test_stage4_not_applied_for_any_shape() {
        let err = recover_json("no issues found", ExpectedShape::Any).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse { .. }));
    }

    #[test]
    fn test_stage5_failure_preserves_original_text() {
        let input = "I could not produce JSON, sorry!";
        let err = recover_json(input, ExpectedShape::List).unwrap_err();
        match err {
            GatewayError::MalformedResponse { raw } => assert_eq!(raw, input),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_idempotence_of_successful_parse() {
        let input = "```json\n{\"nested\": [1, {\"x\": \"y\"},]}\n```";
        let first = recover_json(input, ExpectedShape::Any).unwrap();
        let canonical = serde_json::to_string(&first).unwrap();
        let second = recover_json(&canonical, ExpectedShape::Any).unwrap();
        assert_eq!(first, second);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Notegate Contributors

//! Audit payload validation
//!
//! Providers answer the audit prompt with a bare list, a `{issues: [...]}`
//! wrapper, or a single issue object. The payload is classified into an
//! explicit tagged union before any field extraction, then each candidate
//! issue is rebuilt field by field. Reconstruction never fails a batch:
//! malformed entries are salvaged or dropped individually.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Marker substituted for a missing `problematicText` on salvaged issues
pub const PLACEHOLDER_TEXT: &str = "(original text not provided)";

/// Wrapper keys under which providers nest the issue list
const WRAPPER_KEYS: &[&str] = &["issues", "results", "data"];

/// One audit finding
///
/// `problematic_text` is the key used for later text highlighting; when it
/// came back from the model it is best-effort verbatim, and when salvaged it
/// holds [`PLACEHOLDER_TEXT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditIssue {
    /// The offending text span
    pub problematic_text: String,
    /// Suggested replacement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// The user-authored checklist rule this issue is attributed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist_item: Option<String>,
    /// Why this is an issue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Classified shape of a parsed audit payload
#[derive(Debug)]
enum AuditPayload {
    /// A list directly
    List(Vec<Value>),
    /// A list nested under a known wrapper key
    WrappedList(Vec<Value>),
    /// A single issue-shaped object
    Single(Value),
}

/// Resolve the payload shape before any field extraction.
fn classify(value: &Value) -> Option<AuditPayload> {
    if let Some(items) = value.as_array() {
        return Some(AuditPayload::List(items.clone()));
    }

    if let Some(object) = value.as_object() {
        for key in WRAPPER_KEYS {
            if let Some(items) = object.get(*key).and_then(Value::as_array) {
                return Some(AuditPayload::WrappedList(items.clone()));
            }
        }
        if looks_like_issue(value) {
            return Some(AuditPayload::Single(value.clone()));
        }
    }

    None
}

/// An object is issue-shaped when it carries at least one of the four known
/// fields.
fn looks_like_issue(value: &Value) -> bool {
    field(value, "problematicText", "problematic_text").is_some()
        || field(value, "suggestion", "suggestion").is_some()
        || field(value, "checklistItem", "checklist_item").is_some()
        || field(value, "explanation", "explanation").is_some()
}

/// Read a string field under its wire name, tolerating the snake_case
/// variant some models produce.
fn field(value: &Value, camel: &str, snake: &str) -> Option<String> {
    value
        .get(camel)
        .or_else(|| value.get(snake))
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
}

/// Rebuild one issue defensively. Missing `problematicText` is salvaged with
/// the placeholder when a suggestion or explanation is present; an entry
/// with neither is dropped.
fn rebuild_issue(value: &Value) -> Option<AuditIssue> {
    if !value.is_object() {
        return None;
    }

    let problematic_text = field(value, "problematicText", "problematic_text");
    let suggestion = field(value, "suggestion", "suggestion");
    let checklist_item = field(value, "checklistItem", "checklist_item");
    let explanation = field(value, "explanation", "explanation");

    let problematic_text = match problematic_text {
        Some(text) => text,
        None if suggestion.is_some() || explanation.is_some() => PLACEHOLDER_TEXT.to_string(),
        None => {
            debug!("dropping audit entry with no usable fields");
            return None;
        }
    };

    Some(AuditIssue {
        problematic_text,
        suggestion,
        checklist_item,
        explanation,
    })
}

/// Extract the issue list from a recovered JSON value.
///
/// Returns None when the value is not an acceptable audit shape at all;
/// otherwise returns the surviving issues (possibly empty — malformed
/// entries are filtered, never fatal to the batch).
pub fn extract_issues(value: &Value) -> Option<Vec<AuditIssue>> {
    let items = match classify(value)? {
        AuditPayload::List(items) | AuditPayload::WrappedList(items) => items,
        AuditPayload::Single(item) => vec![item],
    };

    Some(items.iter().filter_map(rebuild_issue).collect())
}

//! Turning completion text into actions

use regex::Regex;
use relay_core::{Action, RelayError, Result};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```(?:json)?\s*").expect("valid opening fence pattern"))
}

fn closing_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*```$").expect("valid closing fence pattern"))
}

/// Trim the text and remove a surrounding markdown code fence, if any.
///
/// Handles both ```` ``` ```` and ```` ```json ```` openers. Text that does not
/// start with a fence is only trimmed.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let without_open = opening_fence().replace(trimmed, "");
    closing_fence().replace(&without_open, "").into_owned()
}

/// Parse completion text into an ordered action list.
///
/// A single object becomes a one-element list. Inside a list, entries that are
/// not objects with a `program` are dropped. Any other top-level value
/// (including empty text) is an error so the caller can retry.
pub fn extract_actions(text: &str) -> Result<Vec<Action>> {
    let cleaned = strip_code_fence(text);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| RelayError::ResponseParse(format!("{} in {:?}", e, preview(&cleaned))))?;

    let items = match value {
        Value::Object(_) => vec![value],
        Value::Array(items) => items,
        other => {
            return Err(RelayError::ResponseParse(format!(
                "expected an object or a list of objects, got {}",
                other
            )))
        }
    };

    let total = items.len();
    let actions: Vec<Action> = items.into_iter().filter_map(Action::from_value).collect();
    if actions.len() < total {
        warn!(
            "Dropped {} of {} entries without a program",
            total - actions.len(),
            total
        );
    }

    Ok(actions)
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

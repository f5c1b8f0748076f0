//! Response sanitizer: pull the JSON array out of a free-text model reply.
//!
//! Models wrap their answer in prose or ```json fences no matter how firmly
//! the prompt asks them not to. Everything between the first `[` and the
//! last `]` is taken as the candidate; if it parses, it is returned verbatim,
//! otherwise the caller gets `"[]"`. This function never fails.

use serde_json::Value;
use tracing::warn;

/// The empty JSON array, returned whenever no usable array is found.
pub const EMPTY_ARRAY: &str = "[]";

/// Extract a well-formed JSON array substring from a model reply.
///
/// Returns the substring unchanged on success and `"[]"` otherwise. Empty or
/// missing input yields `"[]"` without attempting extraction.
pub fn sanitize_reply(reply: Option<&str>) -> String {
    let text = match reply {
        Some(t) if !t.is_empty() => t,
        _ => return EMPTY_ARRAY.to_string(),
    };

    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return EMPTY_ARRAY.to_string();
    };
    if end <= start {
        return EMPTY_ARRAY.to_string();
    }

    let candidate = &text[start..=end];
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Array(_)) => candidate.to_string(),
        Ok(_) => EMPTY_ARRAY.to_string(),
        Err(e) => {
            warn!("Could not parse JSON array from model reply ({e}); using []");
            EMPTY_ARRAY.to_string()
        }
    }
}

/// Whether sanitized text holds an array with no elements, whatever its
/// whitespace (`[]`, `[ ]`, `[\n]`).
pub fn is_empty_array(sanitized: &str) -> bool {
    match serde_json::from_str::<Value>(sanitized) {
        Ok(Value::Array(items)) => items.is_empty(),
        _ => true,
    }
}

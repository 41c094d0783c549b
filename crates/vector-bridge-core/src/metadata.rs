//! Best-effort passage text extraction from index metadata.
//!
//! Every lookup returns `Option`: absent or unusable text is `None`, never
//! an error, and callers decide whether that drops a match or a pair.

use serde_json::Value;

use crate::models::Metadata;

/// Metadata keys checked, in order, for training passage text.
pub const TRAINING_TEXT_KEYS: &[&str] = &[
    "text",
    "chunk",
    "content",
    "clause",
    "body",
    "passage",
    "raw",
    "paragraph",
];

/// Minimum trimmed length for a training text value to count.
pub const MIN_TRAINING_TEXT_CHARS: usize = 8;

/// Passage text for a query-time match: the first non-empty string among `keys`.
pub fn query_text(meta: &Metadata, keys: &[String]) -> Option<String> {
    keys.iter().find_map(|k| match meta.get(k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

/// Passage text for a training pair.
///
/// Takes the first value under [`TRAINING_TEXT_KEYS`] with at least
/// [`MIN_TRAINING_TEXT_CHARS`] characters after trimming, truncated to
/// `max_chars`. Without one, synthesizes `"{title} (p.{page})"` (or just the
/// title) as a lower-quality stand-in.
pub fn training_text(meta: &Metadata, max_chars: usize) -> Option<String> {
    for key in TRAINING_TEXT_KEYS {
        if let Some(Value::String(s)) = meta.get(*key) {
            let trimmed = s.trim();
            if trimmed.chars().count() >= MIN_TRAINING_TEXT_CHARS {
                return Some(trimmed.chars().take(max_chars).collect());
            }
        }
    }

    let title = match meta.get("title") {
        Some(Value::String(t)) if !t.is_empty() => t,
        _ => return None,
    };
    match meta.get("page").and_then(render_scalar) {
        Some(page) => Some(format!("{title} (p.{page})")),
        None => Some(title.clone()),
    }
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

//! Recovery of structured JSON from free-form model output.
//!
//! Models are told to answer with strict JSON but regularly wrap it in prose or
//! markdown fences. [`extract_json`] tries, in order:
//!
//! 1. the interior of the first fenced code block (optionally tagged `json`)
//!    that parses,
//! 2. the span from the first `{` to the last `}`,
//! 3. the whole trimmed text,
//! 4. the span from the first `[` to the last `]`.
//!
//! A parse failure at any step falls through to the next one.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:json)?\s*(.*?)\s*```").expect("valid regex"));

static OBJECT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

static ARRAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));

/// Recover a JSON value from `text`, or `None` when every strategy misses.
pub fn extract_json(text: &str) -> Option<Value> {
    let cleaned = text.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(value) = FENCED_BLOCK
        .captures_iter(cleaned)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse(m.as_str()))
    {
        return Some(value);
    }

    if let Some(value) = OBJECT_SPAN.find(cleaned).and_then(|m| parse(m.as_str())) {
        return Some(value);
    }

    if let Some(value) = parse(cleaned) {
        return Some(value);
    }

    if let Some(value) = ARRAY_SPAN.find(cleaned).and_then(|m| parse(m.as_str())) {
        return Some(value);
    }

    debug!(
        response_len = cleaned.len(),
        "no JSON could be recovered from model response"
    );
    None
}

fn parse(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate.trim()).ok()
}

//! Robust JSON extraction from LLM completion text.
//!
//! Every LLM-backed role (Planner, Reasoner's keyword fallback aside,
//! Evaluator, Summarizer) parses a JSON object out of free-form completion
//! text. Grounded on the literal Python `_parse_response`/
//! `_parse_json_response` helpers across
//! `original_source/agent/{planner,evaluator,summarizer}/*.py`, which apply
//! the same fenced-block-then-span-then-comment-stripped cascade.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static FENCED_JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\}|\[.*?\])\s*```").unwrap());

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//[^\n]*$").unwrap());

/// Extract the most likely JSON payload from free-form text.
///
/// Cascade: a fenced ```json (or bare ```) code block first; failing that,
/// the first `{`..last `}` (or `[`..`]`) span; failing that, the raw text
/// unchanged (left for the caller's `serde_json::from_str` to reject).
pub fn extract_json(text: &str) -> &str {
    if let Some(caps) = FENCED_JSON_BLOCK.captures(text) {
        if let Some(m) = caps.get(1) {
            return m.as_str().trim();
        }
    }

    let trimmed = text.trim();
    let obj_span = (trimmed.find('{'), trimmed.rfind('}'));
    let arr_span = (trimmed.find('['), trimmed.rfind(']'));

    match (obj_span, arr_span) {
        ((Some(start), Some(end)), _) if start <= end => &trimmed[start..=end],
        (_, (Some(start), Some(end))) if start <= end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Strip `//`-style line comments, matching the original's
/// `re.sub(r'//.*$', '', content, flags=re.MULTILINE)` retry step.
pub fn strip_json_comments(text: &str) -> String {
    LINE_COMMENT.replace_all(text, "").to_string()
}

/// Parse a JSON value out of LLM completion text using the full cascade:
/// fenced/bracket extraction, then a second attempt with line comments
/// stripped. Returns `None` if both attempts fail to deserialize.
pub fn parse_llm_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let candidate = extract_json(text);
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }
    let stripped = strip_json_comments(candidate);
    serde_json::from_str(&stripped).ok()
}

//! Turning backend failures into one human-readable line.
//!
//! Failure payloads come in several shapes (`{"detail": {"msg": ..}}`,
//! `{"detail": ".."}`, `{"msg": ..}`, `{"error": {"message": ..}}`, plain
//! text). Each shape gets one extraction attempt; the first that produces
//! text wins, and every miss falls through to the next, less specific source.

use serde_json::Value;

use crate::api::ApiError;

type Extraction = fn(&Value) -> Option<String>;

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn detail_msg(value: &Value) -> Option<String> {
    string_at(value, "/detail/msg")
}

fn detail_message(value: &Value) -> Option<String> {
    string_at(value, "/detail/message")
}

fn detail_text(value: &Value) -> Option<String> {
    string_at(value, "/detail")
}

fn top_level_msg(value: &Value) -> Option<String> {
    string_at(value, "/msg")
}

fn error_message(value: &Value) -> Option<String> {
    string_at(value, "/error/message").or_else(|| string_at(value, "/error"))
}

fn top_level_message(value: &Value) -> Option<String> {
    string_at(value, "/message")
}

const EXTRACTIONS: [Extraction; 6] = [
    detail_msg,
    detail_message,
    detail_text,
    top_level_msg,
    error_message,
    top_level_message,
];

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First non-empty message found in a structured failure payload.
pub fn extract_message(value: &Value) -> Option<String> {
    EXTRACTIONS
        .iter()
        .filter_map(|extract| extract(value))
        .map(|text| collapse_whitespace(&text))
        .find(|text| !text.is_empty())
}

/// Message from a raw failure body: structured fields when the body is JSON,
/// otherwise the text itself.
fn message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => extract_message(&value),
        Err(_) => Some(collapse_whitespace(trimmed)),
    }
}

/// Single-line description of `error`, falling back to `fallback` when no
/// source carries any text.
pub fn describe_failure(error: &ApiError, fallback: &str) -> String {
    if let Some(message) = error.body().and_then(message_from_body) {
        return message;
    }
    let described = collapse_whitespace(&error.to_string());
    if described.is_empty() {
        fallback.to_string()
    } else {
        described
    }
}

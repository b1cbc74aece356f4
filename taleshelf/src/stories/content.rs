use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Searchable plain text for a story body.
///
/// Editor documents (JSON) are walked node by node; anything that does not
/// parse as JSON is treated as HTML and stripped of its tags.
pub fn plain_text(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(document) => text_of(&document),
        Err(_) => HTML_TAG.replace_all(content, "").trim().to_string(),
    }
}

pub const WORDS_PER_MINUTE: usize = 200;

/// Estimated reading time of a plain-text body, never under one minute.
pub fn reading_time_minutes(text: &str) -> u32 {
    let words = HTML_TAG.replace_all(text, " ").split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as u32
}

fn text_of(node: &Value) -> String {
    let Value::Object(fields) = node else {
        return String::new();
    };

    if fields.get("type").and_then(Value::as_str) == Some("text") {
        if let Some(text) = fields.get("text").and_then(Value::as_str) {
            return text.to_string();
        }
    }

    match fields.get("content") {
        Some(Value::Array(children)) => children
            .iter()
            .map(text_of)
            .collect::<String>()
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

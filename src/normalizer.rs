use crate::error::GenerationError;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_json::{Map, Value};

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n([\s\S]*?)\r?\n\s*```").unwrap();
    static ref FENCE_MARKER: Regex = Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?").unwrap();
    static ref TRAILING_COMMA: Regex = Regex::new(r",\s*([\]}])").unwrap();
    static ref OUTERMOST_OBJECT: Regex = Regex::new(r"\{[\s\S]*\}").unwrap();
}

/// Extracts the JSON object a model was asked to return from its free-text
/// reply. Tries, in order: a fenced block, the whole reply, the reply with
/// fences and trailing commas removed, and finally the widest `{...}` span.
pub fn normalize(raw: &str) -> Result<Map<String, Value>, GenerationError> {
    if let Some(block) = FENCED_BLOCK.captures(raw).and_then(|c| c.get(1)) {
        if let Some(object) = parse_object(block.as_str()) {
            return Ok(object);
        }
        debug!("Fenced block was not valid JSON, trying the full response");
    }

    let trimmed = raw.trim();
    if let Some(object) = parse_object(trimmed) {
        return Ok(object);
    }

    let cleaned = clean(trimmed);
    if let Some(object) = parse_object(&cleaned) {
        return Ok(object);
    }

    if let Some(object) = OUTERMOST_OBJECT
        .find(&cleaned)
        .and_then(|m| parse_object(m.as_str()))
    {
        return Ok(object);
    }

    Err(GenerationError::MalformedStructure(excerpt(trimmed)))
}

fn clean(text: &str) -> String {
    let without_fences = FENCE_MARKER.replace_all(text, "");
    TRAILING_COMMA
        .replace_all(&without_fences, "$1")
        .trim()
        .to_string()
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        out.push('…');
    }
    out
}

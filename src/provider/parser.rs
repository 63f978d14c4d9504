use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

lazy_static! {
    static ref JSON_BLOCK: Regex = Regex::new(r"```json\s*([\s\S]*?)\s*```").unwrap();
}

#[derive(Debug, Error)]
#[error("failed to extract JSON from provider output: {reason}")]
pub struct ParseError {
    reason: String,
}

/// Extracts a JSON value from raw provider text.
///
/// Providers asked for "JSON only" still wrap their output in markdown
/// fences or surround it with prose often enough that all tolerance for
/// those quirks lives here. Tries a fenced ```json block first, then the
/// whole trimmed text. Pure and deterministic.
pub fn extract_json(text: &str) -> Result<Value, ParseError> {
    if let Some(captures) = JSON_BLOCK.captures(text) {
        if let Some(inner) = captures.get(1) {
            if let Ok(value) = serde_json::from_str(inner.as_str()) {
                return Ok(value);
            }
        }
    }

    serde_json::from_str(text.trim()).map_err(|e| ParseError {
        reason: e.to_string(),
    })
}

//! JSON object extraction from oracle responses.
//!
//! Models asked for a JSON object still occasionally wrap it in a markdown
//! fence or surround it with prose. Strategies, in order:
//! 1. Fenced code block (```json ... ``` or plain ```)
//! 2. Content that is itself an object
//! 3. First balanced `{ ... }` anywhere in the content
//!
//! ```
//! use planguard::utils::json_extraction::extract_json_object;
//!
//! let object = extract_json_object("Sure:\n```json\n{\"period\": \"1 min\"}\n```").unwrap();
//! assert_eq!(object["period"], "1 min");
//! ```

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why no object could be extracted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

const FENCE_PATTERN: &str = r"(?s)```(?:json|JSON)?\s*\n?(.*?)```";

/// Index of the `}` closing the object that starts at the beginning of `s`.
///
/// String literals and escape sequences are skipped.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Number of `{` left open at the end of `s`.
fn unclosed_braces(s: &str) -> usize {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;
    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }
    depth.max(0) as usize
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Extracts the first JSON object found in `content`.
pub fn extract_json_object(content: &str) -> Result<Map<String, Value>, JsonExtractionError> {
    let trimmed = content.trim();

    if let Ok(fence) = Regex::new(FENCE_PATTERN) {
        for captures in fence.captures_iter(trimmed) {
            if let Some(object) = captures.get(1).and_then(|m| parse_object(m.as_str())) {
                return Ok(object);
            }
        }
    }

    if let Some(object) = parse_object(trimmed) {
        return Ok(object);
    }

    if let Some(start) = trimmed.find('{') {
        let tail = &trimmed[start..];
        if let Some(end) = find_matching_brace(tail) {
            if let Some(object) = parse_object(&tail[..=end]) {
                return Ok(object);
            }
        }
        let open = unclosed_braces(tail);
        if open > 0 {
            return Err(JsonExtractionError::Truncated {
                partial_preview: preview(tail, 100),
                unclosed_braces: open,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed, 50),
    })
}

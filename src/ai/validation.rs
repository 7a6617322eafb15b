//! LLM Response JSON Extraction
//!
//! Handles common LLM JSON output issues:
//! - Markdown code fence wrapping (```json ... ```)
//! - JSON embedded in explanatory text
//! - Leading BOM / stray whitespace

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{Result, TrainError};

/// Extract and parse JSON from an LLM response
///
/// This is the primary entry point for parsing LLM JSON output.
/// Handles markdown code blocks and JSON embedded in prose.
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    let cleaned = preprocess(content);

    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Ok(value);
    }

    debug!("Direct JSON parse failed, extracting from mixed content");

    if let Some(extracted) = extract_json_from_mixed(&cleaned)
        && let Ok(value) = serde_json::from_str::<Value>(&extracted)
    {
        warn!("JSON extracted from mixed content");
        return Ok(value);
    }

    Err(TrainError::LlmApi(format!(
        "Failed to parse JSON from LLM response. Content preview: {}...",
        &cleaned.chars().take(200).collect::<String>()
    )))
}

/// Preprocess raw input
fn preprocess(raw: &str) -> String {
    let mut s = raw.trim().to_string();

    s = strip_code_fences(&s);
    s = s.trim_start_matches('\u{feff}').to_string();
    s = s.trim().to_string();

    s
}

/// Strip markdown code fences
fn strip_code_fences(s: &str) -> String {
    let mut result = s.to_string();

    // Remove ```json ... ``` or ``` ... ```
    if result.starts_with("```")
        && let Some(first_newline) = result.find('\n')
    {
        result = result[first_newline + 1..].to_string();
    }

    if result.ends_with("```") {
        result = result[..result.len() - 3].trim_end().to_string();
    }

    result
}

/// Find the first balanced JSON object or array in mixed text
fn extract_json_from_mixed(s: &str) -> Option<String> {
    let start = s.find(['{', '['])?;
    let open = s.as_bytes()[start] as char;
    let close = if open == '{' { '}' } else { ']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(s[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

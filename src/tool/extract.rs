//! Recovers a structured tool call from free-form model output.
//!
//! The model is prompted to answer with `TOOL_CALL: {"name": ..., "arguments": {...}}`
//! when it needs data. Models wrap that object in prose, nest quoted braces
//! inside it, or cut it off before the last brace, so extraction runs two
//! strategies in order:
//!
//! 1. [`extract_balanced`]: a quote- and escape-aware brace-depth scan from the
//!    first `{` after the marker, with repair of missing closing braces.
//! 2. [`extract_flat`]: a narrow pattern for a single-level object directly
//!    after the marker.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use super::{ToolArgs, ToolCall};

/// Token that introduces a tool call in model output.
pub const TOOL_CALL_MARKER: &str = "TOOL_CALL:";

static FLAT_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"TOOL_CALL:\s*(\{[^}]*\})").expect("static pattern")
});

/// Reasons a strategy could not recover a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no TOOL_CALL: marker in text")]
    MissingMarker,
    #[error("no opening brace after the marker")]
    MissingOpenBrace,
    #[error("text ends inside a string literal")]
    UnterminatedString,
    #[error("no single-level object after the marker")]
    NoFlatObject,
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("call object has no string `name` field")]
    MissingName,
    #[error("`arguments` is not an object")]
    InvalidArguments,
}

/// Returns whether the text contains the tool-call marker.
pub fn has_tool_call_marker(text: &str) -> bool {
    text.contains(TOOL_CALL_MARKER)
}

/// Extracts the tool call from model output, or `None` when the text has no
/// marker or no strategy can recover a call with a name.
pub fn extract_tool_call(text: &str) -> Option<ToolCall> {
    if !has_tool_call_marker(text) {
        return None;
    }

    match extract_balanced(text) {
        Ok(call) => return Some(call),
        Err(e) => debug!(error = %e, "balanced extraction failed, trying flat pattern"),
    }

    match extract_flat(text) {
        Ok(call) => Some(call),
        Err(e) => {
            debug!(error = %e, "flat extraction failed");
            None
        }
    }
}

/// Brace-balanced strategy.
///
/// Scans from the first `{` after the marker, toggling string state on
/// unescaped quotes and skipping braces inside strings. A backslash escapes
/// the following character. Stops when depth returns to zero; if the text
/// ends first, the missing closing braces are appended.
pub fn extract_balanced(text: &str) -> Result<ToolCall, ExtractError> {
    let marker = text.find(TOOL_CALL_MARKER).ok_or(ExtractError::MissingMarker)?;
    let open = text[marker..]
        .find('{')
        .map(|offset| marker + offset)
        .ok_or(ExtractError::MissingOpenBrace)?;

    let json = balanced_object(&text[open..])?;
    parse_call(&json)
}

/// Flat strategy: `TOOL_CALL:` followed by an object with no nested braces.
pub fn extract_flat(text: &str) -> Result<ToolCall, ExtractError> {
    let captures = FLAT_CALL.captures(text).ok_or(ExtractError::NoFlatObject)?;
    let json = captures.get(1).map(|m| m.as_str()).ok_or(ExtractError::NoFlatObject)?;
    parse_call(json)
}

/// Returns the object starting at `text[0]` (which must be `{`), closing it
/// if the text runs out before the matching brace.
fn balanced_object(text: &str) -> Result<String, ExtractError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(text[..=i].to_string());
                }
            }
            _ => {}
        }
    }

    if in_string {
        return Err(ExtractError::UnterminatedString);
    }

    let mut repaired = text.trim_end().to_string();
    repaired.extend(std::iter::repeat_n('}', depth));
    Ok(repaired)
}

fn parse_call(json: &str) -> Result<ToolCall, ExtractError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(ExtractError::MissingName);
    };

    let name = match object.remove("name") {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return Err(ExtractError::MissingName),
    };

    let arguments = match object.remove("arguments") {
        None | Some(Value::Null) => ToolArgs::new(),
        Some(Value::Object(arguments)) => arguments,
        Some(_) => return Err(ExtractError::InvalidArguments),
    };

    Ok(ToolCall {
        name,
        arguments,
        raw: json.to_string(),
    })
}

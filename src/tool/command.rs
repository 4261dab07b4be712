//! Direct tool invocation from a command line, bypassing the model.
//!
//! `<tool> {"json": "object"}` or `<tool> key=value key=value` or
//! `<tool> value`, where a bare value binds to the tool's primary parameter.

use serde_json::Value;

use super::{ToolArgs, ToolDefinition};

/// Errors from parsing a direct-invocation command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("tool '{tool}' takes no parameters, got '{text}'")]
    NoParameterFor { tool: String, text: String },
}

/// A command split into its tool name and argument text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    /// The tool to invoke
    pub tool_name: String,
    /// Arguments in one of the accepted forms
    pub arguments: CommandArguments,
}

/// The argument part of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandArguments {
    /// A JSON object or `key=value` pairs
    Map(ToolArgs),
    /// A single value with no key
    Bare(String),
}

impl ParsedCommand {
    /// Resolves the arguments against the tool's definition.
    ///
    /// A bare value binds to the first required parameter, or the first
    /// declared one when nothing is required.
    pub fn into_arguments(
        self,
        definition: Option<&ToolDefinition>,
    ) -> Result<ToolArgs, CommandError> {
        match self.arguments {
            CommandArguments::Map(arguments) => Ok(arguments),
            CommandArguments::Bare(text) => {
                let Some((name, _)) = definition.and_then(ToolDefinition::primary_parameter) else {
                    return Err(CommandError::NoParameterFor {
                        tool: self.tool_name,
                        text,
                    });
                };
                let mut arguments = ToolArgs::new();
                arguments.insert(name.to_string(), coerce_value(&text));
                Ok(arguments)
            }
        }
    }
}

/// Parses `<tool> [arguments]`.
pub fn parse_command(text: &str) -> Result<ParsedCommand, CommandError> {
    let text = text.trim();
    let (tool_name, rest) = match text.split_once(char::is_whitespace) {
        Some((tool, rest)) => (tool, rest.trim()),
        None => (text, ""),
    };
    if tool_name.is_empty() {
        return Err(CommandError::Empty);
    }

    let arguments = if rest.is_empty() {
        CommandArguments::Map(ToolArgs::new())
    } else if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(rest) {
        CommandArguments::Map(map)
    } else if rest.contains('=') {
        CommandArguments::Map(parse_pairs(rest))
    } else {
        CommandArguments::Bare(rest.to_string())
    };

    Ok(ParsedCommand {
        tool_name: tool_name.to_string(),
        arguments,
    })
}

/// Parses whitespace-separated `key=value` pairs; tokens without `=` are skipped.
fn parse_pairs(text: &str) -> ToolArgs {
    text.split_whitespace()
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.to_string(), coerce_value(value)))
        .collect()
}

/// All-digit values become integers, `true`/`false` become booleans,
/// anything else stays a string.
pub fn coerce_value(value: &str) -> Value {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(number) = value.parse::<i64>() {
            return Value::from(number);
        }
    }
    if value.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if value.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(value.to_string())
}

pub mod command;
pub mod executor;
pub mod extract;

pub use command::{coerce_value, parse_command, CommandArguments, CommandError, ParsedCommand};
pub use executor::ToolExecutor;
pub use extract::{extract_tool_call, has_tool_call_marker, ExtractError, TOOL_CALL_MARKER};
pub use tool_types::{
    ParameterSpec, PriorToolResult, ToolArgs, ToolCall, ToolDefinition, ToolExecutionResult,
};

mod tool_types {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::collections::BTreeMap;

    /// Arguments passed to a tool: parameter name to JSON value.
    pub type ToolArgs = serde_json::Map<String, Value>;

    /// Type and description of a single tool parameter.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ParameterSpec {
        /// The JSON type name (`string`, `integer`, `boolean`, `object`, ...)
        #[serde(rename = "type")]
        pub param_type: String,
        /// What the parameter means
        pub description: String,
    }

    /// Definition of a tool that a data domain exposes to the model.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ToolDefinition {
        /// The name of the tool, unique across the registry
        pub name: String,
        /// A description of what the tool does
        pub description: String,
        /// Parameter schema keyed by parameter name
        #[serde(default)]
        pub parameters: BTreeMap<String, ParameterSpec>,
        /// Names of the parameters the caller must supply
        #[serde(default)]
        pub required: Vec<String>,
    }

    impl ToolDefinition {
        /// Creates a definition with no parameters.
        pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                description: description.into(),
                parameters: BTreeMap::new(),
                required: Vec::new(),
            }
        }

        /// Adds an optional parameter.
        pub fn param(
            mut self,
            name: impl Into<String>,
            param_type: impl Into<String>,
            description: impl Into<String>,
        ) -> Self {
            self.parameters.insert(
                name.into(),
                ParameterSpec {
                    param_type: param_type.into(),
                    description: description.into(),
                },
            );
            self
        }

        /// Adds a parameter and marks it required.
        pub fn required_param(
            mut self,
            name: impl Into<String>,
            param_type: impl Into<String>,
            description: impl Into<String>,
        ) -> Self {
            let name = name.into();
            self.required.push(name.clone());
            self.param(name, param_type, description)
        }

        /// Required parameters that have no entry in the schema.
        pub fn undeclared_required(&self) -> Vec<&str> {
            self.required
                .iter()
                .filter(|name| !self.parameters.contains_key(name.as_str()))
                .map(String::as_str)
                .collect()
        }

        /// The parameter a single bare command argument binds to.
        pub fn primary_parameter(&self) -> Option<(&str, &ParameterSpec)> {
            self.required
                .iter()
                .find_map(|name| self.parameters.get_key_value(name.as_str()))
                .or_else(|| self.parameters.iter().next())
                .map(|(name, spec)| (name.as_str(), spec))
        }
    }

    /// A tool invocation parsed out of model output or a command line.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolCall {
        /// Name of the tool to invoke
        pub name: String,
        /// Untyped arguments, validated by the owning domain
        #[serde(default)]
        pub arguments: ToolArgs,
        /// The text span the call was parsed from
        #[serde(skip)]
        pub raw: String,
    }

    impl ToolCall {
        /// Creates a call with no source text.
        pub fn new(name: impl Into<String>, arguments: ToolArgs) -> Self {
            Self {
                name: name.into(),
                arguments,
                raw: String::new(),
            }
        }

        /// Identity used for duplicate detection: the tool name plus the
        /// arguments serialized with keys sorted at every depth.
        pub fn canonical_key(&self) -> (String, String) {
            let arguments = canonicalize(&Value::Object(self.arguments.clone()));
            (self.name.clone(), arguments.to_string())
        }
    }

    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }

    /// Outcome of dispatching one tool call through the registry.
    #[derive(Debug, Clone, Serialize)]
    pub struct ToolExecutionResult {
        /// The tool that was called
        pub tool_name: String,
        /// The arguments it was called with
        pub arguments: ToolArgs,
        /// The domain's structured result, absent on failure
        pub raw_result: Option<Value>,
        /// Human-readable rendering (the error message on failure)
        pub formatted_result: String,
        /// Set when dispatch failed
        pub error: Option<String>,
        /// Wall-clock time spent in dispatch and formatting
        pub latency_seconds: f64,
    }

    impl ToolExecutionResult {
        /// Returns whether the dispatch failed.
        pub fn is_error(&self) -> bool {
            self.error.is_some()
        }

        /// Converts the outcome into evidence for the next prompt.
        pub fn to_evidence(&self) -> PriorToolResult {
            let formatted_result = match &self.error {
                Some(error) => format!("Error: {error}"),
                None => self.formatted_result.clone(),
            };
            PriorToolResult {
                tool_name: self.tool_name.clone(),
                formatted_result,
            }
        }
    }

    /// Evidence handed back to the model on later iterations.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PriorToolResult {
        /// The tool that produced the evidence
        pub tool_name: String,
        /// Its formatted output
        pub formatted_result: String,
    }

}

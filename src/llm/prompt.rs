//! System prompts that teach the model the `TOOL_CALL:` convention.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;

use crate::tool::{PriorToolResult, ToolDefinition, TOOL_CALL_MARKER};

/// Which system prompt the model client sends with tool-enabled requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptVariant {
    /// Plain instructions and question-style examples
    #[default]
    ToolUse,
    /// Asks for a one-sentence reflection before each tool call
    ToolUseReasoned,
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToolUse => write!(f, "tool_use"),
            Self::ToolUseReasoned => write!(f, "tool_use_reasoned"),
        }
    }
}

impl FromStr for PromptVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool_use" | "tool_use_v1" => Ok(Self::ToolUse),
            "tool_use_reasoned" => Ok(Self::ToolUseReasoned),
            other => Err(format!("unknown prompt variant '{other}'")),
        }
    }
}

struct Example {
    lead: &'static str,
    tool: &'static str,
    arguments: serde_json::Value,
}

impl PromptVariant {
    fn preamble(self) -> &'static str {
        match self {
            Self::ToolUse => concat!(
                "You are a data analyst for city open data.\n",
                "Use the provided tools to ground your answers in factual statistics.",
            ),
            Self::ToolUseReasoned => concat!(
                "You are an expert data analyst for city open data.\n",
                "Before selecting a tool, briefly reflect on the user's goal and required parameters.\n",
                "Keep the reflection concise (one sentence) then respond with the tool call if needed.",
            ),
        }
    }

    fn guidelines_heading(self) -> &'static str {
        match self {
            Self::ToolUse => "Guidelines for tool usage:",
            Self::ToolUseReasoned => "Reasoning and tool usage rules:",
        }
    }

    fn guidelines(self) -> &'static [&'static str] {
        match self {
            Self::ToolUse => &[
                "You can call tools iteratively: after each tool result you will be prompted again. Call another tool if more data is needed to fully answer the question.",
                "For cross-dataset questions (e.g. a per-capita rate), call one tool at a time and combine the results.",
                "Do NOT repeat a tool call with the same arguments; that data is already in the prior results.",
                "Include `start_year`/`end_year` when the user references a specific year.",
                "For 'which had the most' questions set `group_by` to the field being ranked.",
                "Supply integers for numeric parameters and `true`/`false` for booleans.",
                "When you have enough data to answer, respond with your analysis and do NOT call another tool.",
            ],
            Self::ToolUseReasoned => &[
                "You can call tools iteratively: after each tool result you will be prompted again. Call another tool only if you still need more data.",
                "State the reasoning for the chosen tool before the TOOL_CALL: line.",
                "For cross-dataset questions, call one tool at a time; you will get the result and can call another.",
                "Do NOT repeat a tool call with identical arguments.",
                "After executing tool(s), synthesize a clear answer by combining all results.",
                "Use `group_by` whenever the user asks which entity had the most, or for top-N rankings.",
            ],
        }
    }

    fn examples(self) -> Vec<Example> {
        let (year, ranking, population) = match self {
            Self::ToolUse => (
                "How many homicides in 2023?",
                "Which district had the most homicides in 2022?",
                "What is the population of Austin?",
            ),
            Self::ToolUseReasoned => (
                "Need filtered homicide counts for 2023.",
                "User wants a district ranking for 2022.",
                "Need population to compute a per-capita rate.",
            ),
        };
        vec![
            Example {
                lead: year,
                tool: "query_homicides",
                arguments: json!({"start_year": 2023, "end_year": 2023}),
            },
            Example {
                lead: ranking,
                tool: "query_homicides",
                arguments: json!({"start_year": 2022, "end_year": 2022, "group_by": "district", "top_n": 1}),
            },
            Example {
                lead: population,
                tool: "query_census",
                arguments: json!({"filters": {"community_area": "Austin"}}),
            },
        ]
    }

    fn format_example(self, example: &Example) -> String {
        let payload = json!({"name": example.tool, "arguments": example.arguments});
        match self {
            Self::ToolUse => format!("- Question: \"{}\"\n  {TOOL_CALL_MARKER} {payload}", example.lead),
            Self::ToolUseReasoned => {
                format!("- Reasoning: \"{}\"\n  {TOOL_CALL_MARKER} {payload}", example.lead)
            }
        }
    }
}

/// One catalogue line: `- name: description`, plus a parameter line when
/// the tool takes any.
pub fn summarize_tool(tool: &ToolDefinition) -> String {
    if tool.parameters.is_empty() {
        return format!("- {}: {}", tool.name, tool.description);
    }

    let params: Vec<String> = tool
        .parameters
        .iter()
        .map(|(name, spec)| {
            let required = tool.required.iter().any(|r| r == name);
            let hint = match (spec.description.is_empty(), required) {
                (true, true) => "required".to_string(),
                (false, true) => format!("{} (required)", spec.description),
                _ => spec.description.clone(),
            };
            format!("{name}: {hint}").trim().to_string()
        })
        .collect();

    format!("- {}: {}\n  Parameters: {}", tool.name, tool.description, params.join("; "))
}

fn prior_results_section(prior: &[PriorToolResult]) -> String {
    if prior.is_empty() {
        return String::new();
    }

    let mut parts =
        vec!["You have already called the following tools and received these results:\n".to_string()];
    for (idx, result) in prior.iter().enumerate() {
        parts.push(format!("--- Tool Call {}: {} ---", idx + 1, result.tool_name));
        parts.push(result.formatted_result.clone());
        parts.push(String::new());
    }
    parts.push(format!(
        "If you need additional data from a DIFFERENT tool, emit another {TOOL_CALL_MARKER}\n\
         If you have enough data to answer, respond directly and do NOT emit {TOOL_CALL_MARKER}\n\n"
    ));
    parts.join("\n")
}

/// Builds the system prompt for a tool-enabled request.
pub fn build_tool_system_prompt(
    variant: PromptVariant,
    tools: &[ToolDefinition],
    prior: &[PriorToolResult],
) -> String {
    let tool_summaries = if tools.is_empty() {
        "- No tools available".to_string()
    } else {
        tools.iter().map(summarize_tool).collect::<Vec<_>>().join("\n")
    };

    let guidelines: Vec<String> = variant.guidelines().iter().map(|rule| format!("- {rule}")).collect();
    let examples: Vec<String> = variant
        .examples()
        .iter()
        .map(|example| variant.format_example(example))
        .collect();

    format!(
        "{preamble}\n\n\
         Available tools:\n{tool_summaries}\n\n\
         {heading}\n{guidelines}\n\n\
         When a tool is required respond ONLY with a JSON object prefixed by '{TOOL_CALL_MARKER}' on the same line.\n\
         Format: {TOOL_CALL_MARKER} {{\"name\": \"tool_name\", \"arguments\": {{...}}}}\n\n\
         {prior}\
         Examples:\n{examples}\n\n\
         If no more tools are needed, answer the question directly using any data already provided.",
        preamble = variant.preamble(),
        heading = variant.guidelines_heading(),
        guidelines = guidelines.join("\n"),
        prior = prior_results_section(prior),
        examples = examples.join("\n"),
    )
}

/// The full prompt text for a tool-enabled request.
pub fn compose_tool_prompt(
    variant: PromptVariant,
    question: &str,
    tools: &[ToolDefinition],
    prior: &[PriorToolResult],
) -> String {
    format!(
        "{}\n\nUser question: {question}",
        build_tool_system_prompt(variant, tools, prior)
    )
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::tool::{ToolCall, ToolExecutionResult};

/// Why an orchestration run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The model answered without requesting a tool
    Final,
    /// The wall-clock budget ran out
    Timeout,
    /// A tool call was requested but could not be extracted
    ParseError,
    /// The model repeated a call it had already made
    Duplicate,
    /// The iteration cap was reached
    MaxIterations,
    /// The model client failed
    ModelError,
    /// The event stream consumer went away
    Cancelled,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Final => "final",
            Self::Timeout => "timeout",
            Self::ParseError => "parse_error",
            Self::Duplicate => "duplicate",
            Self::MaxIterations => "max_iterations",
            Self::ModelError => "model_error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// What happened in one iteration of the loop.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    /// 1-based iteration number
    pub iteration: usize,
    /// Leading part of the model's response
    pub model_response: String,
    /// Whether the model asked for a tool
    pub needs_tool_call: bool,
    /// The call extracted from the response
    pub tool_call: Option<ToolCall>,
    /// The dispatch outcome, when the call was executed
    pub tool_execution: Option<ToolExecutionResult>,
    /// Parse or model failure text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set on the iteration whose response became the answer
    #[serde(rename = "final")]
    pub is_final: bool,
}

impl IterationRecord {
    /// Creates a record for a model response.
    pub fn new(iteration: usize, model_response: String, needs_tool_call: bool) -> Self {
        Self {
            iteration,
            model_response,
            needs_tool_call,
            tool_call: None,
            tool_execution: None,
            error: None,
            is_final: false,
        }
    }
}

/// Full record of one question's orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionTrace {
    pub run_id: Uuid,
    pub question: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub iterations: Vec<IterationRecord>,
    pub final_answer: Option<String>,
    pub exit: Option<ExitReason>,
}

impl InteractionTrace {
    /// Starts a trace for a question.
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            question: question.into(),
            started_at: Utc::now(),
            finished_at: None,
            iterations: Vec::new(),
            final_answer: None,
            exit: None,
        }
    }

    /// Tool executions in call order.
    pub fn tool_executions(&self) -> impl Iterator<Item = &ToolExecutionResult> {
        self.iterations
            .iter()
            .filter_map(|record| record.tool_execution.as_ref())
    }

    /// Number of calls that were dispatched to a domain.
    pub fn dispatch_count(&self) -> usize {
        self.tool_executions().count()
    }

    pub(crate) fn finish(&mut self, answer: &str, exit: ExitReason) {
        self.final_answer = Some(answer.to_string());
        self.exit = Some(exit);
        self.finished_at = Some(Utc::now());
    }
}

/// The answer to a question together with how it was reached.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationOutcome {
    pub answer: String,
    pub trace: InteractionTrace,
}

impl OrchestrationOutcome {
    /// Why the run stopped.
    pub fn exit(&self) -> Option<ExitReason> {
        self.trace.exit
    }
}

/// First `max_chars` characters of `text`.
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

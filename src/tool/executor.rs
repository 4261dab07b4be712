use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::domain::DomainRegistry;
use crate::tool::{ToolCall, ToolDefinition, ToolExecutionResult};

/// Executes tool calls parsed from model output against the registry.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: Arc<DomainRegistry>,
}

impl ToolExecutor {
    /// Creates a new tool executor with the given registry.
    pub fn new(registry: Arc<DomainRegistry>) -> Self {
        Self { registry }
    }

    /// Returns all tool definitions for passing to the model.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry.tool_definitions()
    }

    /// The registry calls are routed through.
    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    /// Executes a single tool call.
    ///
    /// Failures never propagate: an unknown tool or a failing domain yields a
    /// result whose `error` is set and whose formatted text carries the message.
    pub async fn execute(&self, call: &ToolCall) -> ToolExecutionResult {
        let started = Instant::now();

        let (raw_result, formatted_result, error) =
            match self.registry.dispatch(&call.name, &call.arguments).await {
                Ok(value) => {
                    let formatted = self.registry.format(&value, Some(&call.name));
                    (Some(value), formatted, None)
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "tool call failed");
                    (None, format!("Error: {e}"), Some(e.to_string()))
                }
            };

        let latency_seconds = started.elapsed().as_secs_f64();
        debug!(tool = %call.name, latency_seconds, "tool call finished");

        ToolExecutionResult {
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            raw_result,
            formatted_result,
            error,
            latency_seconds,
        }
    }
}

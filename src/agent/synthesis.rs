//! Final-answer synthesis from accumulated tool evidence.

use tracing::{info, warn};

use crate::llm::{non_empty_reply, ModelClient};
use crate::tool::PriorToolResult;

/// Builds the follow-up prompt that asks for one answer over all evidence.
pub fn build_synthesis_prompt(question: &str, evidence: &[PriorToolResult]) -> String {
    let sections: Vec<String> = evidence
        .iter()
        .map(|result| format!("--- {} ---\n{}", result.tool_name, result.formatted_result))
        .collect();

    format!(
        "Based on the following data from multiple tools:\n\n\
         {}\n\n\
         Please answer the original question: \"{question}\"\n\n\
         Provide a clear, informative answer combining all available data. \
         If some data is missing or approximate, note that.",
        sections.join("\n\n")
    )
}

/// Asks the model for a final answer over `evidence`.
///
/// With no evidence the model is not called. Generation failures and blank
/// replies become the answer text.
pub async fn synthesize(
    client: &dyn ModelClient,
    question: &str,
    evidence: &[PriorToolResult],
    reason: &str,
) -> String {
    if evidence.is_empty() {
        return format!("No tool results to synthesize ({reason})");
    }

    info!(results = evidence.len(), reason, "synthesizing final answer");

    match client.generate(&build_synthesis_prompt(question, evidence)).await {
        Ok(answer) => non_empty_reply(answer),
        Err(e) => {
            warn!(error = %e, "synthesis failed");
            format!("Error generating response: {e}")
        }
    }
}

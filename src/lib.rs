//! # Civic Agent
//!
//! Tool-calling question answering over municipal open-data datasets.
//!
//! A language model answers a question by emitting `TOOL_CALL:` requests
//! that are routed to data domains. The loop accumulates each tool result as
//! evidence and stops when the model answers, repeats itself, or runs out of
//! iterations or time.
//!
//! ## Features
//!
//! - **Domain Registry**: one routing table over independent data domains
//! - **Tool-Call Extraction**: recovers calls from free-form model text
//! - **Orchestration Loop**: bounded multi-tool loop with duplicate detection
//! - **Synthesis**: a final answer over all gathered evidence
//! - **OpenAI Integration**: any OpenAI-compatible chat completions API
//!
//! ## Quick Start
//!
//! ```no_run
//! use civic_agent::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = DomainRegistry::new();
//!     registry.register(Arc::new(TableDomain::from_json_file("data/homicides.json")?))?;
//!
//!     let client = LLMClientBuilder::new().build_openai()?;
//!     let orchestrator = Orchestrator::with_defaults(Arc::new(registry), client);
//!
//!     let outcome = orchestrator.run("How many homicides in 2023?").await;
//!     println!("{}", outcome.answer);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod domain;
pub mod error;
pub mod llm;
pub mod tool;

// Re-exports for convenient usage
pub use agent::{
    AgentConfig, ExitReason, InteractionTrace, OrchestrationEvent, OrchestrationOutcome, Orchestrator,
};
pub use domain::{DataDomain, DomainError, DomainRegistry, DynDomain, TableDomain};
pub use error::AgentError;
pub use llm::{LLMClientBuilder, LLMError, ModelClient, OpenAIClient, ToolResponse};
pub use tool::{ToolArgs, ToolCall, ToolDefinition, ToolExecutionResult, ToolExecutor};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::agent::{AgentConfig, ExitReason, OrchestrationOutcome, Orchestrator};
    pub use crate::domain::{load_dir, DataDomain, DomainRegistry, DynDomain, TableDomain};
    pub use crate::llm::{LLMClientBuilder, ModelClient};
    pub use crate::tool::{ToolArgs, ToolCall, ToolDefinition};
    pub use crate::AgentError;
}

pub mod config;
pub mod orchestrator;
pub mod synthesis;
pub mod trace;

pub use config::{AgentConfig, AgentConfigBuilder};
pub use orchestrator::{OrchestrationEvent, OrchestrationStream, Orchestrator};
pub use synthesis::{build_synthesis_prompt, synthesize};
pub use trace::{ExitReason, InteractionTrace, IterationRecord, OrchestrationOutcome};

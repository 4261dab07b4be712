//! Error types for the civic-agent library.

use thiserror::Error;

/// Unified error type for building and driving the agent.
///
/// The orchestration loop itself never fails; this covers the setup paths
/// around it: configuration, registry construction and direct tool calls.
#[derive(Debug, Error)]
pub enum AgentError {
    /// LLM-related error
    #[error("LLM error: {0}")]
    LLM(#[from] crate::llm::LLMError),

    /// A domain reported a failure outside the loop
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Registry construction failed
    #[error("Registration error: {0}")]
    Registration(#[from] crate::domain::RegistrationError),

    /// A direct tool call failed
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] crate::domain::DispatchError),

    /// A direct-invocation command could not be parsed
    #[error("Command error: {0}")]
    Command(#[from] crate::tool::CommandError),

    /// A dataset could not be loaded
    #[error("Load error: {0}")]
    Load(#[from] crate::domain::table::LoadError),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

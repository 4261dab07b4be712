pub mod registry;
pub mod table;

pub use registry::{DispatchError, DomainRegistration, DomainRegistry, RegistrationError};
pub use table::{load_dir, TableDomain};

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::tool::{ToolArgs, ToolDefinition};

/// Errors a data domain reports from its own tool logic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Domain '{0}' has no data loaded")]
    NotLoaded(String),
    #[error("Tool '{0}' is not provided by this domain")]
    UnsupportedTool(String),
    #[error("Cannot format result: {0}")]
    Format(String),
}

/// A self-contained data provider exposing tools to the model.
///
/// The registry only ever sees domains through this trait.
#[async_trait]
pub trait DataDomain: Send + Sync {
    /// Short unique identifier, e.g. `homicides` or `census_demographics`.
    fn id(&self) -> &str;

    /// Tools this domain provides, in declaration order.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Executes one of this domain's tools.
    async fn call_tool(&self, name: &str, arguments: &ToolArgs) -> Result<Value, DomainError>;

    /// Renders a raw result of one of this domain's tools for the model.
    fn format_result(&self, result: &Value) -> Result<String, DomainError>;

    /// Whether the domain has data ready to query.
    fn is_loaded(&self) -> bool;

    /// Names of the tools this domain provides.
    fn tool_names(&self) -> Vec<String> {
        self.tool_definitions().into_iter().map(|d| d.name).collect()
    }
}

/// A shared handle to a data domain.
pub type DynDomain = Arc<dyn DataDomain>;

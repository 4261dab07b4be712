use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, info, warn};

use super::DynDomain;
use crate::tool::{ToolArgs, ToolDefinition};

/// Errors that stop a domain from being registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// Two domains declare the same tool name
    #[error("tool '{tool}' is already provided by domain '{existing}', cannot register it for '{incoming}'")]
    Conflict {
        tool: String,
        existing: String,
        incoming: String,
    },
    /// One domain declares the same tool twice
    #[error("domain '{domain}' declares tool '{tool}' more than once")]
    DuplicateTool { domain: String, tool: String },
    /// A tool definition is malformed
    #[error("domain '{domain}' has an invalid definition for tool '{tool}': {reason}")]
    InvalidDefinition {
        domain: String,
        tool: String,
        reason: String,
    },
    /// The domain failed to load its data
    #[error("domain '{domain}' has no data loaded")]
    NotLoaded { domain: String },
}

/// Failure to produce a result for a tool call. Returned as data, never raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// No registered domain provides the tool
    #[error("Tool '{name}' not found. Available tools: {}", list_or_none(.available))]
    UnknownTool { name: String, available: Vec<String> },
    /// The owning domain failed
    #[error("Error calling tool '{tool}': {message}")]
    Execution { tool: String, message: String },
}

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}

/// A registered domain and the tools it declared at registration time.
#[derive(Clone)]
pub struct DomainRegistration {
    id: String,
    domain: DynDomain,
    definitions: Vec<ToolDefinition>,
}

impl DomainRegistration {
    /// The domain identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tool definitions, in the domain's declaration order.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }
}

impl fmt::Debug for DomainRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainRegistration")
            .field("id", &self.id)
            .field("tools", &self.definitions.iter().map(|d| &d.name).collect::<Vec<_>>())
            .finish()
    }
}

/// Owns the data domains and routes tool calls to them.
///
/// Built once at startup and shared read-only afterwards, so concurrent
/// orchestration runs can dispatch through it without locking.
#[derive(Clone, Default)]
pub struct DomainRegistry {
    registrations: Vec<DomainRegistration>,
    // tool name -> index into `registrations`
    index: HashMap<String, usize>,
}

impl DomainRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a domain and indexes its tools.
    ///
    /// Registering an id that is already present replaces that registration
    /// in place. The whole registration is checked before anything changes,
    /// so on error the registry is left as it was.
    pub fn register(&mut self, domain: DynDomain) -> Result<(), RegistrationError> {
        let id = domain.id().to_string();
        let definitions = domain.tool_definitions();
        self.check(&id, &definitions)?;

        let tool_count = definitions.len();
        let registration = DomainRegistration {
            id: id.clone(),
            domain,
            definitions,
        };
        match self.registrations.iter().position(|r| r.id == id) {
            Some(pos) => {
                debug!(domain = %id, "replacing existing registration");
                self.registrations[pos] = registration;
            }
            None => self.registrations.push(registration),
        }
        self.reindex();

        info!(domain = %id, tools = tool_count, "registered domain");
        Ok(())
    }

    /// Registers each domain that has data loaded, skipping the rest.
    ///
    /// Failures are logged and returned; they do not stop later domains
    /// from registering.
    pub fn register_all<I>(&mut self, domains: I) -> Vec<RegistrationError>
    where
        I: IntoIterator<Item = DynDomain>,
    {
        let mut failures = Vec::new();
        for domain in domains {
            let result = if domain.is_loaded() {
                self.register(domain)
            } else {
                Err(RegistrationError::NotLoaded {
                    domain: domain.id().to_string(),
                })
            };
            if let Err(e) = result {
                warn!(error = %e, "skipping domain");
                failures.push(e);
            }
        }
        info!(
            domains = self.registrations.len(),
            tools = self.index.len(),
            "domain registry initialized"
        );
        failures
    }

    fn check(&self, id: &str, definitions: &[ToolDefinition]) -> Result<(), RegistrationError> {
        let mut declared = HashSet::new();
        for definition in definitions {
            let invalid = |reason: String| RegistrationError::InvalidDefinition {
                domain: id.to_string(),
                tool: definition.name.clone(),
                reason,
            };
            if definition.name.trim().is_empty() {
                return Err(invalid("empty tool name".to_string()));
            }
            let undeclared = definition.undeclared_required();
            if !undeclared.is_empty() {
                return Err(invalid(format!(
                    "required parameters missing from schema: {}",
                    undeclared.join(", ")
                )));
            }
            if !declared.insert(definition.name.as_str()) {
                return Err(RegistrationError::DuplicateTool {
                    domain: id.to_string(),
                    tool: definition.name.clone(),
                });
            }
            if let Some(existing) = self.owner_of(&definition.name) {
                if existing != id {
                    return Err(RegistrationError::Conflict {
                        tool: definition.name.clone(),
                        existing: existing.to_string(),
                        incoming: id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn reindex(&mut self) {
        self.index = self
            .registrations
            .iter()
            .enumerate()
            .flat_map(|(pos, r)| r.definitions.iter().map(move |d| (d.name.clone(), pos)))
            .collect();
    }

    fn registration_for(&self, tool_name: &str) -> Option<&DomainRegistration> {
        self.index.get(tool_name).map(|&pos| &self.registrations[pos])
    }

    /// Returns the id of the domain that provides a tool.
    pub fn owner_of(&self, tool_name: &str) -> Option<&str> {
        self.registration_for(tool_name).map(|r| r.id.as_str())
    }

    /// Gets a tool's definition by name.
    pub fn tool_definition(&self, tool_name: &str) -> Option<&ToolDefinition> {
        self.registration_for(tool_name)?
            .definitions
            .iter()
            .find(|d| d.name == tool_name)
    }

    /// All tool definitions, in registration order then declaration order.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registrations
            .iter()
            .flat_map(|r| r.definitions.iter().cloned())
            .collect()
    }

    /// All tool names, in the same order as [`Self::tool_definitions`].
    pub fn tool_names(&self) -> Vec<String> {
        self.registrations
            .iter()
            .flat_map(|r| r.definitions.iter().map(|d| d.name.clone()))
            .collect()
    }

    /// Returns the number of registered domains.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns whether no domain is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Returns the number of indexed tools.
    pub fn tool_count(&self) -> usize {
        self.index.len()
    }

    /// Routes a tool call to the domain that owns it.
    ///
    /// Unknown tools, domain errors, domain panics and results carrying an
    /// `error` field all come back as [`DispatchError`].
    pub async fn dispatch(&self, tool_name: &str, arguments: &ToolArgs) -> Result<Value, DispatchError> {
        let Some(registration) = self.registration_for(tool_name) else {
            return Err(DispatchError::UnknownTool {
                name: tool_name.to_string(),
                available: self.tool_names(),
            });
        };

        debug!(tool = %tool_name, domain = %registration.id, "dispatching tool call");

        let outcome = AssertUnwindSafe(registration.domain.call_tool(tool_name, arguments))
            .catch_unwind()
            .await;

        let execution = |message: String| DispatchError::Execution {
            tool: tool_name.to_string(),
            message,
        };

        match outcome {
            Ok(Ok(value)) => match reported_error(&value) {
                Some(message) => Err(execution(message)),
                None => Ok(value),
            },
            Ok(Err(e)) => Err(execution(e.to_string())),
            Err(panic) => Err(execution(format!("domain panicked: {}", panic_message(&*panic)))),
        }
    }

    /// Renders a raw result as text.
    ///
    /// Uses the owning domain's formatter when `tool_name` resolves. Otherwise
    /// tries each domain in registration order, then a generic JSON rendering.
    /// A formatter that panics counts as one that failed.
    pub fn format(&self, result: &Value, tool_name: Option<&str>) -> String {
        if let Some(registration) = tool_name.and_then(|name| self.registration_for(name)) {
            return try_format(registration, result).unwrap_or_else(|message| {
                warn!(domain = %registration.id, error = %message, "domain formatter failed");
                generic_rendering(result)
            });
        }

        self.registrations
            .iter()
            .find_map(|r| try_format(r, result).ok())
            .unwrap_or_else(|| generic_rendering(result))
    }
}

fn try_format(registration: &DomainRegistration, result: &Value) -> Result<String, String> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| registration.domain.format_result(result))) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("formatter panicked: {}", panic_message(&*panic))),
    }
}

/// Domains may report failure as `{"error": "..."}` instead of an `Err`.
fn reported_error(value: &Value) -> Option<String> {
    value.get("error").and_then(Value::as_str).map(str::to_string)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Key-value rendering used when no domain can format a result.
pub fn generic_rendering(result: &Value) -> String {
    let pretty = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    format!("Result:\n```json\n{pretty}\n```")
}

impl fmt::Debug for DomainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainRegistry")
            .field("domains", &self.registrations.iter().map(|r| &r.id).collect::<Vec<_>>())
            .field("tools_count", &self.index.len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a DomainRegistry {
    type Item = &'a DomainRegistration;
    type IntoIter = std::slice::Iter<'a, DomainRegistration>;

    fn into_iter(self) -> Self::IntoIter {
        self.registrations.iter()
    }
}

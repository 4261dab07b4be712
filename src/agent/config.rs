//! Loop budgets with builder and environment variable support.
//!
//! Values are resolved in order: explicit → environment → defaults.

use std::time::Duration;

use crate::error::AgentError;

/// Default maximum tool-calling iterations per question.
pub const DEFAULT_MAX_ITERATIONS: usize = 4;
/// Default wall-clock budget per question, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;
/// Default length of the model-response preview kept in traces.
pub const DEFAULT_PREVIEW_CHARS: usize = 500;

/// Configuration for the orchestration loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Maximum iterations before synthesizing from gathered evidence
    pub max_iterations: usize,
    /// Wall-clock budget, checked at the top of every iteration
    pub total_timeout: Duration,
    /// Characters of each model response recorded in the trace
    pub preview_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            total_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from `CIVIC_MAX_ITERATIONS` and
    /// `CIVIC_TIMEOUT_SECS`, with defaults for anything unset.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    max_iterations: Option<usize>,
    total_timeout: Option<Duration>,
    preview_chars: Option<usize>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.max_iterations.is_none() {
            self.max_iterations = std::env::var("CIVIC_MAX_ITERATIONS")
                .ok()
                .and_then(|v| v.trim().parse().ok());
        }
        if self.total_timeout.is_none() {
            self.total_timeout = std::env::var("CIVIC_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs);
        }
        self
    }

    /// Sets the iteration cap.
    #[must_use]
    pub const fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets the wall-clock budget.
    #[must_use]
    pub const fn total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Sets the trace preview length.
    #[must_use]
    pub const fn preview_chars(mut self, n: usize) -> Self {
        self.preview_chars = Some(n);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] for a zero iteration cap or a zero timeout.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".to_string()));
        }

        let total_timeout = self
            .total_timeout
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        if total_timeout.is_zero() {
            return Err(AgentError::Config("total_timeout must be positive".to_string()));
        }

        Ok(AgentConfig {
            max_iterations,
            total_timeout,
            preview_chars: self.preview_chars.unwrap_or(DEFAULT_PREVIEW_CHARS),
        })
    }
}

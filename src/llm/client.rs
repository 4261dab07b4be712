use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::openai::OpenAIClient;
use super::prompt::PromptVariant;
use crate::tool::{PriorToolResult, ToolDefinition};

/// Model used when neither the builder nor `CIVIC_MODEL` names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Answer used when the model returns no text at all.
pub const EMPTY_RESPONSE: &str = "No response generated (may have been filtered)";

/// Replaces blank model text with [`EMPTY_RESPONSE`].
pub fn non_empty_reply(text: String) -> String {
    if text.trim().is_empty() {
        EMPTY_RESPONSE.to_string()
    } else {
        text
    }
}

/// Reply to a tool-enabled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// The raw text the model produced
    pub content: String,
    /// Whether the text contains a `TOOL_CALL:` marker
    pub needs_tool_call: bool,
}

impl ToolResponse {
    /// Creates a response, flagging it when it carries the tool-call marker.
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        let needs_tool_call = crate::tool::has_tool_call_marker(&content);
        Self {
            content,
            needs_tool_call,
        }
    }
}

/// Errors that can occur when communicating with an LLM.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    /// An API error occurred
    #[error("API error: {0}")]
    ApiError(String),
    /// A network error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    /// The response from the LLM was invalid
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),
    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),
}

/// The language model as the orchestration loop sees it.
///
/// Implementations own the prompt format: how the tool catalogue and prior
/// evidence are embedded is their business.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Plain generation with no tools attached.
    async fn generate(&self, prompt: &str) -> Result<String, LLMError>;

    /// Generation with the tool catalogue and the evidence gathered so far.
    async fn generate_with_tools(
        &self,
        question: &str,
        tools: &[ToolDefinition],
        prior: &[PriorToolResult],
    ) -> Result<ToolResponse, LLMError>;
}

/// A builder for creating model clients.
#[derive(Debug, Default)]
pub struct LLMClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout: Option<Duration>,
    prompt_variant: PromptVariant,
}

impl LLMClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the completion token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the system prompt variant for tool-enabled requests.
    pub fn with_prompt_variant(mut self, variant: PromptVariant) -> Self {
        self.prompt_variant = variant;
        self
    }

    /// Creates an OpenAI-compatible client.
    ///
    /// Unset values fall back to `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `CIVIC_MODEL`.
    pub fn build_openai(self) -> Result<Arc<dyn ModelClient>, LLMError> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or_else(|| LLMError::AuthError("OpenAI API key not provided".to_string()))?;
        let base_url = self
            .base_url
            .or_else(|| std::env::var("OPENAI_BASE_URL").ok());
        let model = self
            .model
            .or_else(|| std::env::var("CIVIC_MODEL").ok())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let mut client = OpenAIClient::new(api_key, base_url, self.timeout)?
            .with_model(model)
            .with_prompt_variant(self.prompt_variant);
        if let Some(temperature) = self.temperature {
            client = client.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            client = client.with_max_tokens(max_tokens);
        }

        Ok(Arc::new(client))
    }
}

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::client::{non_empty_reply, ToolResponse, DEFAULT_MODEL};
use super::prompt::{compose_tool_prompt, PromptVariant};
use super::{LLMError, ModelClient};
use crate::tool::{PriorToolResult, ToolDefinition};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// OpenAI API response for chat completions.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    stream: bool,
}

/// A model client for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    prompt_variant: PromptVariant,
}

impl OpenAIClient {
    /// Creates a new OpenAI client.
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, LLMError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| LLMError::AuthError("API key is not a valid header value".to_string()))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let mut client_builder = reqwest::Client::builder().default_headers(headers);

        if let Some(timeout) = timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(Self {
            client: client_builder.build()?,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            prompt_variant: PromptVariant::default(),
        })
    }

    /// Sets the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the completion token limit.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the system prompt variant for tool-enabled requests.
    pub fn with_prompt_variant(mut self, variant: PromptVariant) -> Self {
        self.prompt_variant = variant;
        self
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_body(&self, prompt: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![serde_json::json!({
                "role": "user",
                "content": prompt
            })],
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            stream: false,
        }
    }

    /// Creates a request builder for chat completions.
    fn chat_completions_request(&self, prompt: &str) -> RequestBuilder {
        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending request to OpenAI");

        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&self.chat_body(prompt))
    }

    async fn complete(&self, prompt: &str) -> Result<String, LLMError> {
        let response = self.chat_completions_request(prompt).send().await?;
        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;

        parse_completion(status, &response_text)
    }
}

/// Maps an HTTP status and body to the completion text.
fn parse_completion(status: StatusCode, body: &str) -> Result<String, LLMError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            return Err(LLMError::AuthError(body.to_string()));
        }
        StatusCode::TOO_MANY_REQUESTS => return Err(LLMError::RateLimitError(body.to_string())),
        s if !s.is_success() => return Err(LLMError::ApiError(format!("{s}: {body}"))),
        _ => {}
    }

    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| LLMError::InvalidResponse(format!("{}: {}", e, body)))?;

    let Some(choice) = response.choices.into_iter().next() else {
        return Err(LLMError::InvalidResponse(format!(
            "No choices in response. Response: {}",
            body
        )));
    };

    debug!(
        model = %response.model,
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        input_tokens = response.usage.prompt_tokens,
        output_tokens = response.usage.completion_tokens,
        "LLM response received"
    );

    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl ModelClient for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<String, LLMError> {
        self.complete(prompt).await.map(non_empty_reply)
    }

    async fn generate_with_tools(
        &self,
        question: &str,
        tools: &[ToolDefinition],
        prior: &[PriorToolResult],
    ) -> Result<ToolResponse, LLMError> {
        let prompt = compose_tool_prompt(self.prompt_variant, question, tools, prior);
        let content = self.complete(&prompt).await?;
        Ok(ToolResponse::from_content(non_empty_reply(content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAIClient {
        OpenAIClient::new("sk-test".to_string(), Some("http://localhost:8080/v1/".to_string()), None)
            .unwrap()
    }

    #[test]
    fn test_new_normalizes_base_url() {
        let client = client();
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_invalid_api_key_is_auth_error() {
        let err = OpenAIClient::new("sk\ntest".to_string(), None, None).unwrap_err();
        assert!(matches!(err, LLMError::AuthError(_)));
    }

    #[test]
    fn test_chat_body() {
        let body = client().with_model("llama-3.1-8b").with_max_tokens(256).chat_body("Hi");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "llama-3.1-8b");
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"], serde_json::json!([{"role": "user", "content": "Hi"}]));
    }

    #[test]
    fn test_parse_completion_success() {
        let body = r#"{
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "617"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 1}
        }"#;
        assert_eq!(parse_completion(StatusCode::OK, body).unwrap(), "617");
    }

    #[test]
    fn test_parse_completion_errors() {
        assert!(matches!(
            parse_completion(StatusCode::UNAUTHORIZED, "bad key"),
            Err(LLMError::AuthError(_))
        ));
        assert!(matches!(
            parse_completion(StatusCode::FORBIDDEN, "no access"),
            Err(LLMError::AuthError(_))
        ));
        assert!(matches!(
            parse_completion(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            Err(LLMError::RateLimitError(_))
        ));
        assert!(matches!(
            parse_completion(StatusCode::BAD_GATEWAY, "upstream"),
            Err(LLMError::ApiError(_))
        ));
        assert!(matches!(
            parse_completion(StatusCode::OK, r#"{"choices": []}"#),
            Err(LLMError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion(StatusCode::OK, "<html>"),
            Err(LLMError::InvalidResponse(_))
        ));
    }
}

pub mod client;
pub mod openai;
pub mod prompt;

pub use client::{
    non_empty_reply, LLMClientBuilder, LLMError, ModelClient, ToolResponse, DEFAULT_MODEL,
    EMPTY_RESPONSE,
};
pub use openai::OpenAIClient;
pub use prompt::{build_tool_system_prompt, compose_tool_prompt, summarize_tool, PromptVariant};

#[cfg(test)]
pub use client::MockModelClient;

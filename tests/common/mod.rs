//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use civic_agent::domain::{DataDomain, DomainError, DomainRegistry, DynDomain};
use civic_agent::llm::{LLMError, ModelClient, ToolResponse};
use civic_agent::tool::{PriorToolResult, ToolArgs, ToolDefinition};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted model turn.
pub enum Turn {
    Reply(String),
    Fail(String),
}

impl Turn {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply(text.into())
    }
}

/// A model client that plays back queued turns.
///
/// Tool-enabled requests consume the queue; `generate` (synthesis) answers
/// with a fixed text and records the prompt it was given.
pub struct ScriptedClient {
    turns: Mutex<VecDeque<Turn>>,
    synthesis_answer: String,
    delays: Mutex<Vec<(usize, Duration)>>,
    pub tool_calls: AtomicUsize,
    pub synthesis_prompts: Mutex<Vec<String>>,
    pub evidence_seen: Mutex<Vec<Vec<PriorToolResult>>>,
}

impl ScriptedClient {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            synthesis_answer: "synthesized answer".to_string(),
            delays: Mutex::new(Vec::new()),
            tool_calls: AtomicUsize::new(0),
            synthesis_prompts: Mutex::new(Vec::new()),
            evidence_seen: Mutex::new(Vec::new()),
        }
    }

    /// Repeats the same reply `times` times.
    pub fn repeating(text: &str, times: usize) -> Self {
        Self::new((0..times).map(|_| Turn::reply(text)).collect())
    }

    pub fn with_synthesis_answer(mut self, answer: impl Into<String>) -> Self {
        self.synthesis_answer = answer.into();
        self
    }

    /// Sleeps for `delay` during the `call`-th (1-based) tool-enabled request.
    pub fn with_delay_on(self, call: usize, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .push((call, delay));
        self
    }

    pub fn tool_call_count(&self) -> usize {
        self.tool_calls.load(Ordering::SeqCst)
    }

    pub fn synthesis_prompts(&self) -> Vec<String> {
        self.synthesis_prompts
            .lock()
            .unwrap()
            .clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn generate(&self, prompt: &str) -> Result<String, LLMError> {
        self.synthesis_prompts
            .lock()
            .unwrap()
            .push(prompt.to_string());
        Ok(self.synthesis_answer.clone())
    }

    async fn generate_with_tools(
        &self,
        _question: &str,
        _tools: &[ToolDefinition],
        prior: &[PriorToolResult],
    ) -> Result<ToolResponse, LLMError> {
        let call = self.tool_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.evidence_seen
            .lock()
            .unwrap()
            .push(prior.to_vec());

        let delay = self
            .delays
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| *n == call)
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("no scripted turn left");
        match turn {
            Turn::Reply(text) => Ok(ToolResponse::from_content(text)),
            Turn::Fail(message) => Err(LLMError::ApiError(message)),
        }
    }
}

/// How a [`CountingDomain`] responds to calls.
#[derive(Clone, Copy)]
pub enum Mode {
    /// Returns `{"total": 42}`
    Answer,
    /// Returns a domain error
    Fault,
    /// Panics inside `call_tool`
    Panic,
    /// Returns `{"total": 42}` but panics inside `format_result`
    FormatPanic,
}

/// A single-tool domain that counts how often it is called.
pub struct CountingDomain {
    id: String,
    tool: String,
    mode: Mode,
    pub calls: AtomicUsize,
}

impl CountingDomain {
    pub fn new(id: &str, tool: &str, mode: Mode) -> Self {
        Self {
            id: id.to_string(),
            tool: tool.to_string(),
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataDomain for CountingDomain {
    fn id(&self) -> &str {
        &self.id
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(self.tool.clone(), "Count records")
            .param("start_year", "integer", "First year")
            .param("end_year", "integer", "Last year")]
    }

    async fn call_tool(&self, _name: &str, _arguments: &ToolArgs) -> Result<Value, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Answer | Mode::FormatPanic => Ok(json!({"total": 42})),
            Mode::Fault => Err(DomainError::ExecutionFailed("dataset connection reset".to_string())),
            Mode::Panic => panic!("index out of bounds"),
        }
    }

    fn format_result(&self, result: &Value) -> Result<String, DomainError> {
        if let Mode::FormatPanic = self.mode {
            panic!("formatter indexed a missing column");
        }
        result
            .get("total")
            .map(|total| format!("Total: {total}"))
            .ok_or_else(|| DomainError::Format("missing total".to_string()))
    }

    fn is_loaded(&self) -> bool {
        true
    }
}

/// A registry holding one [`CountingDomain`].
pub fn registry_with(domain: Arc<CountingDomain>) -> Arc<DomainRegistry> {
    let mut registry = DomainRegistry::new();
    registry
        .register(domain as DynDomain)
        .unwrap();
    Arc::new(registry)
}

/// Model text requesting `tool` with the given year range.
pub fn tool_call(tool: &str, start_year: i64, end_year: i64) -> String {
    format!(
        "Let me look that up.\nTOOL_CALL: {{\"name\": \"{tool}\", \"arguments\": {{\"start_year\": {start_year}, \"end_year\": {end_year}}}}}"
    )
}

use futures::stream::Stream;
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::AgentConfig;
use super::synthesis::synthesize;
use super::trace::{preview, ExitReason, InteractionTrace, IterationRecord, OrchestrationOutcome};
use crate::domain::DomainRegistry;
use crate::llm::{non_empty_reply, ModelClient};
use crate::tool::{extract_tool_call, PriorToolResult, ToolCall, ToolExecutionResult, ToolExecutor};

/// Characters of an unparseable response quoted in the parse-error answer.
const PARSE_ERROR_EXCERPT_CHARS: usize = 200;

/// Progress events from a running orchestration.
#[derive(Debug, Clone)]
pub enum OrchestrationEvent {
    /// An iteration is starting
    IterationStarted {
        iteration: usize,
    },
    /// The model replied
    ModelResponse {
        iteration: usize,
        content: String,
        needs_tool_call: bool,
    },
    /// A tool call is about to be dispatched
    ToolCall {
        iteration: usize,
        call: ToolCall,
    },
    /// A dispatched tool call finished
    ToolResult {
        iteration: usize,
        result: ToolExecutionResult,
    },
    /// The run is over
    Finished {
        outcome: OrchestrationOutcome,
    },
}

/// A stream of orchestration events.
pub type OrchestrationStream = Pin<Box<dyn Stream<Item = OrchestrationEvent> + Send>>;

type EventSender = mpsc::UnboundedSender<OrchestrationEvent>;

/// Answers questions by letting the model call registry tools in a bounded loop.
///
/// Each call to [`Orchestrator::run`] owns its own loop state, so one
/// orchestrator can serve concurrent questions.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    config: AgentConfig,
}

impl Orchestrator {
    /// Creates a new orchestrator.
    pub fn new(
        registry: Arc<DomainRegistry>,
        client: Arc<dyn ModelClient>,
        config: AgentConfig,
    ) -> Self {
        Self {
            client,
            executor: ToolExecutor::new(registry),
            config,
        }
    }

    /// Creates a new orchestrator with default budgets.
    pub fn with_defaults(registry: Arc<DomainRegistry>, client: Arc<dyn ModelClient>) -> Self {
        Self::new(registry, client, AgentConfig::default())
    }

    /// The loop budgets in effect.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The registry tool calls are dispatched through.
    pub fn registry(&self) -> &Arc<DomainRegistry> {
        self.executor.registry()
    }

    /// Runs the loop for one question and returns the answer with its trace.
    pub async fn run(&self, question: &str) -> OrchestrationOutcome {
        self.drive(question, None).await
    }

    /// Runs the loop for one question and returns only the answer.
    pub async fn answer(&self, question: &str) -> String {
        self.run(question).await.answer
    }

    /// Runs the loop in a background task, streaming progress events.
    ///
    /// The last event is always [`OrchestrationEvent::Finished`]. Dropping the
    /// stream stops the loop before its next iteration. Must be called from
    /// within a Tokio runtime.
    pub fn stream(&self, question: impl Into<String>) -> OrchestrationStream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orchestrator = self.clone();
        let question = question.into();

        tokio::spawn(async move {
            let outcome = orchestrator.drive(&question, Some(&tx)).await;
            let _ = tx.send(OrchestrationEvent::Finished { outcome });
        });

        let stream = async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        };

        Box::pin(stream)
    }

    async fn drive(&self, question: &str, events: Option<&EventSender>) -> OrchestrationOutcome {
        let emit = |event: OrchestrationEvent| {
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        };

        let mut trace = InteractionTrace::new(question);
        let mut evidence: Vec<PriorToolResult> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let tools = self.executor.tool_definitions();
        let started = Instant::now();

        info!(run_id = %trace.run_id, tools = tools.len(), "starting orchestration");

        for iteration in 1..=self.config.max_iterations {
            if events.is_some_and(|tx| tx.is_closed()) {
                info!(run_id = %trace.run_id, iteration, "event stream dropped, stopping");
                let answer = format!(
                    "Orchestration cancelled after {} tool call(s).",
                    iteration - 1
                );
                return finish(trace, answer, ExitReason::Cancelled);
            }

            if started.elapsed() > self.config.total_timeout {
                let reason = format!(
                    "Multi-tool timeout ({}s) reached after {} tool call(s).",
                    self.config.total_timeout.as_secs(),
                    iteration - 1
                );
                warn!(run_id = %trace.run_id, iteration, "time budget exhausted");
                let answer = self.synthesize(question, &evidence, &reason).await;
                return finish(trace, answer, ExitReason::Timeout);
            }

            emit(OrchestrationEvent::IterationStarted { iteration });
            debug!(iteration, max = self.config.max_iterations, evidence = evidence.len(), "asking model");

            let response = match self
                .client
                .generate_with_tools(question, &tools, &evidence)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(iteration, error = %e, "model call failed");
                    let message = format!("Error generating response: {e}");
                    let mut record = IterationRecord::new(iteration, String::new(), false);
                    record.error = Some(message.clone());
                    trace.iterations.push(record);
                    let answer = if evidence.is_empty() {
                        message
                    } else {
                        self.synthesize(question, &evidence, &format!("Model error: {e}"))
                            .await
                    };
                    return finish(trace, answer, ExitReason::ModelError);
                }
            };

            emit(OrchestrationEvent::ModelResponse {
                iteration,
                content: response.content.clone(),
                needs_tool_call: response.needs_tool_call,
            });

            let mut record = IterationRecord::new(
                iteration,
                preview(&response.content, self.config.preview_chars),
                response.needs_tool_call,
            );

            if !response.needs_tool_call {
                debug!(iteration, "model answered directly");
                record.is_final = true;
                trace.iterations.push(record);
                return finish(trace, non_empty_reply(response.content), ExitReason::Final);
            }

            let Some(call) = extract_tool_call(&response.content) else {
                let message = format!(
                    "Could not parse tool call from response (iter {iteration}): {}",
                    preview(&response.content, PARSE_ERROR_EXCERPT_CHARS)
                );
                warn!(iteration, "unparseable tool call");
                record.error = Some(message.clone());
                trace.iterations.push(record);
                let answer = if evidence.is_empty() {
                    message
                } else {
                    self.synthesize(question, &evidence, "Parse error on follow-up call")
                        .await
                };
                return finish(trace, answer, ExitReason::ParseError);
            };

            record.tool_call = Some(call.clone());

            if !seen.insert(call.canonical_key()) {
                warn!(iteration, tool = %call.name, "duplicate tool call detected");
                trace.iterations.push(record);
                let answer = self
                    .synthesize(question, &evidence, "Duplicate tool call detected")
                    .await;
                return finish(trace, answer, ExitReason::Duplicate);
            }

            debug!(iteration, tool = %call.name, "dispatching tool call");
            emit(OrchestrationEvent::ToolCall {
                iteration,
                call: call.clone(),
            });

            let result = self.executor.execute(&call).await;
            evidence.push(result.to_evidence());

            emit(OrchestrationEvent::ToolResult {
                iteration,
                result: result.clone(),
            });
            record.tool_execution = Some(result);
            trace.iterations.push(record);
        }

        warn!(max = self.config.max_iterations, "reached max iterations");
        let answer = self
            .synthesize(question, &evidence, "Max iterations reached")
            .await;
        finish(trace, answer, ExitReason::MaxIterations)
    }

    async fn synthesize(&self, question: &str, evidence: &[PriorToolResult], reason: &str) -> String {
        synthesize(self.client.as_ref(), question, evidence, reason).await
    }
}

fn finish(mut trace: InteractionTrace, answer: String, exit: ExitReason) -> OrchestrationOutcome {
    info!(
        run_id = %trace.run_id,
        %exit,
        iterations = trace.iterations.len(),
        dispatches = trace.dispatch_count(),
        "orchestration finished"
    );
    trace.finish(&answer, exit);
    OrchestrationOutcome { answer, trace }
}

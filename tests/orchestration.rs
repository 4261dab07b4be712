mod common;

use civic_agent::agent::{AgentConfig, ExitReason, OrchestrationEvent, Orchestrator};
use civic_agent::llm::EMPTY_RESPONSE;
use futures::StreamExt;
use common::{registry_with, tool_call, CountingDomain, Mode, ScriptedClient, Turn};
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(
    domain: &Arc<CountingDomain>,
    client: &Arc<ScriptedClient>,
    config: AgentConfig,
) -> Orchestrator {
    Orchestrator::new(registry_with(domain.clone()), client.clone(), config)
}

#[tokio::test]
async fn test_answer_without_marker_is_final() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(ScriptedClient::new(vec![Turn::reply(
        "I can answer that directly: {\"not\": \"a call\"}",
    )]));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("Hello?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Final));
    assert_eq!(outcome.answer, "I can answer that directly: {\"not\": \"a call\"}");
    assert_eq!(client.tool_call_count(), 1);
    assert_eq!(domain.call_count(), 0);
    assert!(client.synthesis_prompts().is_empty());
}

#[tokio::test]
async fn test_single_tool_then_answer() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(ScriptedClient::new(vec![
        Turn::reply(tool_call("query_x", 2023, 2023)),
        Turn::reply("There were 42 X in 2023."),
    ]));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("How many X in 2023?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Final));
    assert!(outcome.answer.contains("42"));
    assert_eq!(outcome.trace.dispatch_count(), 1);
    assert_eq!(domain.call_count(), 1);

    let execution = outcome
        .trace
        .tool_executions()
        .next()
        .unwrap();
    assert_eq!(execution.tool_name, "query_x");
    assert_eq!(execution.arguments.get("start_year"), Some(&serde_json::json!(2023)));
    assert_eq!(execution.formatted_result, "Total: 42");

    let evidence = client.evidence_seen.lock().unwrap();
    assert!(evidence[0].is_empty());
    assert_eq!(evidence[1][0].formatted_result, "Total: 42");
}

#[tokio::test]
async fn test_repeated_call_exits_as_duplicate() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let reordered =
        "TOOL_CALL: {\"arguments\": {\"end_year\": 2023, \"start_year\": 2023}, \"name\": \"query_x\"}";
    let client = Arc::new(
        ScriptedClient::new(vec![
            Turn::reply(tool_call("query_x", 2023, 2023)),
            Turn::reply(reordered),
        ])
        .with_synthesis_answer("42 X in 2023."),
    );

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("How many X in 2023?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Duplicate));
    assert_eq!(outcome.answer, "42 X in 2023.");
    assert_eq!(domain.call_count(), 1);
    assert_eq!(client.synthesis_prompts().len(), 1);
}

#[tokio::test]
async fn test_max_iterations_dispatches_exactly_four() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(ScriptedClient::new(
        (2020..2025)
            .map(|year| Turn::reply(tool_call("query_x", year, year)))
            .collect(),
    ));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("X per year since 2020?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::MaxIterations));
    assert_eq!(domain.call_count(), 4);
    assert_eq!(client.tool_call_count(), 4);
    assert_eq!(outcome.trace.iterations.len(), 4);

    let prompts = client.synthesis_prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].matches("--- query_x ---").count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_between_second_and_third_iteration() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(
        ScriptedClient::new(
            (2021..2025)
                .map(|year| Turn::reply(tool_call("query_x", year, year)))
                .collect(),
        )
        .with_delay_on(2, Duration::from_secs(100)),
    );

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("X per year?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Timeout));
    assert_eq!(domain.call_count(), 2);
    assert_eq!(client.tool_call_count(), 2);
    assert_eq!(outcome.answer, "synthesized answer");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_synthesizes_unknown_tool_evidence() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(
        ScriptedClient::new(vec![Turn::reply("TOOL_CALL: {\"name\": \"query_weather\"}")])
            .with_delay_on(1, Duration::from_secs(5)),
    );
    let config = AgentConfig::builder()
        .total_timeout(Duration::from_secs(1))
        .build()
        .unwrap();

    let outcome = orchestrator(&domain, &client, config).run("q").await;

    // The unknown tool still produced evidence, so the timeout synthesizes.
    assert_eq!(outcome.exit(), Some(ExitReason::Timeout));
    let prompts = client.synthesis_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Error: Tool 'query_weather' not found. Available tools: query_x"));
}

#[tokio::test]
async fn test_fault_then_duplicate_synthesizes_from_error_only() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Panic));
    let client = Arc::new(ScriptedClient::repeating(&tool_call("query_x", 2023, 2023), 2));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("How many X in 2023?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Duplicate));
    assert_eq!(domain.call_count(), 1);

    let prompts = client.synthesis_prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].matches("--- query_x ---").count(), 1);
    assert!(prompts[0].contains("--- query_x ---\nError: Error calling tool 'query_x': domain panicked: index out of bounds"));
}

#[tokio::test]
async fn test_domain_error_lets_model_recover() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Fault));
    let client = Arc::new(ScriptedClient::new(vec![
        Turn::reply(tool_call("query_x", 2023, 2023)),
        Turn::reply("The X dataset is unavailable right now."),
    ]));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("How many X in 2023?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Final));
    let evidence = client.evidence_seen.lock().unwrap();
    assert_eq!(
        evidence[1][0].formatted_result,
        "Error: Error calling tool 'query_x': Execution failed: dataset connection reset"
    );
}

#[tokio::test]
async fn test_parse_error_after_evidence_synthesizes() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(ScriptedClient::new(vec![
        Turn::reply(tool_call("query_x", 2023, 2023)),
        Turn::reply("TOOL_CALL: query_x for 2022 please"),
    ]));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("Compare 2022 and 2023")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::ParseError));
    assert_eq!(outcome.answer, "synthesized answer");
    assert!(outcome.trace.iterations[1]
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("Could not parse tool call from response (iter 2)")));
}

#[tokio::test]
async fn test_model_failure_is_an_answer() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(ScriptedClient::new(vec![Turn::Fail("upstream 502".to_string())]));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("q")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::ModelError));
    assert_eq!(outcome.answer, "Error generating response: API error: upstream 502");
}

#[tokio::test]
async fn test_trace_preview_is_truncated() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let long_answer = "x".repeat(800);
    let client = Arc::new(ScriptedClient::new(vec![Turn::reply(long_answer.clone())]));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("q")
        .await;

    assert_eq!(outcome.answer, long_answer);
    assert_eq!(outcome.trace.iterations[0].model_response.len(), 500);
    assert_eq!(outcome.trace.final_answer.as_deref(), Some(long_answer.as_str()));
}

#[tokio::test]
async fn test_blank_synthesis_is_never_the_answer() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(
        ScriptedClient::repeating(&tool_call("query_x", 2023, 2023), 2).with_synthesis_answer(""),
    );

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("How many X in 2023?")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Duplicate));
    assert_eq!(outcome.answer, EMPTY_RESPONSE);
    assert_eq!(outcome.trace.final_answer.as_deref(), Some(EMPTY_RESPONSE));
}

#[tokio::test]
async fn test_blank_final_reply_is_never_the_answer() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(ScriptedClient::new(vec![Turn::reply("   ")]));

    let outcome = orchestrator(&domain, &client, AgentConfig::default())
        .run("q")
        .await;

    assert_eq!(outcome.exit(), Some(ExitReason::Final));
    assert_eq!(outcome.answer, EMPTY_RESPONSE);
}

#[tokio::test]
async fn test_formatter_panic_becomes_generic_evidence() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::FormatPanic));
    let client = Arc::new(ScriptedClient::new(vec![
        Turn::reply(tool_call("query_x", 2023, 2023)),
        Turn::reply("There were 42 X in 2023."),
    ]));

    let handle = tokio::spawn({
        let orchestrator = orchestrator(&domain, &client, AgentConfig::default());
        async move { orchestrator.run("How many X in 2023?").await }
    });
    let outcome = handle.await.unwrap();

    assert_eq!(outcome.exit(), Some(ExitReason::Final));
    assert_eq!(outcome.answer, "There were 42 X in 2023.");
    let evidence = client.evidence_seen.lock().unwrap();
    assert_eq!(
        evidence[1][0].formatted_result,
        "Result:\n```json\n{\n  \"total\": 42\n}\n```"
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropped_stream_stops_the_loop() {
    let domain = Arc::new(CountingDomain::new("x", "query_x", Mode::Answer));
    let client = Arc::new(
        ScriptedClient::new(
            (2020..2024)
                .map(|year| Turn::reply(tool_call("query_x", year, year)))
                .collect(),
        )
        .with_delay_on(1, Duration::from_secs(1)),
    );

    let mut stream = orchestrator(&domain, &client, AgentConfig::default()).stream("X per year?");
    let first = stream.next().await;
    assert!(matches!(first, Some(OrchestrationEvent::IterationStarted { iteration: 1 })));
    drop(stream);
    tokio::time::sleep(Duration::from_secs(5)).await;

    // The first request was already in flight; nothing after it runs.
    assert_eq!(client.tool_call_count(), 1);
    assert_eq!(domain.call_count(), 1);
    assert!(client.synthesis_prompts().is_empty());
}

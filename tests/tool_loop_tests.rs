//! Tool-calling loop behaviour against scripted models and stub tools.

mod common;

use common::mocks::{
    call, caller_of, invoker, last_tool_output, llm_error, stub_registry, tool_results, Caller,
    ScriptedLLMClient, SlowTool,
};
use crew::agents::WorkerIdentity;
use crew::llm::{LLMResponse, Message};
use crew::tools::ToolRegistry;
use crew::types::{AppError, ToolCallRequest};
use crew::workflows::{AbortReason, LoopConfig, ToolLoop, WorkerStatus};
use rstest::rstest;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn search_bound(identity: WorkerIdentity) -> LoopConfig {
    LoopConfig::default().with_binding(identity, &["web_search", "fetch_page"], false)
}

#[rstest]
#[case(WorkerIdentity::Who)]
#[case(WorkerIdentity::What)]
#[case(WorkerIdentity::When)]
#[case(WorkerIdentity::Where)]
#[case(WorkerIdentity::How)]
#[case(WorkerIdentity::Why)]
#[case(WorkerIdentity::Researcher)]
#[tokio::test]
async fn test_immediate_final_answer_is_done(#[case] identity: WorkerIdentity) {
    let tool_loop = ToolLoop::new(
        invoker(ScriptedLLMClient::constant("x")),
        stub_registry(),
        search_bound(identity),
    );

    let outcome = tool_loop.run(identity, "topic", "plan").await.unwrap();

    assert_eq!(outcome.report.identity, identity);
    assert_eq!(outcome.report.status, WorkerStatus::Done);
    assert_eq!(outcome.report.answer, "x");
    assert_eq!(outcome.report.tool_invocations, 0);
    assert_eq!(outcome.report.cycles, 0);
    assert!(outcome.report.findings.is_empty());
    assert_eq!(
        outcome.transcript.messages(),
        &[Message::Model {
            content: "x".to_string()
        }]
    );
}

#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn test_always_calling_tools_aborts_at_cap(#[case] cap: usize) {
    let client = Arc::new(ScriptedLLMClient::new(|_, _, _| {
        Ok(call("", "web_search", json!({"query": "more"})))
    }));
    let invoker = Arc::new(crew::agents::AgentInvoker::new(
        client.clone(),
        Arc::new(crew::agents::PromptLibrary::with_defaults()),
    ));
    let tool_loop = ToolLoop::new(
        invoker,
        stub_registry(),
        search_bound(WorkerIdentity::Who).with_max_tool_iterations(cap),
    );

    let outcome = tool_loop
        .run(WorkerIdentity::Who, "topic", "plan")
        .await
        .unwrap();

    assert_eq!(
        outcome.report.status,
        WorkerStatus::Aborted {
            reason: AbortReason::CycleCap
        }
    );
    assert_eq!(outcome.report.tool_invocations, cap);
    assert_eq!(outcome.report.cycles, cap);
    assert_eq!(outcome.transcript.tool_results(), cap);
    // One model call per executed batch plus the one that hit the cap.
    assert_eq!(client.call_count(), cap + 1);
    // Partial findings survive the abort.
    assert!(outcome
        .report
        .findings
        .get("web_search")
        .unwrap()
        .starts_with("results: more"));
}

#[tokio::test]
async fn test_tool_error_is_reported_to_model_and_loop_recovers() {
    let client = ScriptedLLMClient::new(|_, history, _| {
        if tool_results(history) == 0 {
            return Ok(call("c1", "fetch_page", json!({"url": "https://example.com"})));
        }
        let seen = last_tool_output(history).unwrap_or_default().to_string();
        Ok(LLMResponse::text(format!("recovered after: {}", seen)))
    });
    let tool_loop = ToolLoop::new(
        invoker(client),
        stub_registry(),
        search_bound(WorkerIdentity::How),
    );

    let outcome = tool_loop
        .run(WorkerIdentity::How, "topic", "plan")
        .await
        .unwrap();

    assert_eq!(outcome.report.status, WorkerStatus::Done);
    assert!(outcome.report.answer.starts_with("recovered after: Error:"));
    assert!(outcome.report.answer.contains("connection refused"));
    assert_eq!(outcome.report.tool_invocations, 1);
    assert!(outcome
        .report
        .findings
        .get("fetch_page")
        .unwrap()
        .starts_with("Error:"));
    assert_eq!(outcome.calls.len(), 1);
    assert!(!outcome.calls[0].success);
}

#[tokio::test]
async fn test_unbound_tool_is_an_error_message_not_an_invocation() {
    let client = ScriptedLLMClient::new(|_, history, _| {
        if tool_results(history) == 0 {
            return Ok(call("c1", "web_search", json!({"query": "q"})));
        }
        Ok(LLMResponse::text(
            last_tool_output(history).unwrap_or_default().to_string(),
        ))
    });
    // `why` is bound to nothing.
    let tool_loop = ToolLoop::new(invoker(client), stub_registry(), LoopConfig::default());

    let outcome = tool_loop
        .run(WorkerIdentity::Why, "topic", "plan")
        .await
        .unwrap();

    assert_eq!(outcome.report.status, WorkerStatus::Done);
    assert!(outcome.report.answer.contains("unknown tool 'web_search'"));
    assert_eq!(outcome.report.tool_invocations, 0);
}

#[tokio::test]
async fn test_model_failure_is_an_error() {
    let tool_loop = ToolLoop::new(
        invoker(ScriptedLLMClient::new(|_, _, _| Err(llm_error("model down")))),
        stub_registry(),
        search_bound(WorkerIdentity::When),
    );

    let err = tool_loop
        .run(WorkerIdentity::When, "topic", "plan")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LLM(_)));
}

#[tokio::test]
async fn test_worker_deadline_aborts_with_partial_findings() {
    let client = ScriptedLLMClient::new(|_, history, _| {
        if tool_results(history) == 0 {
            Ok(call("c1", "web_search", json!({"query": "fast"})))
        } else {
            Ok(call("c2", "slow", json!({})))
        }
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(common::mocks::EchoTool::new("web_search", "results")));
    registry.register(Arc::new(SlowTool::new("slow", Duration::from_secs(5))));

    let config = LoopConfig::default()
        .with_binding(WorkerIdentity::Where, &["web_search", "slow"], false)
        .with_worker_timeout(Duration::from_millis(200));
    let tool_loop = ToolLoop::new(invoker(client), Arc::new(registry), config);

    let start = Instant::now();
    let outcome = tool_loop
        .run(WorkerIdentity::Where, "topic", "plan")
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(
        outcome.report.status,
        WorkerStatus::Aborted {
            reason: AbortReason::Deadline
        }
    );
    assert_eq!(
        outcome.report.findings.get("web_search"),
        Some("results: fast")
    );
}

#[tokio::test]
async fn test_deadline_mid_sequential_batch_keeps_finished_calls() {
    let client = ScriptedLLMClient::new(|_, history, _| {
        if tool_results(history) == 0 {
            return Ok(LLMResponse::tool_calls(vec![
                ToolCallRequest::new("a", "web_search", json!({"query": "q"})),
                ToolCallRequest::new("b", "slow", json!({})),
            ]));
        }
        Ok(LLMResponse::text("done"))
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(common::mocks::EchoTool::new("web_search", "results")));
    registry.register(Arc::new(SlowTool::new("slow", Duration::from_secs(5))));

    let config = LoopConfig::default()
        .with_binding(WorkerIdentity::How, &["web_search", "slow"], false)
        .with_worker_timeout(Duration::from_millis(200));
    let tool_loop = ToolLoop::new(invoker(client), Arc::new(registry), config);

    let start = Instant::now();
    let outcome = tool_loop
        .run(WorkerIdentity::How, "topic", "plan")
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(
        outcome.report.status,
        WorkerStatus::Aborted {
            reason: AbortReason::Deadline
        }
    );
    assert_eq!(outcome.report.findings.get("web_search"), Some("results: q"));
    assert_eq!(outcome.report.tool_invocations, 1);
    assert_eq!(outcome.report.cycles, 0);
    let ids: Vec<&str> = outcome.calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a"]);
}

#[tokio::test]
async fn test_parallel_batch_runs_concurrently_and_keeps_order() {
    let client = ScriptedLLMClient::new(|_, history, _| {
        if tool_results(history) == 0 {
            return Ok(LLMResponse::tool_calls(vec![
                ToolCallRequest::new("a", "slow", json!({})),
                ToolCallRequest::new("b", "slow", json!({})),
                ToolCallRequest::new("c", "slow", json!({})),
            ]));
        }
        Ok(LLMResponse::text("done"))
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SlowTool::new("slow", Duration::from_millis(300))));

    let config = LoopConfig::default().with_binding(WorkerIdentity::What, &["slow"], true);
    let tool_loop = ToolLoop::new(invoker(client), Arc::new(registry), config);

    let start = Instant::now();
    let outcome = tool_loop
        .run(WorkerIdentity::What, "topic", "plan")
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_millis(800));
    assert_eq!(outcome.report.tool_invocations, 3);
    assert_eq!(outcome.report.cycles, 1);
    let ids: Vec<&str> = outcome.calls.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_missing_and_duplicate_call_ids_are_reassigned() {
    let client = ScriptedLLMClient::new(|_, history, _| {
        if tool_results(history) < 4 {
            return Ok(LLMResponse::tool_calls(vec![
                ToolCallRequest::new("same", "web_search", json!({"query": "one"})),
                ToolCallRequest::new("", "web_search", json!({"query": "two"})),
            ]));
        }
        Ok(LLMResponse::text("done"))
    });
    let tool_loop = ToolLoop::new(
        invoker(client),
        stub_registry(),
        search_bound(WorkerIdentity::Who),
    );

    let outcome = tool_loop
        .run(WorkerIdentity::Who, "topic", "plan")
        .await
        .unwrap();

    let ids: Vec<String> = outcome.calls.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids.len(), 4);
    let unique: HashSet<&String> = ids.iter().collect();
    assert_eq!(unique.len(), 4);
    assert_eq!(ids[0], "same");
    assert_eq!(ids[1], "who-0-1");
    assert_eq!(ids[2], "who-1-0");
    assert_eq!(ids[3], "who-1-1");
}

#[tokio::test]
async fn test_worker_prompt_names_the_worker() {
    let client = ScriptedLLMClient::new(|prompt, _, tools| {
        assert_eq!(caller_of(prompt), Caller::Worker(WorkerIdentity::Why));
        assert!(prompt.contains("Topic: Quantum Machine Learning"));
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["web_search", "fetch_page"]);
        Ok(LLMResponse::text("ok"))
    });
    let tool_loop = ToolLoop::new(
        invoker(client),
        stub_registry(),
        search_bound(WorkerIdentity::Why),
    );

    let outcome = tool_loop
        .run(WorkerIdentity::Why, "Quantum Machine Learning", "the plan")
        .await
        .unwrap();
    assert!(outcome.report.is_done());
}

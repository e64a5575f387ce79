//! Fan-out/fan-in of research workers.

mod common;

use common::mocks::{
    call, caller_of, invoker, llm_error, stub_registry, tool_results, Caller, EchoTool,
    ScriptedLLMClient, SlowTool,
};
use crew::agents::WorkerIdentity;
use crew::llm::LLMResponse;
use crew::tools::ToolRegistry;
use crew::types::AppError;
use crew::workflows::{
    FailurePolicy, FanOut, InProcessFanOut, LoopConfig, ResearchSeed, Stage, ToolLoop,
    WorkerStatus,
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn bound_to(tool: &str) -> LoopConfig {
    WorkerIdentity::ALL
        .into_iter()
        .fold(LoopConfig::default(), |config, identity| {
            config.with_binding(identity, &[tool], false)
        })
}

fn position(identity: WorkerIdentity) -> usize {
    WorkerIdentity::ASPECTS
        .iter()
        .position(|w| *w == identity)
        .unwrap_or(0)
}

fn fanout(client: ScriptedLLMClient, tools: Arc<ToolRegistry>, policy: FailurePolicy) -> InProcessFanOut {
    let tool_loop = ToolLoop::new(invoker(client), tools, bound_to("web_search"));
    InProcessFanOut::new(Arc::new(tool_loop), policy)
}

fn seed() -> ResearchSeed {
    ResearchSeed::new("Quantum Machine Learning", "the plan")
}

/// Answers immediately for everyone except `failing`, which errors after
/// one tool call.
fn one_fails_mid_loop(failing: WorkerIdentity) -> ScriptedLLMClient {
    ScriptedLLMClient::new(move |prompt, history, _| match caller_of(prompt) {
        Caller::Worker(identity) if identity == failing => {
            if tool_results(history) == 0 {
                Ok(call("c1", "web_search", json!({"query": "start"})))
            } else {
                Err(llm_error("model crashed mid-loop"))
            }
        }
        Caller::Worker(identity) => Ok(LLMResponse::text(format!("{} findings", identity))),
        _ => Ok(LLMResponse::text("unused")),
    })
}

#[tokio::test]
async fn test_barrier_waits_for_slowest_worker() {
    // Worker k (1-based) needs k tool cycles of 50ms each.
    let client = ScriptedLLMClient::new(|prompt, history, _| match caller_of(prompt) {
        Caller::Worker(identity) => {
            if tool_results(history) < position(identity) + 1 {
                Ok(call("", "web_search", json!({})))
            } else {
                Ok(LLMResponse::text(format!("{} findings", identity)))
            }
        }
        _ => Ok(LLMResponse::text("unused")),
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SlowTool::new("web_search", Duration::from_millis(50))));
    let fanout = fanout(client, Arc::new(registry), FailurePolicy::BestEffort);

    let start = Instant::now();
    let results = fanout
        .run_parallel(&WorkerIdentity::ASPECTS, &seed(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(results.len(), 6);
    for identity in WorkerIdentity::ASPECTS {
        let report = &results[&identity];
        assert!(report.is_done());
        assert_eq!(report.cycles, position(identity) + 1);
        assert_eq!(report.answer, format!("{} findings", identity));
    }
}

#[tokio::test]
async fn test_workers_never_see_each_others_results() {
    let client = ScriptedLLMClient::new(|prompt, history, _| match caller_of(prompt) {
        Caller::Worker(identity) => {
            if tool_results(history) == 0 {
                Ok(call("c1", "web_search", json!({"query": identity.as_str()})))
            } else {
                Ok(LLMResponse::text(format!("{} findings", identity)))
            }
        }
        _ => Ok(LLMResponse::text("unused")),
    });
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(EchoTool::new("web_search", "results")));
    let fanout = fanout(client, Arc::new(registry), FailurePolicy::BestEffort);

    let results = fanout
        .run_parallel(&WorkerIdentity::ASPECTS, &seed(), &CancellationToken::new())
        .await
        .unwrap();

    for (identity, report) in &results {
        assert_eq!(
            report.findings.get("web_search"),
            Some(format!("results: {}", identity).as_str())
        );
        for other in WorkerIdentity::ASPECTS.iter().filter(|w| *w != identity) {
            let marker = format!("results: {}", other);
            assert!(report.findings.iter().all(|f| !f.output.contains(&marker)));
        }
    }
}

#[tokio::test]
async fn test_best_effort_records_failure_and_keeps_others() {
    let fanout = fanout(
        one_fails_mid_loop(WorkerIdentity::Why),
        stub_registry(),
        FailurePolicy::BestEffort,
    );

    let results = fanout
        .run_parallel(&WorkerIdentity::ASPECTS, &seed(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 6);
    assert_eq!(results.values().filter(|r| r.is_done()).count(), 5);
    match &results[&WorkerIdentity::Why].status {
        WorkerStatus::Failed { error } => assert!(error.contains("model crashed mid-loop")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_strict_policy_fails_the_fan_out() {
    let fanout = fanout(
        one_fails_mid_loop(WorkerIdentity::Why),
        stub_registry(),
        FailurePolicy::Strict,
    );

    let err = fanout
        .run_parallel(&WorkerIdentity::ASPECTS, &seed(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Worker {
            worker: WorkerIdentity::Why,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancellation_aborts_all_workers() {
    let client = ScriptedLLMClient::constant("late").with_delay(Duration::from_secs(10));
    let fanout = fanout(client, stub_registry(), FailurePolicy::BestEffort);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = fanout
        .run_parallel(&WorkerIdentity::ASPECTS, &seed(), &cancel)
        .await
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(matches!(
        err,
        AppError::Cancelled {
            stage: Stage::Research
        }
    ));
}

#[tokio::test]
async fn test_panicking_worker_is_reported_as_failed() {
    let client = ScriptedLLMClient::new(|prompt, _, _| match caller_of(prompt) {
        Caller::Worker(WorkerIdentity::How) => panic!("scripted panic"),
        Caller::Worker(identity) => Ok(LLMResponse::text(format!("{} findings", identity))),
        _ => Ok(LLMResponse::text("unused")),
    });
    let fanout = fanout(client, stub_registry(), FailurePolicy::BestEffort);

    let results = fanout
        .run_parallel(&WorkerIdentity::ASPECTS, &seed(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 6);
    match &results[&WorkerIdentity::How].status {
        WorkerStatus::Failed { error } => assert!(error.contains("panicked")),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_identities_run_once() {
    let client = Arc::new(ScriptedLLMClient::constant("answer"));
    let invoker = Arc::new(crew::agents::AgentInvoker::new(
        client.clone(),
        Arc::new(crew::agents::PromptLibrary::with_defaults()),
    ));
    let tool_loop = ToolLoop::new(invoker, stub_registry(), LoopConfig::default());
    let fanout = InProcessFanOut::new(Arc::new(tool_loop), FailurePolicy::BestEffort);

    let results = fanout
        .run_parallel(
            &[WorkerIdentity::Who, WorkerIdentity::Who, WorkerIdentity::What],
            &seed(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn test_empty_worker_list_returns_empty_result() {
    let fanout = fanout(
        ScriptedLLMClient::constant("unused"),
        stub_registry(),
        FailurePolicy::Strict,
    );
    let results = fanout
        .run_parallel(&[], &seed(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(results.is_empty());
    assert_eq!(fanout.kind(), "in-process");
}

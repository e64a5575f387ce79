//! Per-worker tool-calling loop.
//!
//! ```text
//! Thinking --FinalAnswer--> Done
//!    |  ^
//!    |  +---- results appended ----+
//!    v                             |
//! ToolCallBatch --> ExecutingTools +
//!    |
//!    +--(cap reached | deadline)--> Aborted
//! ```
//!
//! A loop owns its transcript and findings and hands both back by value when
//! it terminates. Tool failures never end the loop; they are reported to the
//! model as `Error: ...` tool messages so it can adjust.

use crate::agents::{AgentInvoker, AgentReply, PromptContext, WorkerIdentity};
use crate::llm::Transcript;
use crate::tools::registry::{ToolError, ToolRegistry};
use crate::types::{Result, ToolCallRequest};
use crate::utils::toml_config::CrewConfig;
use crate::workflows::state::{AbortReason, Findings, WorkerReport};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout_at;
use tracing::{debug, info, warn};

/// Tools a worker may call, and whether one batch runs concurrently.
#[derive(Debug, Clone, Default)]
pub struct ToolBinding {
    pub tools: Vec<String>,
    pub parallel: bool,
}

/// Limits and tool bindings shared by every loop of a run.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum executed tool batches per loop.
    pub max_tool_iterations: usize,

    /// Wall-clock budget for one loop.
    pub worker_timeout: Duration,

    pub bindings: HashMap<WorkerIdentity, ToolBinding>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 10,
            worker_timeout: Duration::from_secs(600),
            bindings: HashMap::new(),
        }
    }
}

impl LoopConfig {
    pub fn from_config(config: &CrewConfig) -> Self {
        let bindings = WorkerIdentity::ALL
            .into_iter()
            .map(|identity| {
                let agent = identity.agent_name();
                let binding = ToolBinding {
                    tools: config
                        .agent_tools(agent)
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    parallel: config
                        .get_agent(agent)
                        .map(|a| a.parallel_tools)
                        .unwrap_or(false),
                };
                (identity, binding)
            })
            .collect();

        Self {
            max_tool_iterations: config.research.max_tool_iterations,
            worker_timeout: config.research.worker_timeout(),
            bindings,
        }
    }

    pub fn with_binding(mut self, identity: WorkerIdentity, tools: &[&str], parallel: bool) -> Self {
        self.bindings.insert(
            identity,
            ToolBinding {
                tools: tools.iter().map(|t| t.to_string()).collect(),
                parallel,
            },
        );
        self
    }

    pub fn with_max_tool_iterations(mut self, cap: usize) -> Self {
        self.max_tool_iterations = cap;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn binding(&self, identity: WorkerIdentity) -> ToolBinding {
        self.bindings.get(&identity).cloned().unwrap_or_default()
    }
}

/// Record of a single tool call execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
}

/// What a terminated loop hands back.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    pub report: WorkerReport,
    pub transcript: Transcript,
    pub calls: Vec<ToolCallRecord>,
}

/// Mutable state owned by one running loop.
struct LoopRun {
    identity: WorkerIdentity,
    transcript: Transcript,
    findings: Findings,
    calls: Vec<ToolCallRecord>,
    seen_ids: HashSet<String>,
    cycles: usize,
    invocations: usize,
}

impl LoopRun {
    fn new(identity: WorkerIdentity) -> Self {
        Self {
            identity,
            transcript: Transcript::new(),
            findings: Findings::new(),
            calls: Vec::new(),
            seen_ids: HashSet::new(),
            cycles: 0,
            invocations: 0,
        }
    }

    /// Replace missing or repeated call ids with `<identity>-<cycle>-<index>`.
    fn assign_ids(&mut self, calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
        calls
            .into_iter()
            .enumerate()
            .map(|(index, mut call)| {
                if call.id.trim().is_empty() || self.seen_ids.contains(&call.id) {
                    call.id = format!("{}-{}-{}", self.identity, self.cycles, index);
                }
                self.seen_ids.insert(call.id.clone());
                call
            })
            .collect()
    }

    /// Append one tool result to the transcript, findings and call log.
    fn record_result(
        &mut self,
        call: &ToolCallRequest,
        binding: &ToolBinding,
        result: std::result::Result<String, ToolError>,
        duration_ms: u64,
    ) -> Result<()> {
        let success = result.is_ok();
        let output = match result {
            Ok(text) => text,
            Err(e) => {
                warn!(worker = %self.identity, tool = %call.name, error = %e, "tool call failed");
                format!("Error: {}", e)
            }
        };
        if binding.tools.iter().any(|t| t == &call.name) {
            self.invocations += 1;
        }
        self.findings.record(&call.name, &output);
        self.transcript.push_tool_result(&call.id, output)?;
        self.calls.push(ToolCallRecord {
            id: call.id.clone(),
            name: call.name.clone(),
            success,
            duration_ms,
        });
        Ok(())
    }

    fn finish(self, report: WorkerReport) -> LoopOutcome {
        LoopOutcome {
            report: report
                .with_findings(self.findings)
                .with_counts(self.cycles, self.invocations),
            transcript: self.transcript,
            calls: self.calls,
        }
    }

    fn abort(self, reason: AbortReason) -> LoopOutcome {
        warn!(
            worker = %self.identity,
            %reason,
            cycles = self.cycles,
            "worker loop aborted"
        );
        let identity = self.identity;
        self.finish(WorkerReport::aborted(identity, reason, Findings::new()))
    }
}

pub struct ToolLoop {
    invoker: Arc<AgentInvoker>,
    tools: Arc<ToolRegistry>,
    config: LoopConfig,
}

impl ToolLoop {
    pub fn new(invoker: Arc<AgentInvoker>, tools: Arc<ToolRegistry>, config: LoopConfig) -> Self {
        Self {
            invoker,
            tools,
            config,
        }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run one worker to termination.
    ///
    /// Returns `Ok` for `Done` and `Aborted` outcomes; a failed model call is
    /// an `Err`.
    #[tracing::instrument(name = "worker_loop", skip(self, topic, plan), fields(worker = %identity))]
    pub async fn run(&self, identity: WorkerIdentity, topic: &str, plan: &str) -> Result<LoopOutcome> {
        let deadline = tokio::time::Instant::now() + self.config.worker_timeout;
        let binding = self.config.binding(identity);
        let definitions = self.tools.definitions_for(&binding.tools);
        let context = PromptContext::for_worker(identity, topic, plan);
        let agent = identity.agent_name();
        let mut run = LoopRun::new(identity);

        loop {
            // Thinking
            let attempt = timeout_at(
                deadline,
                self.invoker
                    .invoke(agent, &context, run.transcript.messages(), &definitions),
            )
            .await;
            let reply = match attempt {
                Ok(reply) => reply?,
                Err(_) => return Ok(run.abort(AbortReason::Deadline)),
            };

            let batch = match reply {
                AgentReply::FinalAnswer(answer) => {
                    run.transcript.push_model(answer.clone());
                    info!(
                        worker = %identity,
                        cycles = run.cycles,
                        tool_invocations = run.invocations,
                        "worker finished"
                    );
                    return Ok(run.finish(WorkerReport::done(identity, answer)));
                }
                AgentReply::ToolCallBatch(batch) => batch,
            };

            if run.cycles >= self.config.max_tool_iterations {
                return Ok(run.abort(AbortReason::CycleCap));
            }

            // ExecutingTools
            let batch = run.assign_ids(batch);
            run.transcript.push_tool_calls(batch.clone());

            let completed = if binding.parallel {
                let batch_results = join_all(
                    batch.iter().map(|call| self.execute_one(call, &binding)),
                );
                match timeout_at(deadline, batch_results).await {
                    Ok(results) => {
                        for (call, (result, duration_ms)) in batch.iter().zip(results) {
                            run.record_result(call, &binding, result, duration_ms)?;
                        }
                        true
                    }
                    Err(_) => false,
                }
            } else {
                // Each finished call is kept even if the deadline cuts the batch short.
                let mut completed = true;
                for call in &batch {
                    match timeout_at(deadline, self.execute_one(call, &binding)).await {
                        Ok((result, duration_ms)) => {
                            run.record_result(call, &binding, result, duration_ms)?
                        }
                        Err(_) => {
                            completed = false;
                            break;
                        }
                    }
                }
                completed
            };
            if !completed {
                return Ok(run.abort(AbortReason::Deadline));
            }
            run.cycles += 1;
        }
    }

    async fn execute_one(
        &self,
        call: &ToolCallRequest,
        binding: &ToolBinding,
    ) -> (std::result::Result<String, ToolError>, u64) {
        let start = Instant::now();
        if !binding.tools.iter().any(|t| t == &call.name) {
            return (Err(ToolError::UnknownTool(call.name.clone())), 0);
        }
        debug!(tool = %call.name, id = %call.id, "executing tool call");
        let result = self.tools.invoke(&call.name, call.arguments.clone()).await;
        (result, start.elapsed().as_millis() as u64)
    }
}

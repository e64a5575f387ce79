//! Workflow Engine
//!
//! Runs the research pipeline `Plan → Research → Synthesize → Write → Review
//! → Complete` over one [`WorkflowState`]. Plan, Write and Review are single
//! model calls without tools; Research fans out to the configured workers;
//! Synthesize is pure.

use crate::agents::{stage_agents, AgentInvoker, AgentReply, PromptContext, WorkerIdentity};
use crate::llm::LLMClientFactoryTrait;
use crate::tools::registry::ToolRegistry;
use crate::types::{AppError, ResearchRequest, Result};
use crate::utils::toml_config::{CrewConfig, ResearchMode};
use crate::workflows::fanout::{FailurePolicy, FanOut, InProcessFanOut, ResearchSeed};
use crate::workflows::gateway::DelegationGateway;
use crate::workflows::state::{Stage, WorkerReport, WorkerStatus, WorkflowState};
use crate::workflows::tool_loop::{LoopConfig, ToolLoop};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Progress notification emitted when a stage finishes.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StageEvent {
    pub run_id: Uuid,
    pub stage: Stage,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

/// Workflow engine that sequences the research stages
pub struct WorkflowEngine {
    invoker: Arc<AgentInvoker>,
    tool_loop: Arc<ToolLoop>,
    fanout: Arc<dyn FanOut>,
    workers: Vec<WorkerIdentity>,
}

impl WorkflowEngine {
    /// Engine whose Research stage runs the six aspect workers in-process.
    pub fn new(invoker: Arc<AgentInvoker>, tool_loop: Arc<ToolLoop>, policy: FailurePolicy) -> Self {
        let fanout = Arc::new(InProcessFanOut::new(Arc::clone(&tool_loop), policy));
        Self {
            invoker,
            tool_loop,
            fanout,
            workers: WorkerIdentity::ASPECTS.to_vec(),
        }
    }

    /// Build an engine for one run from the current configuration.
    pub async fn from_config(
        config: &CrewConfig,
        factory: &dyn LLMClientFactoryTrait,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self> {
        let invoker = Arc::new(AgentInvoker::from_config(config, factory).await?);
        let tool_loop = Arc::new(ToolLoop::new(
            Arc::clone(&invoker),
            tools,
            LoopConfig::from_config(config),
        ));

        let engine = Self::new(invoker, tool_loop, config.research.failure_policy)
            .with_workers(config.research.effective_workers());

        match config.research.mode {
            ResearchMode::Delegated => {
                Ok(engine.with_fanout(Arc::new(DelegationGateway::from_config(config)?)))
            }
            ResearchMode::Parallel | ResearchMode::Sequential => Ok(engine),
        }
    }

    pub fn with_fanout(mut self, fanout: Arc<dyn FanOut>) -> Self {
        self.fanout = fanout;
        self
    }

    pub fn with_workers(mut self, workers: Vec<WorkerIdentity>) -> Self {
        self.workers = workers;
        self
    }

    pub fn workers(&self) -> &[WorkerIdentity] {
        &self.workers
    }

    pub fn fanout_kind(&self) -> &'static str {
        self.fanout.kind()
    }

    /// Run a single worker loop in-process, as a remote worker service would.
    pub async fn run_worker(
        &self,
        identity: WorkerIdentity,
        topic: &str,
        plan: &str,
    ) -> Result<WorkerReport> {
        self.tool_loop
            .run(identity, topic, plan)
            .await
            .map(|outcome| outcome.report)
            .map_err(|e| match e {
                e @ AppError::Configuration(_) => e,
                other => AppError::Worker {
                    worker: identity,
                    message: other.to_string(),
                },
            })
    }

    /// Execute the full pipeline for one request.
    ///
    /// Each finished stage is reported on `progress` when given. Cancelling
    /// `cancel` stops the run with [`AppError::Cancelled`] naming the stage
    /// that was in flight.
    #[tracing::instrument(
        name = "research_run",
        skip(self, request, progress, cancel),
        fields(topic = %request.topic)
    )]
    pub async fn run(
        &self,
        request: &ResearchRequest,
        progress: Option<&mpsc::Sender<StageEvent>>,
        cancel: &CancellationToken,
    ) -> Result<WorkflowState> {
        request.validate()?;
        let mut state = WorkflowState::new(request.topic.trim(), request.plan.clone());
        let topic = state.topic().to_string();
        info!(run_id = %state.run_id(), workers = self.workers.len(), "research run started");

        // Plan
        let started = Instant::now();
        let plan = match state.plan() {
            Some(seeded) => {
                info!("using pre-seeded plan; planner skipped");
                seeded.to_string()
            }
            None => {
                let plan = self
                    .single_call(
                        stage_agents::PLANNER,
                        &PromptContext::new(&topic),
                        Stage::Plan,
                        cancel,
                    )
                    .await?;
                state.set_plan(plan.clone())?;
                plan
            }
        };
        self.finish_stage(&mut state, plan.clone(), started, progress).await;

        // Research
        self.enter(&mut state, Stage::Research, cancel)?;
        let started = Instant::now();
        let seed = ResearchSeed::new(&topic, &plan);
        let results = self
            .fanout
            .run_parallel(&self.workers, &seed, cancel)
            .await
            .map_err(|e| e.in_stage(Stage::Research))?;
        for report in results.into_values() {
            state.merge_worker(report)?;
        }
        let summary = summarize_workers(&state);
        self.finish_stage(&mut state, summary, started, progress).await;

        // Synthesize
        self.enter(&mut state, Stage::Synthesize, cancel)?;
        let started = Instant::now();
        let research_context = state.synthesize();
        state.set_research_context(research_context.clone())?;
        self.finish_stage(&mut state, research_context, started, progress)
            .await;

        // Write
        self.enter(&mut state, Stage::Write, cancel)?;
        let started = Instant::now();
        let context = PromptContext::from_state(&state);
        let draft = self
            .single_call(stage_agents::WRITER, &context, Stage::Write, cancel)
            .await?;
        state.set_draft(draft.clone())?;
        self.finish_stage(&mut state, draft, started, progress).await;

        // Review
        self.enter(&mut state, Stage::Review, cancel)?;
        let started = Instant::now();
        let context = PromptContext::from_state(&state);
        let review = self
            .single_call(stage_agents::REVIEWER, &context, Stage::Review, cancel)
            .await?;
        state.set_review(review.clone())?;
        self.finish_stage(&mut state, review.clone(), started, progress).await;

        // Complete
        state.advance(Stage::Complete)?;
        state.set_final_report(review.clone())?;
        self.finish_stage(&mut state, review, Instant::now(), progress).await;

        info!(run_id = %state.run_id(), "research run complete");
        Ok(state)
    }

    fn enter(&self, state: &mut WorkflowState, stage: Stage, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            warn!(%stage, "run cancelled before stage started");
            return Err(AppError::Cancelled { stage });
        }
        state.advance(stage)
    }

    /// One tool-less model call for a pipeline agent.
    async fn single_call(
        &self,
        agent: &str,
        context: &PromptContext,
        stage: Stage,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AppError::Cancelled { stage }),
            reply = self.invoker.invoke(agent, context, &[], &[]) => reply,
        };

        match reply.map_err(|e| e.in_stage(stage))? {
            AgentReply::FinalAnswer(text) => Ok(text),
            AgentReply::ToolCallBatch(_) => Err(AppError::Stage {
                stage,
                message: format!("agent '{}' requested tools without a tool set", agent),
            }),
        }
    }

    async fn finish_stage(
        &self,
        state: &mut WorkflowState,
        output: String,
        started: Instant,
        progress: Option<&mpsc::Sender<StageEvent>>,
    ) {
        let stage = state.stage();
        let duration_ms = started.elapsed().as_millis() as u64;
        let run_id = state.run_id();
        let record = state.record(stage, output, duration_ms);
        info!(%stage, duration_ms, "stage complete");

        if let Some(tx) = progress {
            let event = StageEvent {
                run_id,
                stage,
                output: record.output.clone(),
                timestamp: record.timestamp,
            };
            if tx.send(event).await.is_err() {
                warn!(%stage, "progress receiver dropped");
            }
        }
    }
}

fn summarize_workers(state: &WorkflowState) -> String {
    let results = state.per_worker_results();
    let done = results.values().filter(|r| r.is_done()).count();
    let aborted = results
        .values()
        .filter(|r| matches!(r.status, WorkerStatus::Aborted { .. }))
        .count();
    let failed = results.len() - done - aborted;
    format!(
        "{} workers: {} done, {} aborted, {} failed",
        results.len(),
        done,
        aborted,
        failed
    )
}

//! Run state threaded through the stage pipeline.
//!
//! One [`WorkflowState`] exists per request. Stage outputs are write-once,
//! each worker's report is merged exactly once, and stages advance strictly
//! in pipeline order; violations are internal errors.

use crate::agents::WorkerIdentity;
use crate::types::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

/// Pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Plan,
    Research,
    Synthesize,
    Write,
    Review,
    Complete,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::Plan,
        Stage::Research,
        Stage::Synthesize,
        Stage::Write,
        Stage::Review,
        Stage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Research => "research",
            Stage::Synthesize => "synthesize",
            Stage::Write => "write",
            Stage::Review => "review",
            Stage::Complete => "complete",
        }
    }

    /// The stage after this one; `None` once complete.
    pub fn next(&self) -> Option<Stage> {
        let idx = Stage::ORDER.iter().position(|s| s == self)?;
        Stage::ORDER.get(idx + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished stage, kept for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StageRecord {
    pub stage: Stage,
    pub output: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Why a tool-calling loop stopped before a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// A tool batch was requested after the iteration cap was reached
    CycleCap,
    /// The loop's wall-clock deadline elapsed
    Deadline,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::CycleCap => f.write_str("tool iteration cap reached"),
            AbortReason::Deadline => f.write_str("worker deadline elapsed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkerStatus {
    Done,
    Aborted { reason: AbortReason },
    Failed { error: String },
}

/// Accumulated output of one tool within a worker's loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Finding {
    pub tool: String,
    pub output: String,
}

/// Tool outputs keyed by tool name, in first-call order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Findings(Vec<Finding>);

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tool output. Repeated calls to a tool append to its entry.
    pub fn record(&mut self, tool: &str, output: &str) {
        match self.0.iter_mut().find(|f| f.tool == tool) {
            Some(existing) => {
                existing.output.push_str("\n\n");
                existing.output.push_str(output);
            }
            None => self.0.push(Finding {
                tool: tool.to_string(),
                output: output.to_string(),
            }),
        }
    }

    pub fn get(&self, tool: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|f| f.tool == tool)
            .map(|f| f.output.as_str())
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.0.iter().map(|f| f.tool.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything one worker hands back when its loop terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkerReport {
    pub identity: WorkerIdentity,
    pub status: WorkerStatus,
    /// Terminal answer; empty unless `Done`
    pub answer: String,
    pub findings: Findings,
    /// Tool batches executed
    pub cycles: usize,
    /// Individual tool calls executed
    pub tool_invocations: usize,
}

impl WorkerReport {
    pub fn done(identity: WorkerIdentity, answer: impl Into<String>) -> Self {
        Self {
            identity,
            status: WorkerStatus::Done,
            answer: answer.into(),
            findings: Findings::new(),
            cycles: 0,
            tool_invocations: 0,
        }
    }

    pub fn aborted(identity: WorkerIdentity, reason: AbortReason, findings: Findings) -> Self {
        Self {
            identity,
            status: WorkerStatus::Aborted { reason },
            answer: String::new(),
            findings,
            cycles: 0,
            tool_invocations: 0,
        }
    }

    pub fn failed(identity: WorkerIdentity, error: impl Into<String>) -> Self {
        Self {
            identity,
            status: WorkerStatus::Failed {
                error: error.into(),
            },
            answer: String::new(),
            findings: Findings::new(),
            cycles: 0,
            tool_invocations: 0,
        }
    }

    pub fn with_findings(mut self, findings: Findings) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_counts(mut self, cycles: usize, tool_invocations: usize) -> Self {
        self.cycles = cycles;
        self.tool_invocations = tool_invocations;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == WorkerStatus::Done
    }

    /// The answer, or a bracketed marker when there is none.
    pub fn answer_or_marker(&self) -> String {
        match &self.status {
            WorkerStatus::Done if self.answer.trim().is_empty() => "[no answer]".to_string(),
            WorkerStatus::Done => self.answer.clone(),
            WorkerStatus::Aborted { reason } => format!("[aborted: {}]", reason),
            WorkerStatus::Failed { error } => format!("[failed: {}]", error),
        }
    }
}

/// The single context threaded through one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    run_id: Uuid,
    topic: String,
    plan: Option<String>,
    per_worker_results: BTreeMap<WorkerIdentity, WorkerReport>,
    research_context: Option<String>,
    draft: Option<String>,
    review: Option<String>,
    final_report: Option<String>,
    caller_identity: Option<WorkerIdentity>,
    stage: Stage,
    history: Vec<StageRecord>,
}

fn write_once(slot: &mut Option<String>, field: &str, value: String) -> Result<()> {
    if slot.is_some() {
        return Err(AppError::Internal(format!("'{}' has already been written", field)));
    }
    *slot = Some(value);
    Ok(())
}

impl WorkflowState {
    pub fn new(topic: impl Into<String>, plan: Option<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            topic: topic.into(),
            plan,
            per_worker_results: BTreeMap::new(),
            research_context: None,
            draft: None,
            review: None,
            final_report: None,
            caller_identity: None,
            stage: Stage::Plan,
            history: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn plan(&self) -> Option<&str> {
        self.plan.as_deref()
    }

    pub fn per_worker_results(&self) -> &BTreeMap<WorkerIdentity, WorkerReport> {
        &self.per_worker_results
    }

    pub fn research_context(&self) -> Option<&str> {
        self.research_context.as_deref()
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    pub fn review(&self) -> Option<&str> {
        self.review.as_deref()
    }

    pub fn final_report(&self) -> Option<&str> {
        self.final_report.as_deref()
    }

    pub fn caller_identity(&self) -> Option<WorkerIdentity> {
        self.caller_identity
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn history(&self) -> &[StageRecord] {
        &self.history
    }

    pub fn set_plan(&mut self, plan: impl Into<String>) -> Result<()> {
        write_once(&mut self.plan, "plan", plan.into())
    }

    pub fn set_research_context(&mut self, context: impl Into<String>) -> Result<()> {
        write_once(&mut self.research_context, "research_context", context.into())
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) -> Result<()> {
        write_once(&mut self.draft, "draft", draft.into())
    }

    pub fn set_review(&mut self, review: impl Into<String>) -> Result<()> {
        write_once(&mut self.review, "review", review.into())
    }

    pub fn set_final_report(&mut self, report: impl Into<String>) -> Result<()> {
        write_once(&mut self.final_report, "final_report", report.into())
    }

    /// Merge one worker's report. Each identity may be merged once.
    pub fn merge_worker(&mut self, report: WorkerReport) -> Result<()> {
        let identity = report.identity;
        if self.per_worker_results.contains_key(&identity) {
            return Err(AppError::Internal(format!(
                "results for worker '{}' were already merged",
                identity
            )));
        }
        if report.tool_invocations > 0 {
            self.caller_identity = Some(identity);
        }
        self.per_worker_results.insert(identity, report);
        Ok(())
    }

    /// Move to `next`, which must directly follow the current stage.
    pub fn advance(&mut self, next: Stage) -> Result<()> {
        if self.stage.next() != Some(next) {
            return Err(AppError::Internal(format!(
                "invalid stage transition {} -> {}",
                self.stage, next
            )));
        }
        self.stage = next;
        Ok(())
    }

    pub fn record(&mut self, stage: Stage, output: impl Into<String>, duration_ms: u64) -> &StageRecord {
        self.history.push(StageRecord {
            stage,
            output: output.into(),
            timestamp: Utc::now(),
            duration_ms,
        });
        &self.history[self.history.len() - 1]
    }

    /// Render merged worker results as one text block.
    ///
    /// Identities in declaration order, tools in first-call order. Pure: the
    /// same results always produce the same bytes.
    pub fn synthesize(&self) -> String {
        let mut blocks = Vec::new();
        for (identity, report) in &self.per_worker_results {
            blocks.push(format!("--- {} ---\n{}", identity, report.answer_or_marker()));
            for finding in report.findings.iter() {
                blocks.push(format!(
                    "--- {} / {} ---\n{}",
                    identity, finding.tool, finding.output
                ));
            }
        }
        blocks.join("\n\n")
    }
}

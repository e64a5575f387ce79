//! Fan-out/fan-in of research workers.
//!
//! Every worker starts from the same seed (topic and plan) with an empty
//! private transcript; no worker sees another's intermediate results. The
//! coordinator returns only once every worker is terminal.

use crate::agents::WorkerIdentity;
use crate::types::{AppError, Result};
use crate::workflows::state::{Stage, WorkerReport};
use crate::workflows::tool_loop::ToolLoop;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use utoipa::ToSchema;

/// What a failed worker does to the rest of the fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure in the worker's report and keep going
    #[default]
    BestEffort,
    /// Abort the remaining workers and fail the stage
    Strict,
}

/// Shared starting point for every worker of a run.
#[derive(Debug, Clone)]
pub struct ResearchSeed {
    pub topic: String,
    pub plan: String,
}

impl ResearchSeed {
    pub fn new(topic: impl Into<String>, plan: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            plan: plan.into(),
        }
    }
}

/// One report per launched identity.
pub type FanOutResult = BTreeMap<WorkerIdentity, WorkerReport>;

#[async_trait]
pub trait FanOut: Send + Sync {
    /// Run `workers` concurrently from `seed` and wait for all of them.
    ///
    /// Cancelling `cancel` aborts every running worker and returns
    /// [`AppError::Cancelled`].
    async fn run_parallel(
        &self,
        workers: &[WorkerIdentity],
        seed: &ResearchSeed,
        cancel: &CancellationToken,
    ) -> Result<FanOutResult>;

    /// Short name shown by `GET /workers`.
    fn kind(&self) -> &'static str;
}

/// Apply the failure policy to one failed worker.
pub(crate) fn handle_failure(
    policy: FailurePolicy,
    identity: WorkerIdentity,
    message: String,
) -> Result<WorkerReport> {
    match policy {
        FailurePolicy::BestEffort => {
            warn!(worker = %identity, error = %message, "worker failed; continuing");
            Ok(WorkerReport::failed(identity, message))
        }
        FailurePolicy::Strict => {
            error!(worker = %identity, error = %message, "worker failed; aborting fan-out");
            Err(AppError::Worker {
                worker: identity,
                message,
            })
        }
    }
}

/// Runs one [`ToolLoop`] per worker as tasks on a `JoinSet`.
pub struct InProcessFanOut {
    tool_loop: Arc<ToolLoop>,
    policy: FailurePolicy,
}

impl InProcessFanOut {
    pub fn new(tool_loop: Arc<ToolLoop>, policy: FailurePolicy) -> Self {
        Self { tool_loop, policy }
    }
}

#[async_trait]
impl FanOut for InProcessFanOut {
    async fn run_parallel(
        &self,
        workers: &[WorkerIdentity],
        seed: &ResearchSeed,
        cancel: &CancellationToken,
    ) -> Result<FanOutResult> {
        let mut set = JoinSet::new();
        let mut task_ids = HashMap::new();

        let unique: BTreeSet<WorkerIdentity> = workers.iter().copied().collect();
        for identity in unique {
            let tool_loop = Arc::clone(&self.tool_loop);
            let seed = seed.clone();
            let handle = set.spawn(async move {
                tool_loop.run(identity, &seed.topic, &seed.plan).await
            });
            task_ids.insert(handle.id(), identity);
        }

        info!(workers = task_ids.len(), "research workers launched");

        let mut results = FanOutResult::new();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    warn!("research cancelled; aborted all workers");
                    return Err(AppError::Cancelled { stage: Stage::Research });
                }
                joined = set.join_next_with_id() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            let report = match joined {
                Ok((id, Ok(outcome))) => {
                    task_ids.remove(&id);
                    outcome.report
                }
                Ok((_, Err(e @ AppError::Configuration(_)))) => {
                    // A broken prompt template is fatal whatever the policy.
                    set.abort_all();
                    error!(error = %e, "worker configuration error; aborted all workers");
                    return Err(e);
                }
                Ok((id, Err(e))) => {
                    let identity = task_ids.remove(&id).ok_or_else(|| {
                        AppError::Internal("joined an unknown worker task".to_string())
                    })?;
                    match handle_failure(self.policy, identity, e.to_string()) {
                        Ok(report) => report,
                        Err(e) => {
                            set.abort_all();
                            return Err(e);
                        }
                    }
                }
                Err(join_error) => {
                    let identity = task_ids.remove(&join_error.id()).ok_or_else(|| {
                        AppError::Internal("joined an unknown worker task".to_string())
                    })?;
                    let message = if join_error.is_panic() {
                        "worker task panicked".to_string()
                    } else {
                        format!("worker task ended abnormally: {}", join_error)
                    };
                    match handle_failure(self.policy, identity, message) {
                        Ok(report) => report,
                        Err(e) => {
                            set.abort_all();
                            return Err(e);
                        }
                    }
                }
            };

            info!(worker = %report.identity, status = ?report.status, "worker joined");
            results.insert(report.identity, report);
        }

        Ok(results)
    }

    fn kind(&self) -> &'static str {
        "in-process"
    }
}

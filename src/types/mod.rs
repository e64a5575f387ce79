use crate::agents::WorkerIdentity;
use crate::workflows::state::{
    AbortReason, Stage, StageRecord, WorkerReport, WorkerStatus, WorkflowState,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ============= API Request/Response Types =============

/// Inbound research request. A pre-seeded `plan` skips the Plan stage.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    /// Reject requests the pipeline cannot start from.
    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            return Err(AppError::InvalidInput("topic must not be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResearchResponse {
    pub run_id: Uuid,
    pub topic: String,
    pub plan: String,
    pub report: String,
    pub workers: Vec<WorkerSummary>,
    pub stages: Vec<StageRecord>,
    pub duration_ms: u64,
}

impl ResearchResponse {
    /// Summarize a completed run.
    pub fn from_state(state: &WorkflowState, duration_ms: u64) -> Self {
        Self {
            run_id: state.run_id(),
            topic: state.topic().to_string(),
            plan: state.plan().unwrap_or_default().to_string(),
            report: state.final_report().unwrap_or_default().to_string(),
            workers: state
                .per_worker_results()
                .values()
                .map(WorkerSummary::from)
                .collect(),
            stages: state.history().to_vec(),
            duration_ms,
        }
    }
}

/// Per-worker line in a research response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkerSummary {
    pub identity: WorkerIdentity,
    pub status: WorkerStatus,
    pub tools_used: Vec<String>,
    pub tool_invocations: usize,
}

impl From<&WorkerReport> for WorkerSummary {
    fn from(report: &WorkerReport) -> Self {
        Self {
            identity: report.identity,
            status: report.status.clone(),
            tools_used: report.findings.tool_names(),
            tool_invocations: report.tool_invocations,
        }
    }
}

/// Body of `POST /run_<identity>`, also sent by the delegation gateway.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkerRunRequest {
    pub topic: String,
    #[serde(default)]
    pub plan: String,
}

/// Reply of a remote worker service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkerRunResponse {
    /// `success`, `aborted` or `failed`
    pub status: String,
    pub result: String,
    /// Set when `status` is `aborted`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AbortReason>,
}

impl From<&WorkerReport> for WorkerRunResponse {
    fn from(report: &WorkerReport) -> Self {
        let (status, reason) = match &report.status {
            WorkerStatus::Done => ("success", None),
            WorkerStatus::Aborted { reason } => ("aborted", Some(*reason)),
            WorkerStatus::Failed { .. } => ("failed", None),
        };
        let result = if report.is_done() || report.findings.is_empty() {
            report.answer_or_marker()
        } else {
            report
                .findings
                .iter()
                .map(|f| format!("{}:\n{}", f.tool, f.output))
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        Self {
            status: status.to_string(),
            result,
            reason,
        }
    }
}

// ============= Tool Types =============

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A structured request, emitted by a model reply, to invoke a named tool.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("Worker '{worker}' failed: {message}")]
    Worker {
        worker: WorkerIdentity,
        message: String,
    },

    #[error("Run cancelled during stage '{stage}'")]
    Cancelled { stage: Stage },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable category used in error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration",
            AppError::LLM(_) => "llm",
            AppError::Timeout(_) => "timeout",
            AppError::Stage { .. } => "stage_failure",
            AppError::Worker { .. } => "worker_failure",
            AppError::Cancelled { .. } => "cancelled",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AppError::Configuration(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LLM(_) | AppError::Stage { .. } | AppError::Worker { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Wrap a failure that happened while `stage` was running.
    ///
    /// Errors that already name a stage, a worker or a cancellation keep
    /// their own shape.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            e @ (AppError::Stage { .. }
            | AppError::Worker { .. }
            | AppError::Cancelled { .. }
            | AppError::Configuration(_)) => e,
            other => AppError::Stage {
                stage,
                message: other.to_string(),
            },
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (stage, worker) = match self {
            AppError::Stage { stage, .. } | AppError::Cancelled { stage } => (Some(*stage), None),
            AppError::Worker { worker, .. } => (Some(Stage::Research), Some(*worker)),
            _ => (None, None),
        };
        ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
            stage,
            worker,
        }
    }
}

/// Structured error object returned to callers instead of a bare failure.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerIdentity>,
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), axum::Json(self.body())).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

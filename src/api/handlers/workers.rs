//! Worker listing and the per-identity worker service endpoints.

use crate::{
    agents::WorkerIdentity,
    types::{AppError, Result, WorkerRunRequest, WorkerRunResponse},
    utils::toml_config::ResearchMode,
    workflows::FailurePolicy,
    AppState,
};
use axum::{extract::State, Json};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

/// How research is currently configured to run
#[derive(Debug, Serialize, ToSchema)]
pub struct WorkersInfo {
    pub mode: ResearchMode,
    pub failure_policy: FailurePolicy,
    pub max_tool_iterations: usize,
    pub workers: Vec<WorkerInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WorkerInfo {
    pub identity: WorkerIdentity,
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub tools: Vec<String>,
    /// Remote service URL when research is delegated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

/// List the worker identities the Research stage will launch
#[utoipa::path(
    get,
    path = "/workers",
    responses(
        (status = 200, description = "Configured workers", body = WorkersInfo)
    ),
    tag = "workers"
)]
pub async fn list_workers(State(state): State<AppState>) -> Json<WorkersInfo> {
    let config = state.config_manager.config();
    let delegated = config.research.mode == ResearchMode::Delegated;

    let workers = config
        .research
        .effective_workers()
        .into_iter()
        .map(|identity| {
            let agent = identity.agent_name();
            WorkerInfo {
                identity,
                endpoint: identity.endpoint_path(),
                model: config.agent_model(agent).map(str::to_string),
                tools: config
                    .agent_tools(agent)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                service_url: delegated
                    .then(|| config.delegation.service_url(identity))
                    .flatten()
                    .map(str::to_string),
            }
        })
        .collect();

    Json(WorkersInfo {
        mode: config.research.mode,
        failure_policy: config.research.failure_policy,
        max_tool_iterations: config.research.max_tool_iterations,
        workers,
    })
}

/// Run one worker's tool-calling loop in-process
///
/// Served once per identity as `POST /run_<identity>`, which lets this server
/// act as the remote worker service for another deployment.
#[utoipa::path(
    post,
    path = "/run_{identity}",
    request_body = WorkerRunRequest,
    params(
        ("identity" = WorkerIdentity, Path, description = "Worker identity, e.g. `who`")
    ),
    responses(
        (status = 200, description = "Worker finished", body = WorkerRunResponse),
        (status = 400, description = "Invalid input", body = crate::types::ErrorBody),
        (status = 502, description = "Worker failed", body = crate::types::ErrorBody)
    ),
    tag = "workers"
)]
pub async fn run_worker(
    identity: WorkerIdentity,
    state: AppState,
    payload: WorkerRunRequest,
) -> Result<Json<WorkerRunResponse>> {
    if payload.topic.trim().is_empty() {
        return Err(AppError::InvalidInput("topic must not be empty".to_string()));
    }

    let engine = state.engine().await?;
    let report = engine
        .run_worker(identity, payload.topic.trim(), &payload.plan)
        .await?;

    info!(worker = %identity, status = ?report.status, "worker request served");
    Ok(Json(WorkerRunResponse::from(&report)))
}

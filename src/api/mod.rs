//! HTTP API Handlers and Routes
//!
//! # API Endpoints
//!
//! - `POST /research` - Run the pipeline and return the reviewed report
//! - `POST /research/stream` - Same run, streamed as server-sent stage events
//! - `POST /run_<identity>` - Run one worker loop (worker service protocol)
//! - `GET /workers` - Configured worker identities and research mode
//! - `GET /health` - Health check endpoint
//!
//! Errors are answered with a JSON body `{error, kind, stage?, worker?}`.
//!
//! # OpenAPI Documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/swagger-ui/`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;

use utoipa::OpenApi;

/// OpenAPI document for the HTTP surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::research::research,
        handlers::research::research_stream,
        handlers::workers::list_workers,
        handlers::workers::run_worker,
    ),
    components(schemas(
        crate::types::ResearchRequest,
        crate::types::ResearchResponse,
        crate::types::WorkerSummary,
        crate::types::WorkerRunRequest,
        crate::types::WorkerRunResponse,
        crate::types::ErrorBody,
        crate::workflows::StageEvent,
        crate::workflows::StageRecord,
        crate::workflows::Stage,
        crate::workflows::WorkerStatus,
        crate::workflows::AbortReason,
        handlers::workers::WorkersInfo,
        handlers::workers::WorkerInfo,
    )),
    tags(
        (name = "research", description = "Research pipeline"),
        (name = "workers", description = "Research workers"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

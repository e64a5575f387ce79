use crate::agents::WorkerIdentity;
use crate::api::handlers::{self, research, workers};
use crate::types::WorkerRunRequest;
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

pub fn create_router() -> Router<AppState> {
    let mut router = Router::new()
        .route("/health", get(handlers::health))
        .route("/workers", get(workers::list_workers))
        .route("/research", post(research::research))
        .route("/research/stream", post(research::research_stream));

    // axum cannot capture part of a path segment, so each identity gets its own route.
    for identity in WorkerIdentity::ALL {
        router = router.route(
            &identity.endpoint_path(),
            post(
                move |State(state): State<AppState>, Json(payload): Json<WorkerRunRequest>| {
                    workers::run_worker(identity, state, payload)
                },
            ),
        );
    }

    router
}

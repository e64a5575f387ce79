use crate::{
    types::{AppError, ResearchRequest, ResearchResponse, Result},
    workflows::StageEvent,
    AppState,
};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use std::convert::Infallible;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Run the full research pipeline for a topic
#[utoipa::path(
    post,
    path = "/research",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Research completed", body = ResearchResponse),
        (status = 400, description = "Invalid input", body = crate::types::ErrorBody),
        (status = 502, description = "A stage or worker failed", body = crate::types::ErrorBody)
    ),
    tag = "research"
)]
pub async fn research(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Json<ResearchResponse>> {
    payload.validate()?;
    let start = Instant::now();

    let engine = state.engine().await?;
    let run = engine
        .run(&payload, None, &CancellationToken::new())
        .await?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(run_id = %run.run_id(), duration_ms, "research request served");
    Ok(Json(ResearchResponse::from_state(&run, duration_ms)))
}

/// Run the research pipeline and stream one `stage` event per finished stage
///
/// The run is cancelled when the client disconnects. A failed run ends the
/// stream with a single `error` event carrying the structured error body.
#[utoipa::path(
    post,
    path = "/research/stream",
    request_body = ResearchRequest,
    responses(
        (status = 200, description = "Server-sent stage events", body = StageEvent),
        (status = 400, description = "Invalid input", body = crate::types::ErrorBody)
    ),
    tag = "research"
)]
pub async fn research_stream(
    State(state): State<AppState>,
    Json(payload): Json<ResearchRequest>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    payload.validate()?;
    let engine = state.engine().await?;

    let cancel = CancellationToken::new();
    let disconnect_guard = cancel.clone().drop_guard();
    let (tx, mut rx) = mpsc::channel::<StageEvent>(16);

    let run = tokio::spawn(async move { engine.run(&payload, Some(&tx), &cancel).await });

    let stream = async_stream::stream! {
        // Dropping the stream (client went away) cancels the run.
        let _guard = disconnect_guard;

        while let Some(event) = rx.recv().await {
            yield Ok(json_event("stage", &event));
        }

        let failure = match run.await {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e),
            Err(join_error) => Some(AppError::Internal(format!(
                "research task ended abnormally: {}",
                join_error
            ))),
        };
        if let Some(e) = failure {
            error!(error = %e, "streamed research run failed");
            yield Ok(json_event("error", &e.body()));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn json_event<T: serde::Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

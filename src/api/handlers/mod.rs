//! API request handlers.

/// Research pipeline handlers (blocking and streamed).
pub mod research;
/// Worker listing and per-identity worker service handlers.
pub mod workers;

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is up", body = String)),
    tag = "health"
)]
pub async fn health() -> &'static str {
    "OK"
}

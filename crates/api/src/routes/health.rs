//! Health check endpoint.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// GET /health: Returns service health status.
pub async fn check(State(service): State<&'static str>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service,
    })
}

/// Health routes reporting `service` as the responder.
pub fn router(service: &'static str) -> Router {
    Router::new()
        .route("/health", get(check))
        .with_state(service)
}

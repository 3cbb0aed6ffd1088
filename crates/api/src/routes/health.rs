//! Liveness endpoint for the webhook receiver.

use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /health — reports the receiver as alive.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

use axum::{response::IntoResponse, Json};
use serde_json::json;

/// `GET /health` — liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

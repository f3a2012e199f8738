use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};

/// Simple health-check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// `GET /health`
///
/// Returns a basic JSON document indicating liveness. Clients check it to
/// find the first reachable seed.
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
        }),
    )
}

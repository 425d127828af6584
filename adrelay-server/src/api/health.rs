use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use super::schemas::HealthResponse;

/// `GET /healthz` -- liveness probe, grounded on
/// `acteon-server/src/api/health.rs`.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = "Health",
    summary = "Health check",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_owned(),
        }),
    )
}

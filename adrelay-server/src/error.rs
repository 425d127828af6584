use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use adrelay_gateway::GatewayResponse;

/// Errors that can occur assembling or running the `adrelay-server` process.
/// Request handlers never surface this type directly (a track or callback
/// request always resolves to a [`GatewayResponse`]); it covers startup
/// failures only.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("gateway error: {0}")]
    Gateway(#[from] adrelay_gateway::GatewayError),

    #[error("state backend error: {0}")]
    State(#[from] adrelay_state::StateError),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = GatewayResponse::new(false, 500, self.to_string());
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

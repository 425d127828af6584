//! `GET /cb` -- correlate, verify, remap, and forward an upstream
//! conversion callback to its downstream. Grounded on
//! `acteon-server/src/api/events.rs` and `original_source/app/routers/callback.py`.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use uuid::Uuid;

use adrelay_gateway::{CallbackParams, GatewayResponse};

use super::AppState;

#[utoipa::path(
    get,
    path = "/cb",
    tag = "Callback",
    summary = "Receive an upstream conversion callback",
    description = "Looks up the original track request by `rid`, verifies and remaps the payload, and forwards it to the downstream if the rule's whitelist and throttle allow it.",
    params(("rid" = String, Query, description = "The trace id issued at track time")),
    responses((status = 200, description = "Callback processed", body = super::schemas::GatewayResponseSchema))
)]
pub async fn callback(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> impl IntoResponse {
    let Some(rid) = query.get("rid").and_then(|s| Uuid::parse_str(s).ok()) else {
        let response = GatewayResponse::new(false, 500, "missing or invalid rid");
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(response));
    };

    let ip = addr.ip().to_string();
    let ua = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned();

    let body_json = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    let params = CallbackParams {
        query,
        body: body_json,
        ip,
        ua,
    };

    let response = state.gateway.handle_callback(rid, params).await;
    let status = StatusCode::from_u16(response.code).unwrap_or(StatusCode::OK);
    (status, Json(response))
}

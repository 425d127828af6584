//! `GET /v1/track` -- clean, validate, route, and dispatch or debounce an
//! inbound tracking pixel. Grounded on `acteon-server/src/api/events.rs`'s
//! `State<AppState>` + `Query<...>` handler shape.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use adrelay_gateway::TrackParams;

use super::AppState;

/// Raw `GET /v1/track` query parameters, named to match the original
/// `track.py` request body field-for-field (spec.md §4.8).
#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    ds_id: Option<String>,
    event_type: Option<String>,
    click_id: Option<String>,
    ad_id: Option<String>,
    channel_id: Option<String>,
    ts: Option<String>,
    ip: Option<String>,
    ua: Option<String>,
    device_os: Option<String>,
    device_model: Option<String>,
    device_idfa: Option<String>,
    device_caid: Option<String>,
    device_oaid: Option<String>,
    device_imei: Option<String>,
    device_android_id: Option<String>,
    os_version: Option<String>,
    device_mac: Option<String>,
    user_phone_md5: Option<String>,
    user_email_sha256: Option<String>,
    ext_custom_id: Option<String>,
    callback: Option<String>,
}

impl From<TrackQuery> for TrackParams {
    fn from(q: TrackQuery) -> Self {
        Self {
            ds_id: q.ds_id,
            event_type: q.event_type,
            click_id: q.click_id,
            ad_id: q.ad_id,
            channel_id: q.channel_id,
            ts: q.ts,
            ip: q.ip,
            ua: q.ua,
            device_os: q.device_os,
            device_model: q.device_model,
            device_idfa: q.device_idfa,
            device_caid: q.device_caid,
            device_oaid: q.device_oaid,
            device_imei: q.device_imei,
            device_android_id: q.device_android_id,
            os_version: q.os_version,
            device_mac: q.device_mac,
            user_phone_md5: q.user_phone_md5,
            user_email_sha256: q.user_email_sha256,
            ext_custom_id: q.ext_custom_id,
            callback: q.callback,
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/track",
    tag = "Track",
    summary = "Track an inbound click or impression",
    description = "Cleans, validates, routes, and either debounces or immediately dispatches the event to its upstream partner.",
    responses((status = 200, description = "Track request accepted", body = super::schemas::GatewayResponseSchema))
)]
pub async fn track(State(state): State<AppState>, Query(query): Query<TrackQuery>) -> impl IntoResponse {
    let params: TrackParams = query.into();
    let response = state.gateway.handle_track(params).await;
    (StatusCode::from_u16(response.code).unwrap_or(StatusCode::OK), Json(response))
}

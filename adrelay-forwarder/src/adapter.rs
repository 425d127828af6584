//! Forwarder-to-upstream adapter (spec.md §4.6). Grounded on
//! `original_source/app/services/forwarder.py::dispatch_click_job`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{instrument, warn};
use url::Url;
use uuid::Uuid;

use adrelay_core::{CallbackSentStatus, RequestLog, TrackStatus, Udm, Upstream};
use adrelay_expr::{eval_body_template, render_template, Value as ExprValue};
use adrelay_state::RequestLogStore;

use crate::send::http_send_with_retry;

/// Build the `cb_url()` helper value: the base callback URL for this
/// `rid`, with the downstream-supplied callback template's query string
/// appended when present (spec.md §4.6 step 3).
#[must_use]
pub fn build_cb_url(callback_base: &str, rid: Uuid, callback_template: Option<&str>) -> String {
    let base = format!("{}/cb?rid={rid}", callback_base.trim_end_matches('/'));
    let Some(tmpl) = callback_template else {
        return base;
    };
    if tmpl.is_empty() {
        return base;
    }
    match Url::parse(tmpl) {
        Ok(parsed) => match parsed.query() {
            Some(q) if !q.is_empty() => format!("{base}&{q}"),
            _ => base,
        },
        Err(_) => base,
    }
}

fn build_ctx(udm: &Udm) -> ExprValue {
    let udm_json = ExprValue::from_json(udm.to_json());
    let meta = ExprValue::Map(
        [
            ("ip".to_owned(), ExprValue::String(udm.net.ip.clone())),
            ("ua".to_owned(), ExprValue::String(udm.net.ua.clone())),
        ]
        .into_iter()
        .collect(),
    );
    ExprValue::Map(
        [
            ("udm".to_owned(), udm_json.clone()),
            ("body".to_owned(), udm_json),
            ("meta".to_owned(), meta),
        ]
        .into_iter()
        .collect(),
    )
}

fn value_to_json(v: &ExprValue) -> serde_json::Value {
    match v {
        ExprValue::Null => serde_json::Value::Null,
        ExprValue::Bool(b) => serde_json::Value::Bool(*b),
        ExprValue::Int(i) => serde_json::json!(i),
        ExprValue::Float(f) => serde_json::json!(f),
        ExprValue::String(s) => serde_json::Value::String(s.clone()),
        ExprValue::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        ExprValue::Map(m) => serde_json::Value::Object(
            m.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect(),
        ),
    }
}

/// Outcome of one outbound dispatch attempt, prior to persistence.
pub struct DispatchOutcome {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Send one click/imp event to `upstream`'s outbound adapter for
/// `event_type`, then persist a `RequestLog` row. Returns `200` (with
/// `"no_adapter"`) when the upstream has no adapter configured for this
/// event type -- that's a configuration gap, not a delivery failure.
#[instrument(skip(client, store, upstream, udm, route_custom_params), fields(rid = %rid, upstream = %upstream.id, event_type))]
#[allow(clippy::too_many_arguments)]
pub async fn dispatch_to_upstream(
    client: &reqwest::Client,
    store: &Arc<dyn RequestLogStore>,
    rid: Uuid,
    udm: &Udm,
    upstream: &Upstream,
    event_type: &str,
    callback_base: &str,
    callback_template: Option<&str>,
    route_custom_params: &HashMap<String, String>,
) -> DispatchOutcome {
    let Some(adapter) = upstream.adapters.outbound.get(event_type) else {
        warn!(upstream = %upstream.id, event_type, "no outbound adapter configured");
        return DispatchOutcome {
            status: 200,
            body: serde_json::json!({"msg": "no_adapter"}),
        };
    };

    let mut secrets = upstream.secrets.clone();
    secrets.extend(route_custom_params.clone());

    let cb_url = build_cb_url(callback_base, rid, callback_template);
    let ctx = build_ctx(udm);

    let url = render_template(&adapter.url, &adapter.macros, &ctx, &secrets, &cb_url);

    let body = adapter
        .body
        .as_ref()
        .map(|tmpl| value_to_json(&eval_body_template(&ExprValue::from_json(tmpl.clone()), &ctx, &secrets, &cb_url)));

    let empty_headers = HashMap::new();
    let headers = adapter.headers.as_ref().unwrap_or(&empty_headers);

    let (status, response) = http_send_with_retry(
        client,
        &adapter.method,
        &url,
        headers,
        body.as_ref(),
        adapter.timeout_ms,
        adapter.retry.max,
        adapter.retry.backoff_ms,
    )
    .await;

    persist_request_log(store, rid, udm, &url, callback_template, status).await;

    DispatchOutcome { status, body: response }
}

async fn persist_request_log(
    store: &Arc<dyn RequestLogStore>,
    rid: Uuid,
    udm: &Udm,
    upstream_url: &str,
    callback_template: Option<&str>,
    status: u16,
) {
    let log = RequestLog {
        rid,
        ds_id: udm.meta.downstream_id.clone(),
        up_id: udm.meta.upstream_id.clone(),
        event_type: udm.event.event_type.map(|e| e.as_str().to_owned()),
        ad_id: udm.ad.ad_id.clone(),
        channel_id: udm.ad.channel_id.clone(),
        ts: udm.time.ts,
        os: udm.device.os.clone(),
        upload_params: serde_json::json!({
            "query": udm.to_json(),
            "callback_template": callback_template,
        }),
        callback_params: None,
        upstream_url: Some(upstream_url.to_owned()),
        downstream_url: None,
        track_time: Utc::now(),
        track_status: TrackStatus::from_upstream_status(status),
        is_callback_sent: CallbackSentStatus::Pending,
        callback_time: None,
        callback_event_type: None,
    };

    if let Err(e) = store.insert(log).await {
        warn!(rid = %rid, error = %e, "failed to persist request log");
    }
}

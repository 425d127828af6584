//! The `GET /v1/track` entrypoint (spec.md §4.8): clean, validate,
//! assemble a UDM, route, and either submit to the debounce manager or
//! dispatch straight to the upstream.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tracing::{instrument, warn};
use uuid::Uuid;

use adrelay_core::router::{choose_route, first_matching_rule};
use adrelay_core::udm::EventType;
use adrelay_core::{EventLog, Udm};
use adrelay_debounce::DebounceJob;
use adrelay_forwarder::dispatch_to_upstream;

use crate::gateway::Gateway;
use crate::response::GatewayResponse;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^__.+__$").expect("valid regex"));

/// Blank out a value that's still an unresolved `__PLACEHOLDER__` macro,
/// per spec.md §4.8 step 1.
fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| if PLACEHOLDER_RE.is_match(&v) { String::new() } else { v })
}

/// Raw `GET /v1/track` query parameters, one field per parameter the
/// original `track.py` accepts.
#[derive(Debug, Clone, Default)]
pub struct TrackParams {
    pub ds_id: Option<String>,
    pub event_type: Option<String>,
    pub click_id: Option<String>,
    pub ad_id: Option<String>,
    pub channel_id: Option<String>,
    pub ts: Option<String>,
    pub ip: Option<String>,
    pub ua: Option<String>,
    pub device_os: Option<String>,
    pub device_model: Option<String>,
    pub device_idfa: Option<String>,
    pub device_caid: Option<String>,
    pub device_oaid: Option<String>,
    pub device_imei: Option<String>,
    pub device_android_id: Option<String>,
    pub os_version: Option<String>,
    pub device_mac: Option<String>,
    pub user_phone_md5: Option<String>,
    pub user_email_sha256: Option<String>,
    pub ext_custom_id: Option<String>,
    pub callback: Option<String>,
}

/// Priority-list device key used to coalesce debounce windows per-device,
/// per spec.md §4.8 step 8.
fn device_key(udm: &Udm) -> String {
    let d = &udm.device;
    for (field, val) in [
        ("idfa", &d.idfa),
        ("oaid", &d.oaid),
        ("imei", &d.imei),
        ("android_id", &d.android_id),
        ("caid", &d.caid),
    ] {
        if let Some(v) = val {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                return format!("{field}:{}", trimmed.to_lowercase());
            }
        }
    }

    if !udm.net.ip.is_empty() || !udm.net.ua.is_empty() || d.os.is_some() {
        let os = d.os.as_deref().unwrap_or("");
        return format!("ipuaos:{}|{}|{os}", udm.net.ip, udm.net.ua).to_lowercase();
    }

    "unknown".to_owned()
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl Gateway {
    /// Implements spec.md §4.8's ten-step pipeline.
    #[instrument(skip(self, params))]
    pub async fn handle_track(&self, params: TrackParams) -> GatewayResponse {
        let ds_id = clean(params.ds_id).unwrap_or_default();
        let event_type_raw = clean(params.event_type).unwrap_or_default();
        let click_id = clean(params.click_id);
        let ad_id = clean(params.ad_id);
        let channel_id = clean(params.channel_id);
        let ts_raw = clean(params.ts).filter(|s| !s.is_empty());
        let ip = clean(params.ip).unwrap_or_default();
        let ua = clean(params.ua).unwrap_or_default();
        let device_os = clean(params.device_os);
        let device_model = clean(params.device_model);
        let device_idfa = clean(params.device_idfa);
        let device_caid = clean(params.device_caid);
        let device_oaid = clean(params.device_oaid);
        let device_imei = clean(params.device_imei);
        let device_android_id = clean(params.device_android_id);
        let os_version = clean(params.os_version);
        let device_mac = clean(params.device_mac);
        let user_phone_md5 = clean(params.user_phone_md5);
        let user_email_sha256 = clean(params.user_email_sha256);
        let ext_custom_id = clean(params.ext_custom_id);
        let callback_raw = clean(params.callback).filter(|s| !s.is_empty());

        if ds_id.is_empty() {
            return GatewayResponse::new(false, 400, "missing ds_id");
        }
        let Some(event_type) = EventType::parse(&event_type_raw) else {
            return GatewayResponse::new(false, 400, "invalid event_type");
        };

        let ts = match ts_raw {
            Some(s) => match s.parse::<i64>() {
                Ok(v) => Some(v),
                Err(_) => return GatewayResponse::new(false, 400, "invalid ts"),
            },
            None => None,
        };

        let trace_id = Uuid::new_v4();

        let mut udm = Udm::default();
        udm.event.event_type = Some(event_type);
        udm.click.id = click_id;
        udm.click.source = Some(ds_id.clone());
        udm.ad.ad_id = ad_id.clone();
        udm.ad.channel_id = channel_id;
        udm.device.os = device_os;
        udm.device.model = device_model;
        udm.device.idfa = device_idfa;
        udm.device.caid = device_caid;
        udm.device.oaid = device_oaid;
        udm.device.imei = device_imei;
        udm.device.android_id = device_android_id;
        udm.device.os_version = os_version;
        udm.device.mac = device_mac;
        udm.user.phone_md5 = user_phone_md5;
        udm.user.email_sha256 = user_email_sha256;
        udm.net.ip = ip.clone();
        udm.net.ua = ua.clone();
        udm.time.ts = Some(ts.unwrap_or_else(now_ms));
        udm.meta.downstream_id = Some(ds_id.clone());
        if let Some(custom) = ext_custom_id {
            udm.meta
                .ext
                .insert("custom_id".to_owned(), serde_json::Value::String(custom));
        }

        // `callback` is percent-decoded once and kept as-is; its own query
        // string is later appended to the upstream's `cb_url()` by the
        // forwarder (spec.md §4.6 step 3).
        let callback_template = callback_raw.map(|raw| {
            percent_encoding::percent_decode_str(&raw)
                .decode_utf8()
                .map(std::borrow::Cow::into_owned)
                .unwrap_or(raw)
        });

        let config = &self.config;
        let rule = first_matching_rule(config, &udm);

        let Some(decision) = choose_route(&udm, config).filter(|d| d.enabled) else {
            return GatewayResponse::new(false, 400, "link closed");
        };
        udm.meta.upstream_id = Some(decision.upstream_id.clone());

        self.spawn_event_log(trace_id, &udm, &ip, &ua);

        let custom_params = rule.map(|r| r.custom_params.clone()).unwrap_or_default();
        let rule_debounce = rule.and_then(|r| r.debounce).unwrap_or(true);
        let debounce_enabled = config.settings.debounce.enabled && rule_debounce;

        if debounce_enabled {
            if let Some(manager) = self.debounce.clone() {
                let key = format!(
                    "{}:{}:{}",
                    decision.upstream_id,
                    ad_id.as_deref().unwrap_or(""),
                    device_key(&udm)
                );
                let client_ts = ts.unwrap_or_else(now_ms);
                let order_ts_ms = client_ts.max(now_ms());
                let max_wait_ms = config.settings.debounce.max_wait_ms;
                let submit_timeout_ms = config.settings.debounce.submit_timeout_ms;
                let route_params = serde_json::to_value(&custom_params).unwrap_or_default();
                let job = DebounceJob {
                    trace_id: trace_id.to_string(),
                    udm: udm.clone(),
                    upstream_id: decision.upstream_id.clone(),
                    event_type: event_type.as_str().to_owned(),
                    callback_template: callback_template.clone().unwrap_or_default(),
                    route_params,
                };

                let submit_key = key.clone();
                let submit_fut = manager.submit_job(&key, order_ts_ms, max_wait_ms, job.clone());
                match tokio::time::timeout(Duration::from_millis(submit_timeout_ms), submit_fut).await {
                    Ok(()) => {}
                    Err(_) => {
                        warn!(key = %submit_key, "debounce submit exceeded front-end timeout, rescheduling in background");
                        tokio::spawn(async move {
                            manager.submit_job(&submit_key, order_ts_ms, max_wait_ms, job).await;
                        });
                    }
                }

                return GatewayResponse::ok();
            }
        }

        let Some(upstream) = config.find_upstream(&decision.upstream_id) else {
            warn!(upstream_id = %decision.upstream_id, "route resolved to an unknown upstream");
            return GatewayResponse::new(false, 500, "upstream_not_found");
        };

        let outcome = dispatch_to_upstream(
            &self.client,
            &self.request_log,
            trace_id,
            &udm,
            upstream,
            event_type.as_str(),
            &config.settings.callback_base,
            callback_template.as_deref(),
            &custom_params,
        )
        .await;

        if outcome.status == 200 {
            GatewayResponse::ok()
        } else {
            GatewayResponse::new(false, 500, "upstream_error")
        }
    }

    /// Fire-and-forget idempotent audit trail of this inbound track call
    /// (SPEC_FULL.md §4.11). Never fails the request.
    fn spawn_event_log(&self, trace_id: Uuid, udm: &Udm, ip: &str, ua: &str) {
        let store = Arc::clone(&self.event_log);
        let log = EventLog {
            day: EventLog::today(),
            trace_id: trace_id.to_string(),
            ds_id: udm.meta.downstream_id.clone(),
            up_id: udm.meta.upstream_id.clone(),
            event_type: udm.event.event_type.map(|e| e.as_str().to_owned()),
            click_id: udm.click.id.clone(),
            ad_id: udm.ad.ad_id.clone(),
            ts: udm.time.ts,
            ip: ip.to_owned(),
            ua: ua.to_owned(),
            payload: udm.to_json(),
            created_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = store.insert_event_log(log).await {
                warn!(error = %e, "failed to persist event log");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_key_prefers_idfa_over_everything() {
        let mut udm = Udm::default();
        udm.device.idfa = Some(" ABCD-1234 ".into());
        udm.device.oaid = Some("should-not-be-used".into());
        assert_eq!(device_key(&udm), "idfa:abcd-1234");
    }

    #[test]
    fn device_key_falls_back_to_ip_ua_os() {
        let mut udm = Udm::default();
        udm.net.ip = "1.2.3.4".into();
        udm.net.ua = "Mozilla/5.0".into();
        udm.device.os = Some("iOS".into());
        assert_eq!(device_key(&udm), "ipuaos:1.2.3.4|mozilla/5.0|ios");
    }

    #[test]
    fn device_key_unknown_when_nothing_present() {
        let udm = Udm::default();
        assert_eq!(device_key(&udm), "unknown");
    }

    #[test]
    fn placeholder_values_are_blanked() {
        assert_eq!(clean(Some("__DS__".into())), Some(String::new()));
        assert_eq!(clean(Some("real-value".into())), Some("real-value".into()));
        assert_eq!(clean(None), None);
    }
}

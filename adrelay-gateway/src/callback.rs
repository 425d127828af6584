//! The `GET /cb` callback handler (spec.md §4.7): correlate, verify,
//! remap, whitelist-check, throttle, and dispatch an upstream-supplied
//! conversion callback to its downstream.
//!
//! `rid` is taken as already-parsed input -- a missing or unparseable
//! `rid` query parameter is a transport-layer concern the server handles
//! before reaching the gateway (spec.md §6: "missing rid -> 500").

use std::collections::HashMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value as Json;
use sha2::Sha256;
use tracing::{instrument, warn};
use uuid::Uuid;

use adrelay_core::config::{CallbackEventsSpec, VerifyConfig};
use adrelay_core::router::{choose_route, first_matching_rule, should_throttle};
use adrelay_core::{CallbackSentStatus, RequestLogUpdate, Udm};
use adrelay_expr::macros::{apply_macros, build_macro_map, clean_event_name};
use adrelay_expr::{eval_expr, Value as ExprValue};
use adrelay_forwarder::http_send_with_retry;

use crate::gateway::Gateway;
use crate::response::GatewayResponse;

/// Raw `GET /cb` request: query parameters, an optional JSON body, and
/// transport-level `ip`/`ua` (never taken from the callback's own content).
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub query: HashMap<String, String>,
    pub body: Option<Json>,
    pub ip: String,
    pub ua: String,
}

/// XOR-fold comparison that doesn't short-circuit on the first mismatched
/// byte, used for signature comparison.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn verify_signature(verify: &VerifyConfig, ctx: &ExprValue, secrets: &HashMap<String, String>) -> bool {
    if verify.verify_type != "hmac_sha256" {
        return false;
    }
    let secret = secrets.get(&verify.secret_ref).cloned().unwrap_or_default();
    let actual = eval_expr(&verify.signature, ctx, secrets, "");
    let message = eval_expr(&verify.message, ctx, secrets, "");
    let (Some(actual), Some(message)) = (actual.as_display(), message.as_display()) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(message.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&actual, &expected)
}

fn value_to_json(v: &ExprValue) -> Json {
    match v {
        ExprValue::Null => Json::Null,
        ExprValue::Bool(b) => Json::Bool(*b),
        ExprValue::Int(i) => serde_json::json!(i),
        ExprValue::Float(f) => serde_json::json!(f),
        ExprValue::String(s) => Json::String(s.clone()),
        ExprValue::List(items) => Json::Array(items.iter().map(value_to_json).collect()),
        ExprValue::Map(m) => Json::Object(m.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect()),
    }
}

fn set_path(root: &mut Json, path: &str, value: Json) {
    let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
    let Some((last, init)) = parts.split_last() else {
        return;
    };
    let mut cur = root;
    for part in init {
        if !cur.get(*part).is_some_and(Json::is_object) {
            cur[*part] = serde_json::json!({});
        }
        cur = &mut cur[*part];
    }
    cur[*last] = value;
}

fn default_udm_skeleton() -> Json {
    serde_json::json!({
        "event": {}, "click": {}, "ad": {}, "device": {}, "user": {},
        "net": {}, "time": {}, "meta": {"ext": {}},
    })
}

/// Apply `field_map` entries (`"udm.<path>": "<expr>"`) against `ctx` to
/// build a new UDM, per spec.md §4.7 step 4.
fn map_inbound_fields(field_map: &HashMap<String, String>, ctx: &ExprValue, secrets: &HashMap<String, String>) -> Udm {
    let mut skeleton = default_udm_skeleton();
    for (path, expr) in field_map {
        let Some(rest) = path.strip_prefix("udm.") else {
            continue;
        };
        let value = eval_expr(expr, ctx, secrets, "");
        set_path(&mut skeleton, rest, value_to_json(&value));
    }
    serde_json::from_value(skeleton).unwrap_or_default()
}

fn build_ctx(query: &HashMap<String, String>, body: &Option<Json>, ip: &str, ua: &str) -> ExprValue {
    let query_map: HashMap<String, ExprValue> = query
        .iter()
        .map(|(k, v)| (k.clone(), ExprValue::String(v.clone())))
        .collect();
    let body_value = body
        .clone()
        .map(ExprValue::from_json)
        .unwrap_or_else(|| ExprValue::Map(HashMap::new()));
    let meta = ExprValue::Map(
        [
            ("ip".to_owned(), ExprValue::String(ip.to_owned())),
            ("ua".to_owned(), ExprValue::String(ua.to_owned())),
        ]
        .into_iter()
        .collect(),
    );
    ExprValue::Map(
        [
            ("query".to_owned(), ExprValue::Map(query_map)),
            ("body".to_owned(), body_value),
            ("meta".to_owned(), meta),
        ]
        .into_iter()
        .collect(),
    )
}

/// Outcome of matching `event_name` against a rule's per-link whitelist.
enum Whitelist {
    Allow(String),
    Deny,
}

fn check_whitelist(spec: Option<&CallbackEventsSpec>, event_name: &str) -> Whitelist {
    let normalized = clean_event_name(event_name);
    match spec {
        None => Whitelist::Deny,
        Some(CallbackEventsSpec::List(list)) => {
            if list.iter().any(|e| clean_event_name(e) == normalized) {
                Whitelist::Allow(event_name.to_owned())
            } else {
                Whitelist::Deny
            }
        }
        Some(CallbackEventsSpec::Map(map)) => map
            .iter()
            .find(|(k, _)| clean_event_name(k) == normalized)
            .map_or(Whitelist::Deny, |(_, dst)| Whitelist::Allow(dst.clone())),
        Some(CallbackEventsSpec::Single(s)) => {
            if clean_event_name(s) == normalized {
                Whitelist::Allow(event_name.to_owned())
            } else {
                Whitelist::Deny
            }
        }
    }
}

impl Gateway {
    /// Implements spec.md §4.7's twelve-step pipeline.
    #[instrument(skip(self, params), fields(%rid))]
    pub async fn handle_callback(&self, rid: Uuid, params: CallbackParams) -> GatewayResponse {
        if !self.config.settings.routing_enabled {
            return GatewayResponse::ok();
        }

        let row = match self.request_log.find_by_rid(rid).await {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "failed to look up request log for callback");
                None
            }
        };

        let ctx = build_ctx(&params.query, &params.body, &params.ip, &params.ua);

        let up_id = row.as_ref().and_then(|r| r.up_id.clone());
        let ds_id = row.as_ref().and_then(|r| r.ds_id.clone());
        let callback_template = row
            .as_ref()
            .and_then(|r| r.upload_params.get("callback_template"))
            .and_then(Json::as_str)
            .map(str::to_owned);

        let mut udm = Udm::default();
        udm.meta.upstream_id = up_id.clone();
        udm.meta.downstream_id = ds_id.clone();

        if let Some(upstream) = up_id.as_deref().and_then(|id| self.config.find_upstream(id)) {
            if let Some(adapter) = adrelay_core::config::inbound_adapter(upstream, "event") {
                let secrets = &upstream.secrets;

                if let Some(verify) = &adapter.verify {
                    if !verify_signature(verify, &ctx, secrets) {
                        return GatewayResponse::new(false, 500, "invalid signature");
                    }
                }

                if !adapter.field_map.is_empty() {
                    let mapped = map_inbound_fields(&adapter.field_map, &ctx, secrets);
                    udm.event = mapped.event;
                    udm.click = mapped.click;
                    udm.ad = mapped.ad;
                    udm.device = mapped.device;
                    udm.user = mapped.user;
                    udm.meta.amount = mapped.meta.amount;
                    udm.meta.days = mapped.meta.days;
                    udm.meta.ext = mapped.meta.ext;
                }

                if let Some(event_name_map) = &adapter.event_name_map {
                    let current = udm.event.name.clone().unwrap_or_default();
                    let normalized_current = clean_event_name(&current);
                    if let Some((_, dst)) = event_name_map
                        .iter()
                        .find(|(k, _)| clean_event_name(k) == normalized_current)
                    {
                        udm.meta.original_event_name = Some(current);
                        udm.event.name = Some(dst.clone());
                    }
                }
            }
        }

        let routing_udm = {
            let mut r = Udm::default();
            if let Some(row) = &row {
                let query = row.upload_params.get("query");
                r.ad.ad_id = query
                    .and_then(|q| q.get("ad"))
                    .and_then(|a| a.get("ad_id"))
                    .and_then(Json::as_str)
                    .map(str::to_owned);
                r.ad.campaign_id = query
                    .and_then(|q| q.get("ad"))
                    .and_then(|a| a.get("campaign_id"))
                    .and_then(Json::as_str)
                    .map(str::to_owned);
            }
            r.meta.downstream_id = ds_id.clone();
            r
        };

        let rule = first_matching_rule(&self.config, &routing_udm);
        let throttle_rate = choose_route(&routing_udm, &self.config).map_or(0.0, |d| d.throttle);

        let event_name = udm.event.name.clone().unwrap_or_default();
        let whitelist = check_whitelist(rule.and_then(|r| r.callback_events.as_ref()), &event_name);

        let final_event_name = match whitelist {
            Whitelist::Deny => {
                self.update_row(
                    rid,
                    RequestLogUpdate {
                        callback_params: Some(serde_json::json!({"query": params.query, "body": params.body})),
                        downstream_url: Some(None),
                        is_callback_sent: Some(CallbackSentStatus::NotInWhitelist),
                        callback_time: Some(Some(Utc::now())),
                        callback_event_type: Some(Some(event_name)),
                    },
                )
                .await;
                return GatewayResponse::ok();
            }
            Whitelist::Allow(name) => name,
        };
        udm.event.name = Some(final_event_name.clone());

        let final_downstream_url = callback_template.as_deref().map(|tmpl| {
            let macros = build_macro_map(&udm);
            apply_macros(tmpl, &macros)
        });

        self.update_row(
            rid,
            RequestLogUpdate {
                callback_params: Some(serde_json::json!({"query": params.query, "body": params.body})),
                downstream_url: Some(final_downstream_url.clone()),
                is_callback_sent: Some(CallbackSentStatus::Pending),
                callback_time: None,
                callback_event_type: Some(Some(final_event_name)),
            },
        )
        .await;

        let Some(final_url) = final_downstream_url else {
            return GatewayResponse::ok();
        };

        if should_throttle(&rid.to_string(), throttle_rate) {
            self.update_row(
                rid,
                RequestLogUpdate {
                    is_callback_sent: Some(CallbackSentStatus::Throttled),
                    callback_time: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await;
            return GatewayResponse::ok();
        }

        let (status, _) =
            http_send_with_retry(&self.client, "GET", &final_url, &HashMap::new(), None, 5000, 3, 300).await;

        if status == 200 {
            self.update_row(
                rid,
                RequestLogUpdate {
                    is_callback_sent: Some(CallbackSentStatus::Sent),
                    callback_time: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await;
            GatewayResponse::ok()
        } else {
            self.update_row(
                rid,
                RequestLogUpdate {
                    is_callback_sent: Some(CallbackSentStatus::DownstreamFailed),
                    callback_time: Some(Some(Utc::now())),
                    ..Default::default()
                },
            )
            .await;
            GatewayResponse::new(false, 500, "downstream_failed")
        }
    }

    async fn update_row(&self, rid: Uuid, update: RequestLogUpdate) {
        if let Err(e) = self.request_log.update_by_rid(rid, update).await {
            warn!(%rid, error = %e, "failed to update request log for callback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_list_matches_after_normalization() {
        let spec = CallbackEventsSpec::List(vec!["install".into(), "purchase".into()]);
        match check_whitelist(Some(&spec), "INSTALLED") {
            Whitelist::Allow(name) => assert_eq!(name, "INSTALLED"),
            Whitelist::Deny => panic!("expected allow"),
        }
    }

    #[test]
    fn whitelist_map_renames_to_destination() {
        let mut map = HashMap::new();
        map.insert("purchase".to_owned(), "PAID_EVENT".to_owned());
        let spec = CallbackEventsSpec::Map(map);
        match check_whitelist(Some(&spec), "PURCHASE") {
            Whitelist::Allow(name) => assert_eq!(name, "PAID_EVENT"),
            Whitelist::Deny => panic!("expected allow"),
        }
    }

    #[test]
    fn whitelist_absent_denies() {
        assert!(matches!(check_whitelist(None, "anything"), Whitelist::Deny));
    }

    #[test]
    fn whitelist_matches_across_separator_styles() {
        let spec = CallbackEventsSpec::List(vec!["Custom-Event".into()]);
        match check_whitelist(Some(&spec), "custom_event") {
            Whitelist::Allow(name) => assert_eq!(name, "custom_event"),
            Whitelist::Deny => panic!("expected allow"),
        }
    }

    #[test]
    fn whitelist_distinguishes_entries_that_a_category_table_would_conflate() {
        let mut map = HashMap::new();
        map.insert("register".to_owned(), "REG_DST".to_owned());
        map.insert("signup".to_owned(), "SIGNUP_DST".to_owned());
        let spec = CallbackEventsSpec::Map(map);
        match check_whitelist(Some(&spec), "signup") {
            Whitelist::Allow(name) => assert_eq!(name, "SIGNUP_DST"),
            Whitelist::Deny => panic!("expected allow"),
        }
    }

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq("abc123", "abc123"));
        assert!(!constant_time_eq("abc123", "abc124"));
        assert!(!constant_time_eq("short", "longer-string"));
    }

    #[test]
    fn map_inbound_fields_sets_nested_path() {
        let mut field_map = HashMap::new();
        field_map.insert("udm.event.name".to_owned(), "const:ACTIVATED".to_owned());
        field_map.insert("udm.ad.ad_id".to_owned(), "query.ad_id".to_owned());

        let ctx = ExprValue::from_json(serde_json::json!({"query": {"ad_id": "67576"}}));
        let udm = map_inbound_fields(&field_map, &ctx, &HashMap::new());

        assert_eq!(udm.event.name.as_deref(), Some("ACTIVATED"));
        assert_eq!(udm.ad.ad_id.as_deref(), Some("67576"));
    }
}

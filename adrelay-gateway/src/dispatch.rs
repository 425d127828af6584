//! The debounced-dispatch path: implements [`adrelay_debounce::JobDispatcher`]
//! so the debounce manager can hand a coalesced [`DebounceJob`] back to the
//! gateway without depending on the router or forwarder directly.
//!
//! Grounded on `original_source/app/services/forwarder.py::dispatch_click_job`:
//! before sending, the route is re-checked against the *current* config
//! (SPEC_FULL.md §4.10) since it may have changed while the job sat in the
//! debounce window. The original returns `200, {"msg": "route_disabled_drop"}`
//! in that case; `JobDispatcher::dispatch` has no response channel to return
//! through, so this just logs and returns.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use adrelay_core::router::choose_route;
use adrelay_core::{AppConfig, Udm};
use adrelay_debounce::{DebounceJob, JobDispatcher};
use adrelay_forwarder::dispatch_to_upstream;
use adrelay_state::RequestLogStore;

/// Re-checks routing for a debounced job, then delegates to
/// [`dispatch_to_upstream`] for everything else.
pub struct GatewayDispatcher {
    config: Arc<AppConfig>,
    store: Arc<dyn RequestLogStore>,
    client: reqwest::Client,
}

impl GatewayDispatcher {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn RequestLogStore>, client: reqwest::Client) -> Self {
        Self { config, store, client }
    }

    /// Reconstruct the minimal routing UDM a debounced job carries, per
    /// `forwarder.py::dispatch_click_job`'s `routing_udm` (just `ad` and
    /// `meta.downstream_id`, not the full event).
    fn routing_udm(job: &DebounceJob) -> Udm {
        let mut udm = Udm::default();
        udm.ad = job.udm.ad.clone();
        udm.meta.downstream_id = job.udm.meta.downstream_id.clone();
        udm
    }
}

#[async_trait]
impl JobDispatcher for GatewayDispatcher {
    async fn dispatch(&self, job: DebounceJob) {
        let routing_udm = Self::routing_udm(&job);
        let current = choose_route(&routing_udm, &self.config);

        let dropped = match &current {
            None => true,
            Some(decision) => !decision.enabled || decision.upstream_id != job.upstream_id,
        };
        if dropped {
            warn!(
                job_upstream = %job.upstream_id,
                current_upstream = current.as_ref().map(|d| d.upstream_id.as_str()).unwrap_or(""),
                enabled = current.as_ref().is_some_and(|d| d.enabled),
                "route_disabled_drop"
            );
            return;
        }

        let Ok(rid) = Uuid::parse_str(&job.trace_id) else {
            warn!(trace_id = %job.trace_id, "debounced job carries an unparseable trace_id, dropping");
            return;
        };

        let Some(upstream) = self.config.find_upstream(&job.upstream_id) else {
            warn!(upstream_id = %job.upstream_id, "debounced job references an unknown upstream, dropping");
            return;
        };

        let route_params: HashMap<String, String> =
            serde_json::from_value(job.route_params.clone()).unwrap_or_default();
        let callback_template = (!job.callback_template.is_empty()).then_some(job.callback_template.as_str());

        dispatch_to_upstream(
            &self.client,
            &self.store,
            rid,
            &job.udm,
            upstream,
            &job.event_type,
            &self.config.settings.callback_base,
            callback_template,
            &route_params,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Map;

    use adrelay_core::config::{AdapterDirections, Settings};
    use adrelay_core::Upstream;
    use adrelay_state_memory::MemoryRequestLogStore;

    use super::*;

    fn config_with_route(enabled: bool) -> Arc<AppConfig> {
        use adrelay_core::config::{MatchKey, Route, RouteRule};

        Arc::new(AppConfig {
            settings: Settings {
                callback_base: "https://cb.example.com".into(),
                timezone: None,
                app_secret: None,
                routing_enabled: true,
                debounce: Default::default(),
                redis: Default::default(),
            },
            upstreams: vec![Upstream {
                id: "up1".into(),
                name: None,
                secrets: Map::new(),
                adapters: AdapterDirections::default(),
            }],
            downstreams: vec![],
            routes: vec![Route {
                match_key: MatchKey::AdId,
                rules: vec![RouteRule {
                    equals: "67576".into(),
                    upstream: "up1".into(),
                    downstream: "ds1".into(),
                    enabled,
                    throttle: 0.0,
                    callback_events: None,
                    custom_params: Map::new(),
                    debounce: None,
                }],
                fallback_upstream: None,
                fallback_downstream: None,
                fallback_enabled: true,
                fallback_throttle: 0.0,
            }],
        })
    }

    fn job(upstream_id: &str, ad_id: &str) -> DebounceJob {
        let mut udm = Udm::default();
        udm.ad.ad_id = Some(ad_id.to_owned());
        DebounceJob {
            trace_id: Uuid::new_v4().to_string(),
            udm,
            upstream_id: upstream_id.to_owned(),
            event_type: "click".into(),
            callback_template: String::new(),
            route_params: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn drops_silently_when_rule_now_disabled() {
        let config = config_with_route(false);
        let store: Arc<dyn RequestLogStore> = Arc::new(MemoryRequestLogStore::default());
        let dispatcher = GatewayDispatcher::new(config, Arc::clone(&store), reqwest::Client::new());

        dispatcher.dispatch(job("up1", "67576")).await;

        // No upstream was ever reachable in this test, so the only way to
        // observe the drop is that nothing attempted persistence either.
        assert!(store
            .find_by_rid(Uuid::nil())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn drops_when_unparseable_trace_id() {
        let config = config_with_route(true);
        let store: Arc<dyn RequestLogStore> = Arc::new(MemoryRequestLogStore::default());
        let dispatcher = GatewayDispatcher::new(config, store, reqwest::Client::new());

        let mut bad_job = job("up1", "67576");
        bad_job.trace_id = "not-a-uuid".into();
        dispatcher.dispatch(bad_job).await;
    }
}

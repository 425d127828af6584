//! Route resolution and throttle scoring.
//!
//! Grounded on `original_source/app/services/router.py::choose_route` and
//! `calculate_throttle_score`/`should_throttle_callback`, restated as a
//! 4-tuple decision per spec.md §9's Open Question resolution (the
//! original 2-tuple dropped `enabled`/`throttle` into ad-hoc follow-up
//! lookups; here they travel with the match).

use md5::{Digest, Md5};

use crate::config::{AppConfig, MatchKey, Route, RouteRule};
use crate::udm::Udm;

/// Outcome of matching a `Udm` against a `Route`'s rules.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub upstream_id: String,
    pub downstream_id: String,
    pub enabled: bool,
    pub throttle: f64,
}

fn match_key_value<'a>(udm: &'a Udm, key: MatchKey) -> Option<&'a str> {
    match key {
        MatchKey::AdId => udm.ad.ad_id.as_deref(),
        MatchKey::CampaignId => udm.ad.campaign_id.as_deref(),
    }
}

/// Find the first rule whose `equals` matches the route's configured key
/// field on this event.
#[must_use]
pub fn find_matching_rule<'a>(route: &'a Route, udm: &Udm) -> Option<&'a RouteRule> {
    let value = match_key_value(udm, route.match_key)?;
    route.rules.iter().find(|r| r.equals == value)
}

/// Find the first matching rule across every configured route, in order.
/// Callers that need the matched `RouteRule` itself (e.g. for its
/// `callback_events` whitelist) rather than a resolved [`RouteDecision`]
/// use this instead of inspecting `config.routes.first()` alone.
#[must_use]
pub fn first_matching_rule<'a>(config: &'a AppConfig, udm: &Udm) -> Option<&'a RouteRule> {
    config.routes.iter().find_map(|route| find_matching_rule(route, udm))
}

/// Resolve an event to its upstream/downstream pairing. Scans every
/// configured `Route` in order for the first matching rule (spec.md §4.4
/// step 1: a config may carry more than one route, e.g. one keyed on
/// `ad_id` and another on `campaign_id`), falling back to the first
/// route's fallback fields only once no route's rules matched at all
/// (spec.md §4.4 step 2). Returns `None` if there are no routes
/// configured, or the matched/fallback upstream reference is dangling
/// (caller treats this as a drop, per spec.md §4.8 step 5).
#[must_use]
pub fn choose_route(udm: &Udm, config: &AppConfig) -> Option<RouteDecision> {
    for route in &config.routes {
        if let Some(rule) = find_matching_rule(route, udm) {
            return Some(RouteDecision {
                upstream_id: rule.upstream.clone(),
                downstream_id: rule.downstream.clone(),
                enabled: rule.enabled,
                throttle: rule.throttle,
            });
        }
    }

    let route = config.routes.first()?;
    let upstream_id = route.fallback_upstream.clone()?;
    let downstream_id = route.fallback_downstream.clone()?;
    Some(RouteDecision {
        upstream_id,
        downstream_id,
        enabled: route.fallback_enabled,
        throttle: route.fallback_throttle,
    })
}

/// Deterministic throttle score in `[0, 1)`: the first 8 bytes of
/// `md5(rid)` read as a big-endian `u64`, divided by `2^64`. Matches
/// `original_source/app/services/router.py::calculate_throttle_score`
/// exactly so the same `rid` always lands on the same side of the cut,
/// independent of process or host.
#[must_use]
pub fn throttle_score(rid: &str) -> f64 {
    let digest = Md5::digest(rid.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    let n = u64::from_be_bytes(buf);
    (n as f64) / (u64::MAX as f64 + 1.0)
}

/// `true` if this `rid` falls within the throttled fraction `rate`
/// (`0.0` = never throttle, `1.0` = always throttle).
#[must_use]
pub fn should_throttle(rid: &str, rate: f64) -> bool {
    if rate <= 0.0 {
        return false;
    }
    if rate >= 1.0 {
        return true;
    }
    throttle_score(rid) < rate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdapterDirections, Downstream, Settings, Upstream};

    fn base_config(route: Route) -> AppConfig {
        AppConfig {
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
                secrets: Default::default(),
                adapters: AdapterDirections::default(),
            }],
            downstreams: vec![Downstream {
                id: "ds1".into(),
                name: None,
            }],
            routes: vec![route],
        }
    }

    #[test]
    fn matches_rule_by_ad_id() {
        let route = Route {
            match_key: MatchKey::AdId,
            rules: vec![RouteRule {
                equals: "67576".into(),
                upstream: "up1".into(),
                downstream: "ds1".into(),
                enabled: true,
                throttle: 0.0,
                callback_events: None,
                custom_params: Default::default(),
                debounce: None,
            }],
            fallback_upstream: None,
            fallback_downstream: None,
            fallback_enabled: true,
            fallback_throttle: 0.0,
        };
        let config = base_config(route);
        let mut udm = Udm::default();
        udm.ad.ad_id = Some("67576".into());

        let decision = choose_route(&udm, &config).unwrap();
        assert_eq!(decision.upstream_id, "up1");
        assert_eq!(decision.downstream_id, "ds1");
        assert!(decision.enabled);
    }

    #[test]
    fn falls_back_when_no_rule_matches() {
        let route = Route {
            match_key: MatchKey::AdId,
            rules: vec![],
            fallback_upstream: Some("up1".into()),
            fallback_downstream: Some("ds1".into()),
            fallback_enabled: false,
            fallback_throttle: 0.5,
        };
        let config = base_config(route);
        let mut udm = Udm::default();
        udm.ad.ad_id = Some("unknown".into());

        let decision = choose_route(&udm, &config).unwrap();
        assert_eq!(decision.upstream_id, "up1");
        assert!(!decision.enabled);
        assert!((decision.throttle - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn scans_every_route_in_order() {
        let first = Route {
            match_key: MatchKey::CampaignId,
            rules: vec![RouteRule {
                equals: "c1".into(),
                upstream: "up-campaign".into(),
                downstream: "ds-campaign".into(),
                enabled: true,
                throttle: 0.0,
                callback_events: None,
                custom_params: Default::default(),
                debounce: None,
            }],
            fallback_upstream: None,
            fallback_downstream: None,
            fallback_enabled: true,
            fallback_throttle: 0.0,
        };
        let second = Route {
            match_key: MatchKey::AdId,
            rules: vec![RouteRule {
                equals: "67576".into(),
                upstream: "up-ad".into(),
                downstream: "ds-ad".into(),
                enabled: true,
                throttle: 0.0,
                callback_events: None,
                custom_params: Default::default(),
                debounce: None,
            }],
            fallback_upstream: None,
            fallback_downstream: None,
            fallback_enabled: true,
            fallback_throttle: 0.0,
        };
        let mut config = base_config(first);
        config.routes.push(second);

        let mut udm = Udm::default();
        udm.ad.ad_id = Some("67576".into());

        let decision = choose_route(&udm, &config).unwrap();
        assert_eq!(decision.upstream_id, "up-ad");
        assert_eq!(decision.downstream_id, "ds-ad");
    }

    #[test]
    fn no_route_and_no_fallback_drops() {
        let route = Route {
            match_key: MatchKey::AdId,
            rules: vec![],
            fallback_upstream: None,
            fallback_downstream: None,
            fallback_enabled: true,
            fallback_throttle: 0.0,
        };
        let config = base_config(route);
        let udm = Udm::default();
        assert!(choose_route(&udm, &config).is_none());
    }

    #[test]
    fn throttle_score_is_stable_and_in_range() {
        let s1 = throttle_score("11111111-1111-1111-1111-111111111111");
        let s2 = throttle_score("11111111-1111-1111-1111-111111111111");
        assert!((0.0..1.0).contains(&s1));
        assert!((s1 - s2).abs() < f64::EPSILON);
    }

    #[test]
    fn should_throttle_respects_boundary_rates() {
        assert!(!should_throttle("any-rid", 0.0));
        assert!(should_throttle("any-rid", 1.0));
    }
}

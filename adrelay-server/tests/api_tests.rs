use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use adrelay_core::config::{AdapterDirections, Adapter, MatchKey, Route, RouteRule, Settings};
use adrelay_core::{AppConfig, Upstream};
use adrelay_gateway::Gateway;
use adrelay_server::api::AppState;
use adrelay_state_memory::{MemoryEventLogStore, MemoryRequestLogStore};

fn test_config() -> Arc<AppConfig> {
    let mut outbound = HashMap::new();
    outbound.insert(
        "click".to_owned(),
        Adapter {
            url: "https://upstream.example.com/click".to_owned(),
            method: "GET".to_owned(),
            headers: None,
            body: None,
            macros: HashMap::new(),
            timeout_ms: 5000,
            retry: Default::default(),
            field_map: HashMap::new(),
            verify: None,
            event_name_map: None,
        },
    );

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
            secrets: HashMap::new(),
            adapters: AdapterDirections {
                outbound,
                inbound_callback: HashMap::new(),
            },
        }],
        downstreams: vec![],
        routes: vec![Route {
            match_key: MatchKey::AdId,
            rules: vec![RouteRule {
                equals: "67576".into(),
                upstream: "up1".into(),
                downstream: "ds1".into(),
                enabled: true,
                throttle: 0.0,
                callback_events: None,
                custom_params: HashMap::new(),
                debounce: None,
            }],
            fallback_upstream: None,
            fallback_downstream: None,
            fallback_enabled: true,
            fallback_throttle: 0.0,
        }],
    })
}

fn build_app() -> axum::Router {
    let gateway = Gateway::builder()
        .config(test_config())
        .request_log(Arc::new(MemoryRequestLogStore::default()))
        .event_log(Arc::new(MemoryEventLogStore::default()))
        .client(reqwest::Client::new())
        .build()
        .expect("gateway should build");

    adrelay_server::api::router(AppState {
        gateway: Arc::new(gateway),
    })
}

fn request_with_connect_info(uri: &str) -> Request<Body> {
    let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
    let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

#[tokio::test]
async fn healthz_returns_200() {
    let app = build_app();
    let response = app.oneshot(request_with_connect_info("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn openapi_json_is_served() {
    let app = build_app();
    let response = app
        .oneshot(request_with_connect_info("/openapi.json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let spec: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let paths = spec["paths"].as_object().expect("paths should be an object");
    assert!(paths.contains_key("/v1/track"), "missing /v1/track");
    assert!(paths.contains_key("/cb"), "missing /cb");
    assert!(paths.contains_key("/healthz"), "missing /healthz");
}

#[tokio::test]
async fn track_missing_ds_id_returns_400() {
    let app = build_app();
    let response = app
        .oneshot(request_with_connect_info("/v1/track?event_type=click"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn track_valid_click_dispatches_and_returns_envelope() {
    let app = build_app();
    let response = app
        .oneshot(request_with_connect_info(
            "/v1/track?ds_id=ds1&event_type=click&ad_id=67576",
        ))
        .await
        .unwrap();

    // The upstream in `test_config` is unreachable from this test process,
    // so the gateway surfaces an upstream error rather than a routing
    // rejection -- the important thing is that routing accepted the
    // request and tried to dispatch at all.
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json.get("code").is_some());
}

#[tokio::test]
async fn callback_missing_rid_returns_500() {
    let app = build_app();
    let response = app.oneshot(request_with_connect_info("/cb")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn callback_unknown_rid_degrades_gracefully() {
    let app = build_app();
    let rid = uuid::Uuid::new_v4();
    let response = app
        .oneshot(request_with_connect_info(&format!("/cb?rid={rid}")))
        .await
        .unwrap();
    // No matching request_log row and no whitelist means a deny path, but
    // the handler must still resolve with a 200 envelope rather than error.
    assert_eq!(response.status(), StatusCode::OK);
}

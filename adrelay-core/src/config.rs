//! Configuration entities: `Settings`, `Upstream`, `Adapter`, `Route`.
//! See spec.md §3 "Configuration entities" and §6.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_owned()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_max() -> u32 {
    1
}

fn default_backoff_ms() -> u64 {
    200
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_max")]
    pub max: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max: default_retry_max(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

/// Signature-verification block on an inbound callback adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyConfig {
    #[serde(rename = "type")]
    pub verify_type: String,
    pub signature: String,
    pub message: String,
    pub secret_ref: String,
}

/// Shapes accepted for `rule.callback_events` per spec.md §4.7 step 7.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CallbackEventsSpec {
    List(Vec<String>),
    Map(HashMap<String, String>),
    Single(String),
}

/// Per-(partner, direction, event-type) template and policy bundle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Adapter {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub macros: HashMap<String, String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Inbound-only: `"udm.<path>": "<expr>"` mappings.
    #[serde(default)]
    pub field_map: HashMap<String, String>,
    /// Inbound-only: signature verification block.
    #[serde(default)]
    pub verify: Option<VerifyConfig>,
    /// Inbound-only: normalise-and-rename map for `event.name`.
    #[serde(default)]
    pub event_name_map: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdapterDirections {
    /// `event_type -> Adapter` (click, imp).
    #[serde(default)]
    pub outbound: HashMap<String, Adapter>,
    /// Inbound callback adapter, keyed by event type (always `"event"` in
    /// practice, per spec.md §4.7 step 4).
    #[serde(default)]
    pub inbound_callback: HashMap<String, Adapter>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Upstream {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    #[serde(default)]
    pub adapters: AdapterDirections,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Downstream {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteRule {
    pub equals: String,
    pub upstream: String,
    pub downstream: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub throttle: f64,
    #[serde(default)]
    pub callback_events: Option<CallbackEventsSpec>,
    #[serde(default)]
    pub custom_params: HashMap<String, String>,
    /// Absent is treated as `true` (debounce participates by default),
    /// per spec.md §4.8 step 7.
    #[serde(default)]
    pub debounce: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKey {
    AdId,
    CampaignId,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Route {
    pub match_key: MatchKey,
    #[serde(default)]
    pub rules: Vec<RouteRule>,
    #[serde(default)]
    pub fallback_upstream: Option<String>,
    #[serde(default)]
    pub fallback_downstream: Option<String>,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default)]
    pub fallback_throttle: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisPoolSettings {
    #[serde(default)]
    pub socket_timeout_ms: Option<u64>,
    #[serde(default)]
    pub socket_connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: u8,
}

fn default_redis_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_redis_port() -> u16 {
    6379
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
        }
    }
}

impl RedisSettings {
    /// Build a `redis://` connection URL, matching
    /// `original_source/app/services/debounce_redis.py::build_client`.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(pw) if !pw.is_empty() => {
                format!("redis://:{pw}@{}:{}/{}", self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

fn default_max_wait_ms() -> u64 {
    20_000
}

fn default_submit_timeout_ms() -> u64 {
    50
}

fn default_batch() -> usize {
    200
}

fn default_concurrency() -> usize {
    64
}

fn default_shards() -> u32 {
    1
}

fn default_latest_ttl_ms() -> u64 {
    86_400_000
}

fn default_key_prefix() -> String {
    "debounce:".to_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DebounceSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,
    #[serde(default = "default_batch")]
    pub batch: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_shards")]
    pub shards: u32,
    #[serde(default = "default_latest_ttl_ms")]
    pub latest_ttl_ms: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default)]
    pub writer_pool: Option<RedisPoolSettings>,
    #[serde(default)]
    pub worker_pool: Option<RedisPoolSettings>,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            max_wait_ms: default_max_wait_ms(),
            submit_timeout_ms: default_submit_timeout_ms(),
            batch: default_batch(),
            concurrency: default_concurrency(),
            shards: default_shards(),
            latest_ttl_ms: default_latest_ttl_ms(),
            key_prefix: default_key_prefix(),
            writer_pool: None,
            worker_pool: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub callback_base: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Global callback-handling kill switch (spec.md §4.7 step 1). Distinct
    /// from a route rule's own `enabled` flag, which only gates that rule.
    #[serde(default = "default_true")]
    pub routing_enabled: bool,
    #[serde(default)]
    pub debounce: DebounceSettings,
    #[serde(default)]
    pub redis: RedisSettings,
}

/// Top-level, immutable configuration snapshot: `settings`, `upstreams`,
/// `downstreams`, `routes` (spec.md §6). Loaded once at startup by
/// `adrelay-config`; never mutated by request handlers (spec.md §9).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub settings: Settings,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub downstreams: Vec<Downstream>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl AppConfig {
    #[must_use]
    pub fn find_upstream(&self, id: &str) -> Option<&Upstream> {
        self.upstreams.iter().find(|u| u.id == id)
    }

    #[must_use]
    pub fn find_downstream(&self, id: &str) -> Option<&Downstream> {
        self.downstreams.iter().find(|d| d.id == id)
    }
}

/// Look up the outbound or inbound adapter for a partner + event type,
/// per `original_source/app/services/router.py::get_adapter_config`.
#[must_use]
pub fn outbound_adapter<'a>(upstream: &'a Upstream, event_type: &str) -> Option<&'a Adapter> {
    upstream.adapters.outbound.get(event_type)
}

#[must_use]
pub fn inbound_adapter<'a>(upstream: &'a Upstream, event_type: &str) -> Option<&'a Adapter> {
    upstream.adapters.inbound_callback.get(event_type)
}

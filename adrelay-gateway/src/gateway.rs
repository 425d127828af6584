//! The assembled `Gateway`: config snapshot, persistence, HTTP client, and
//! an optional debounce manager. Built through [`GatewayBuilder`], mirroring
//! `acteon-gateway`'s own builder: a consuming, fluent `Option<T>`-backed
//! struct whose `build()` fails closed on a missing mandatory dependency
//! rather than panicking.

use std::sync::Arc;

use adrelay_core::AppConfig;
use adrelay_debounce::RedisDebounceManager;
use adrelay_state::{EventLogStore, RequestLogStore};

use crate::error::GatewayError;

/// Route orchestration over a fixed configuration snapshot: the track
/// entrypoint (spec.md §4.8), the callback handler (spec.md §4.7), and
/// (via [`crate::dispatch::GatewayDispatcher`]) the debounced-dispatch path.
pub struct Gateway {
    pub(crate) config: Arc<AppConfig>,
    pub(crate) request_log: Arc<dyn RequestLogStore>,
    pub(crate) event_log: Arc<dyn EventLogStore>,
    pub(crate) client: reqwest::Client,
    pub(crate) debounce: Option<Arc<RedisDebounceManager>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .field("debounce_enabled", &self.debounce.is_some())
            .finish_non_exhaustive()
    }
}

impl Gateway {
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Fluent builder for [`Gateway`]. `config`, `request_log`, `client`, and
/// `event_log` are mandatory; `debounce` is optional (its absence means
/// every track call dispatches directly, per spec.md §4.8 step 7).
pub struct GatewayBuilder {
    config: Option<Arc<AppConfig>>,
    request_log: Option<Arc<dyn RequestLogStore>>,
    event_log: Option<Arc<dyn EventLogStore>>,
    client: Option<reqwest::Client>,
    debounce: Option<Arc<RedisDebounceManager>>,
}

impl GatewayBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            request_log: None,
            event_log: None,
            client: None,
            debounce: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: Arc<AppConfig>) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub fn request_log(mut self, store: Arc<dyn RequestLogStore>) -> Self {
        self.request_log = Some(store);
        self
    }

    #[must_use]
    pub fn event_log(mut self, store: Arc<dyn EventLogStore>) -> Self {
        self.event_log = Some(store);
        self
    }

    #[must_use]
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn debounce(mut self, manager: Arc<RedisDebounceManager>) -> Self {
        self.debounce = Some(manager);
        self
    }

    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if a mandatory dependency
    /// (`config`, `request_log`, `event_log`, or `client`) was never set.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let config = self
            .config
            .ok_or_else(|| GatewayError::Configuration("config is required".into()))?;
        let request_log = self
            .request_log
            .ok_or_else(|| GatewayError::Configuration("request log store is required".into()))?;
        let event_log = self
            .event_log
            .ok_or_else(|| GatewayError::Configuration("event log store is required".into()))?;
        let client = self
            .client
            .ok_or_else(|| GatewayError::Configuration("http client is required".into()))?;

        Ok(Gateway {
            config,
            request_log,
            event_log,
            client,
            debounce: self.debounce,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use adrelay_core::config::{AdapterDirections, Settings};
    use adrelay_core::Upstream;
    use adrelay_state_memory::{MemoryEventLogStore, MemoryRequestLogStore};

    use super::*;

    fn config() -> Arc<AppConfig> {
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
                adapters: AdapterDirections::default(),
            }],
            downstreams: vec![],
            routes: vec![],
        })
    }

    #[test]
    fn build_missing_config_returns_error() {
        let result = GatewayBuilder::new()
            .request_log(Arc::new(MemoryRequestLogStore::default()))
            .event_log(Arc::new(MemoryEventLogStore::default()))
            .client(reqwest::Client::new())
            .build();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("config is required"));
    }

    #[test]
    fn build_missing_request_log_returns_error() {
        let result = GatewayBuilder::new()
            .config(config())
            .event_log(Arc::new(MemoryEventLogStore::default()))
            .client(reqwest::Client::new())
            .build();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("request log store is required"));
    }

    #[test]
    fn build_with_required_fields_succeeds() {
        let result = GatewayBuilder::new()
            .config(config())
            .request_log(Arc::new(MemoryRequestLogStore::default()))
            .event_log(Arc::new(MemoryEventLogStore::default()))
            .client(reqwest::Client::new())
            .build();
        assert!(result.is_ok());
    }
}

//! Server-level configuration, loaded from a small TOML file distinct from
//! the business-facing YAML `adrelay-config` loads (host/port, choice of
//! persistence backend). Grounded on `acteon-server::config::ActeonConfig`.

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct AdrelayServerConfig {
    #[serde(default)]
    pub server: HttpConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// HTTP bind configuration.
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8080
}

/// Which `RequestLogStore`/`EventLogStore` implementation to construct.
#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// `"memory"` or `"postgres"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Connection URL, required for `"postgres"`.
    pub url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    pub schema: Option<String>,
    pub table_prefix: Option<String>,
    pub ssl_mode: Option<String>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            pool_size: default_pool_size(),
            schema: None,
            table_prefix: None,
            ssl_mode: None,
        }
    }
}

fn default_backend() -> String {
    "memory".to_owned()
}

fn default_pool_size() -> u32 {
    10
}

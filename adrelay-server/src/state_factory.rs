//! Construct the `RequestLogStore`/`EventLogStore` pair from [`StateConfig`].
//! Grounded on `acteon-server::state_factory::create_state`'s
//! match-on-backend-string shape.

use std::sync::Arc;

use adrelay_state::{EventLogStore, RequestLogStore};

#[cfg(feature = "postgres")]
use adrelay_state_postgres::{PostgresConfig, PostgresStore};

use crate::config::StateConfig;
use crate::error::ServerError;

pub type StatePair = (Arc<dyn RequestLogStore>, Arc<dyn EventLogStore>);

pub async fn create_state(config: &StateConfig) -> Result<StatePair, ServerError> {
    match config.backend.as_str() {
        "memory" => Ok(create_memory()),
        #[cfg(feature = "postgres")]
        "postgres" => create_postgres(config).await,
        other => Err(ServerError::Config(format!(
            "unsupported state backend: {other} (is the feature enabled?)"
        ))),
    }
}

fn create_memory() -> StatePair {
    let request_log = Arc::new(adrelay_state_memory::MemoryRequestLogStore::new());
    let event_log = Arc::new(adrelay_state_memory::MemoryEventLogStore::new());
    (request_log, event_log)
}

#[cfg(feature = "postgres")]
async fn create_postgres(config: &StateConfig) -> Result<StatePair, ServerError> {
    let url = config
        .url
        .clone()
        .ok_or_else(|| ServerError::Config("postgres backend requires 'url' in [state]".into()))?;

    let pg_config = PostgresConfig {
        url,
        pool_size: config.pool_size,
        schema: config.schema.clone().unwrap_or_else(|| "public".to_owned()),
        table_prefix: config
            .table_prefix
            .clone()
            .unwrap_or_else(|| "adrelay_".to_owned()),
        ssl_mode: config.ssl_mode.clone(),
        ..PostgresConfig::default()
    };

    let store = Arc::new(PostgresStore::new(pg_config).await?);
    let request_log: Arc<dyn RequestLogStore> = store.clone();
    let event_log: Arc<dyn EventLogStore> = store;
    Ok((request_log, event_log))
}

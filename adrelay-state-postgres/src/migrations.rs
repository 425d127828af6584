use sqlx::PgPool;

use crate::config::PostgresConfig;

/// Create the `request_log` and `event_log` tables if they do not exist.
///
/// # Errors
///
/// Returns a [`sqlx::Error`] if any DDL statement fails.
pub async fn run_migrations(pool: &PgPool, config: &PostgresConfig) -> Result<(), sqlx::Error> {
    let request_log_table = config.request_log_table();
    let event_log_table = config.event_log_table();

    let create_request_log = format!(
        "CREATE TABLE IF NOT EXISTS {request_log_table} (
            rid UUID PRIMARY KEY,
            ds_id TEXT,
            up_id TEXT,
            event_type TEXT,
            ad_id TEXT,
            channel_id TEXT,
            ts BIGINT,
            os TEXT,
            upload_params JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            callback_params JSONB,
            upstream_url TEXT,
            downstream_url TEXT,
            track_time TIMESTAMPTZ NOT NULL,
            track_status SMALLINT NOT NULL,
            is_callback_sent SMALLINT NOT NULL DEFAULT 0,
            callback_time TIMESTAMPTZ,
            callback_event_type TEXT
        )"
    );

    let create_event_log = format!(
        "CREATE TABLE IF NOT EXISTS {event_log_table} (
            id BIGSERIAL PRIMARY KEY,
            day TEXT NOT NULL,
            trace_id TEXT NOT NULL,
            ds_id TEXT,
            up_id TEXT,
            event_type TEXT,
            click_id TEXT,
            ad_id TEXT,
            ts BIGINT,
            ip TEXT NOT NULL DEFAULT '',
            ua TEXT NOT NULL DEFAULT '',
            payload JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL,
            UNIQUE (day, ds_id, event_type, click_id)
        )"
    );

    let create_event_log_day_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}event_log_day_idx ON {event_log_table} (day)",
        config.table_prefix
    );

    let create_request_log_ds_ad_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}request_log_ds_ad_idx ON {request_log_table} (ds_id, ad_id)",
        config.table_prefix
    );
    let create_request_log_up_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}request_log_up_idx ON {request_log_table} (up_id)",
        config.table_prefix
    );
    let create_request_log_event_type_idx = format!(
        "CREATE INDEX IF NOT EXISTS {}request_log_event_type_idx ON {request_log_table} (event_type)",
        config.table_prefix
    );

    sqlx::query(&create_request_log).execute(pool).await?;
    sqlx::query(&create_event_log).execute(pool).await?;
    sqlx::query(&create_event_log_day_idx).execute(pool).await?;
    sqlx::query(&create_request_log_ds_ad_idx).execute(pool).await?;
    sqlx::query(&create_request_log_up_idx).execute(pool).await?;
    sqlx::query(&create_request_log_event_type_idx).execute(pool).await?;

    Ok(())
}

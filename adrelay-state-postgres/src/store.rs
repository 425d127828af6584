use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use adrelay_core::{CallbackSentStatus, EventLog, RequestLog, RequestLogUpdate, TrackStatus};
use adrelay_state::{EventLogStore, RequestLogStore, StateError};

use crate::config::PostgresConfig;
use crate::migrations;

fn track_status_to_i16(s: TrackStatus) -> i16 {
    s as i16
}

fn track_status_from_i16(v: i16) -> TrackStatus {
    if v == TrackStatus::Ok as i16 {
        TrackStatus::Ok
    } else {
        TrackStatus::NonOk
    }
}

fn callback_sent_to_i16(s: CallbackSentStatus) -> i16 {
    s as i16
}

fn callback_sent_from_i16(v: i16) -> CallbackSentStatus {
    match v {
        x if x == CallbackSentStatus::Sent as i16 => CallbackSentStatus::Sent,
        x if x == CallbackSentStatus::Throttled as i16 => CallbackSentStatus::Throttled,
        x if x == CallbackSentStatus::DownstreamFailed as i16 => {
            CallbackSentStatus::DownstreamFailed
        }
        x if x == CallbackSentStatus::NotInWhitelist as i16 => {
            CallbackSentStatus::NotInWhitelist
        }
        _ => CallbackSentStatus::Pending,
    }
}

#[derive(sqlx::FromRow)]
struct RequestLogRow {
    rid: Uuid,
    ds_id: Option<String>,
    up_id: Option<String>,
    event_type: Option<String>,
    ad_id: Option<String>,
    channel_id: Option<String>,
    ts: Option<i64>,
    os: Option<String>,
    upload_params: serde_json::Value,
    callback_params: Option<serde_json::Value>,
    upstream_url: Option<String>,
    downstream_url: Option<String>,
    track_time: DateTime<Utc>,
    track_status: i16,
    is_callback_sent: i16,
    callback_time: Option<DateTime<Utc>>,
    callback_event_type: Option<String>,
}

impl From<RequestLogRow> for RequestLog {
    fn from(r: RequestLogRow) -> Self {
        Self {
            rid: r.rid,
            ds_id: r.ds_id,
            up_id: r.up_id,
            event_type: r.event_type,
            ad_id: r.ad_id,
            channel_id: r.channel_id,
            ts: r.ts,
            os: r.os,
            upload_params: r.upload_params,
            callback_params: r.callback_params,
            upstream_url: r.upstream_url,
            downstream_url: r.downstream_url,
            track_time: r.track_time,
            track_status: track_status_from_i16(r.track_status),
            is_callback_sent: callback_sent_from_i16(r.is_callback_sent),
            callback_time: r.callback_time,
            callback_event_type: r.callback_event_type,
        }
    }
}

/// `PostgreSQL`-backed `RequestLogStore`/`EventLogStore`, sharing one pool.
///
/// Grounded on `PostgresStateStore` (pool construction, SSL options,
/// migrations-on-connect); adapted from a generic key/value store to the
/// two fixed-schema tables spec.md §3 defines.
pub struct PostgresStore {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresStore {
    /// # Errors
    ///
    /// Returns [`StateError::Connection`] if pool creation fails, or
    /// [`StateError::Backend`] if migrations fail.
    pub async fn new(config: PostgresConfig) -> Result<Self, StateError> {
        let connect_options: sqlx::postgres::PgConnectOptions = config
            .url
            .parse()
            .map_err(|e: sqlx::Error| StateError::Connection(e.to_string()))?;

        let connect_options = Self::apply_ssl(connect_options, &config)?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.pool_size)
            .connect_with(connect_options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::run_migrations(&pool, &config)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(Self { pool, config })
    }

    fn apply_ssl(
        mut options: sqlx::postgres::PgConnectOptions,
        config: &PostgresConfig,
    ) -> Result<sqlx::postgres::PgConnectOptions, StateError> {
        if let Some(mode) = &config.ssl_mode {
            let ssl_mode = match mode.as_str() {
                "disable" => sqlx::postgres::PgSslMode::Disable,
                "prefer" => sqlx::postgres::PgSslMode::Prefer,
                "require" => sqlx::postgres::PgSslMode::Require,
                "verify-ca" => sqlx::postgres::PgSslMode::VerifyCa,
                "verify-full" => sqlx::postgres::PgSslMode::VerifyFull,
                other => return Err(StateError::Connection(format!("unknown ssl_mode: {other}"))),
            };
            options = options.ssl_mode(ssl_mode);
        }
        if let Some(path) = &config.ssl_root_cert {
            options = options.ssl_root_cert(path);
        }
        if let Some(path) = &config.ssl_cert {
            options = options.ssl_client_cert(path);
        }
        if let Some(path) = &config.ssl_key {
            options = options.ssl_client_key(path);
        }
        Ok(options)
    }
}

#[async_trait]
impl RequestLogStore for PostgresStore {
    async fn insert(&self, log: RequestLog) -> Result<(), StateError> {
        let table = self.config.request_log_table();
        let query = format!(
            "INSERT INTO {table} \
             (rid, ds_id, up_id, event_type, ad_id, channel_id, ts, os, upload_params, \
              callback_params, upstream_url, downstream_url, track_time, track_status, \
              is_callback_sent, callback_time, callback_event_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        );

        sqlx::query(&query)
            .bind(log.rid)
            .bind(&log.ds_id)
            .bind(&log.up_id)
            .bind(&log.event_type)
            .bind(&log.ad_id)
            .bind(&log.channel_id)
            .bind(log.ts)
            .bind(&log.os)
            .bind(&log.upload_params)
            .bind(&log.callback_params)
            .bind(&log.upstream_url)
            .bind(&log.downstream_url)
            .bind(log.track_time)
            .bind(track_status_to_i16(log.track_status))
            .bind(callback_sent_to_i16(log.is_callback_sent))
            .bind(log.callback_time)
            .bind(&log.callback_event_type)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn find_by_rid(&self, rid: Uuid) -> Result<Option<RequestLog>, StateError> {
        let table = self.config.request_log_table();
        let query = format!("SELECT * FROM {table} WHERE rid = $1");

        let row: Option<RequestLogRow> = sqlx::query_as(&query)
            .bind(rid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(row.map(RequestLog::from))
    }

    async fn update_by_rid(&self, rid: Uuid, update: RequestLogUpdate) -> Result<(), StateError> {
        let mut existing = self
            .find_by_rid(rid)
            .await?
            .ok_or(StateError::NotFound(rid))?;

        if let Some(v) = update.callback_params {
            existing.callback_params = Some(v);
        }
        if let Some(v) = update.downstream_url {
            existing.downstream_url = v;
        }
        if let Some(v) = update.is_callback_sent {
            existing.is_callback_sent = v;
        }
        if let Some(v) = update.callback_time {
            existing.callback_time = v;
        }
        if let Some(v) = update.callback_event_type {
            existing.callback_event_type = v;
        }

        let callback_params = existing.callback_params;
        let downstream_url = existing.downstream_url;
        let is_callback_sent = existing.is_callback_sent;
        let callback_time = existing.callback_time;
        let callback_event_type = existing.callback_event_type;

        let table = self.config.request_log_table();
        let query = format!(
            "UPDATE {table} SET callback_params = $1, downstream_url = $2, \
             is_callback_sent = $3, callback_time = $4, callback_event_type = $5 \
             WHERE rid = $6"
        );

        sqlx::query(&query)
            .bind(&callback_params)
            .bind(&downstream_url)
            .bind(callback_sent_to_i16(is_callback_sent))
            .bind(callback_time)
            .bind(&callback_event_type)
            .bind(rid)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl EventLogStore for PostgresStore {
    async fn insert_event_log(&self, log: EventLog) -> Result<(), StateError> {
        let table = self.config.event_log_table();
        let query = format!(
            "INSERT INTO {table} \
             (day, trace_id, ds_id, up_id, event_type, click_id, ad_id, ts, ip, ua, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (day, ds_id, event_type, click_id) DO NOTHING"
        );

        sqlx::query(&query)
            .bind(&log.day)
            .bind(&log.trace_id)
            .bind(&log.ds_id)
            .bind(&log.up_id)
            .bind(&log.event_type)
            .bind(&log.click_id)
            .bind(&log.ad_id)
            .bind(log.ts)
            .bind(&log.ip)
            .bind(&log.ua)
            .bind(&log.payload)
            .bind(log.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StateError::Backend(e.to_string()))?;

        Ok(())
    }
}

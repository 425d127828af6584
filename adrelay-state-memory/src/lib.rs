//! In-memory `RequestLogStore`/`EventLogStore`, backed by `DashMap`.
//! Used by local dev and the integration test suite; never production,
//! per SPEC_FULL.md's ambient-stack notes.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use adrelay_core::{EventLog, RequestLog, RequestLogUpdate};
use adrelay_state::{EventLogStore, RequestLogStore, StateError};

#[derive(Debug, Default)]
pub struct MemoryRequestLogStore {
    rows: DashMap<Uuid, RequestLog>,
}

impl MemoryRequestLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestLogStore for MemoryRequestLogStore {
    async fn insert(&self, log: RequestLog) -> Result<(), StateError> {
        self.rows.insert(log.rid, log);
        Ok(())
    }

    async fn find_by_rid(&self, rid: Uuid) -> Result<Option<RequestLog>, StateError> {
        Ok(self.rows.get(&rid).map(|r| r.clone()))
    }

    async fn update_by_rid(&self, rid: Uuid, update: RequestLogUpdate) -> Result<(), StateError> {
        let mut row = self
            .rows
            .get_mut(&rid)
            .ok_or(StateError::NotFound(rid))?;

        if let Some(v) = update.callback_params {
            row.callback_params = Some(v);
        }
        if let Some(v) = update.downstream_url {
            row.downstream_url = v;
        }
        if let Some(v) = update.is_callback_sent {
            row.is_callback_sent = v;
        }
        if let Some(v) = update.callback_time {
            row.callback_time = v;
        }
        if let Some(v) = update.callback_event_type {
            row.callback_event_type = v;
        }
        Ok(())
    }
}

/// Dedup key for same-day `(ds_id, event_type, click_id)` event logs.
#[derive(Debug, Default)]
pub struct MemoryEventLogStore {
    seen: Mutex<HashSet<String>>,
    rows: Mutex<Vec<EventLog>>,
}

impl MemoryEventLogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().expect("lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dedup_key(log: &EventLog) -> String {
    format!(
        "{}:{}:{}:{}",
        log.day,
        log.ds_id.as_deref().unwrap_or(""),
        log.event_type.as_deref().unwrap_or(""),
        log.click_id.as_deref().unwrap_or(""),
    )
}

#[async_trait]
impl EventLogStore for MemoryEventLogStore {
    async fn insert_event_log(&self, log: EventLog) -> Result<(), StateError> {
        let key = dedup_key(&log);
        let mut seen = self.seen.lock().expect("lock poisoned");
        if !seen.insert(key) {
            return Ok(());
        }
        drop(seen);
        self.rows.lock().expect("lock poisoned").push(log);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use adrelay_core::{CallbackSentStatus, TrackStatus};

    fn sample_log(rid: Uuid) -> RequestLog {
        RequestLog {
            rid,
            ds_id: Some("ds1".into()),
            up_id: Some("up1".into()),
            event_type: Some("click".into()),
            ad_id: Some("67576".into()),
            channel_id: None,
            ts: Some(1_700_000_000_000),
            os: Some("android".into()),
            upload_params: serde_json::json!({}),
            callback_params: None,
            upstream_url: Some("https://up.example.com/click".into()),
            downstream_url: None,
            track_time: Utc::now(),
            track_status: TrackStatus::Ok,
            is_callback_sent: CallbackSentStatus::Pending,
            callback_time: None,
            callback_event_type: None,
        }
    }

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let store = MemoryRequestLogStore::new();
        let rid = Uuid::new_v4();
        store.insert(sample_log(rid)).await.unwrap();
        let found = store.find_by_rid(rid).await.unwrap().unwrap();
        assert_eq!(found.rid, rid);
    }

    #[tokio::test]
    async fn find_missing_rid_returns_none() {
        let store = MemoryRequestLogStore::new();
        assert!(store.find_by_rid(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_unknown_rid_errors() {
        let store = MemoryRequestLogStore::new();
        let err = store
            .update_by_rid(Uuid::new_v4(), RequestLogUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_applies_only_set_fields() {
        let store = MemoryRequestLogStore::new();
        let rid = Uuid::new_v4();
        store.insert(sample_log(rid)).await.unwrap();

        store
            .update_by_rid(
                rid,
                RequestLogUpdate {
                    is_callback_sent: Some(CallbackSentStatus::Sent),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let found = store.find_by_rid(rid).await.unwrap().unwrap();
        assert_eq!(found.is_callback_sent, CallbackSentStatus::Sent);
        assert_eq!(found.ds_id.as_deref(), Some("ds1"));
    }

    #[tokio::test]
    async fn duplicate_event_log_same_day_is_ignored() {
        let store = MemoryEventLogStore::new();
        let log = EventLog {
            day: EventLog::today(),
            trace_id: "t1".into(),
            ds_id: Some("ds1".into()),
            up_id: Some("up1".into()),
            event_type: Some("click".into()),
            click_id: Some("clk-1".into()),
            ad_id: Some("67576".into()),
            ts: None,
            ip: String::new(),
            ua: String::new(),
            payload: serde_json::json!({}),
            created_at: Utc::now(),
        };
        store.insert_event_log(log.clone()).await.unwrap();
        store.insert_event_log(log).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}

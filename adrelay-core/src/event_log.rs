//! Best-effort, secondary audit trail of raw inbound track events.
//!
//! Distinct from [`crate::RequestLog`], which only gets a row after the
//! forwarder actually dispatches to an upstream (and so collapses under
//! debounce). `EventLog` records every inbound `/v1/track` call, keyed so
//! a same-day duplicate `(ds_id, event_type, click_id)` is idempotently
//! ignored. See SPEC_FULL.md §4.11.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    /// `YYYYMMDD`, used as part of the idempotency key.
    pub day: String,
    pub trace_id: String,
    pub ds_id: Option<String>,
    pub up_id: Option<String>,
    pub event_type: Option<String>,
    pub click_id: Option<String>,
    pub ad_id: Option<String>,
    pub ts: Option<i64>,
    pub ip: String,
    pub ua: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl EventLog {
    #[must_use]
    pub fn today() -> String {
        Utc::now().format("%Y%m%d").to_string()
    }
}

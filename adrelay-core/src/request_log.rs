//! `RequestLog` -- one row per forwarded upstream request. See spec.md §3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of the upstream HTTP attempt made at track time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum TrackStatus {
    /// Upstream responded 200.
    Ok = 1,
    /// Upstream responded non-200, or the request failed outright.
    NonOk = 2,
}

impl TrackStatus {
    #[must_use]
    pub fn from_upstream_status(status: u16) -> Self {
        if status == 200 { Self::Ok } else { Self::NonOk }
    }
}

/// Lifecycle state of the downstream callback. Monotonic: once advanced
/// past `Pending` it never regresses (spec.md §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum CallbackSentStatus {
    Pending = 0,
    Sent = 1,
    Throttled = 2,
    DownstreamFailed = 3,
    NotInWhitelist = 4,
}

/// One row per forwarded upstream request, keyed by a unique `rid`.
///
/// `rid` is assigned once at track time and echoed back in the callback
/// URL the upstream is given, letting the callback handler recover
/// per-request context without a shared session (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub rid: Uuid,
    pub ds_id: Option<String>,
    pub up_id: Option<String>,
    pub event_type: Option<String>,
    pub ad_id: Option<String>,
    pub channel_id: Option<String>,
    pub ts: Option<i64>,
    pub os: Option<String>,
    /// Serialized JSON of the UDM as sent upstream, plus the retained
    /// downstream callback template (so the callback handler can recover
    /// it without a second round trip).
    pub upload_params: Value,
    /// Serialized JSON of the inbound callback's query + body, set once
    /// a callback for this `rid` has arrived.
    pub callback_params: Option<Value>,
    pub upstream_url: Option<String>,
    pub downstream_url: Option<String>,
    pub track_time: DateTime<Utc>,
    pub track_status: TrackStatus,
    pub is_callback_sent: CallbackSentStatus,
    pub callback_time: Option<DateTime<Utc>>,
    pub callback_event_type: Option<String>,
}

/// Fields of a `RequestLog` the callback handler is allowed to update.
/// `rid`, `track_*` fields, and `upload_params` are write-once at track
/// time and never revisited, matching the lifecycle in spec.md §3.
#[derive(Debug, Clone, Default)]
pub struct RequestLogUpdate {
    pub callback_params: Option<Value>,
    pub downstream_url: Option<Option<String>>,
    pub is_callback_sent: Option<CallbackSentStatus>,
    pub callback_time: Option<Option<DateTime<Utc>>>,
    pub callback_event_type: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_status_maps_200_to_ok() {
        assert_eq!(TrackStatus::from_upstream_status(200), TrackStatus::Ok);
        assert_eq!(TrackStatus::from_upstream_status(500), TrackStatus::NonOk);
        assert_eq!(TrackStatus::from_upstream_status(404), TrackStatus::NonOk);
    }
}

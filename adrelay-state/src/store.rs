//! Persistence traits for the two record types spec.md §3 defines:
//! `RequestLog` (one row per forwarded upstream request) and `EventLog`
//! (a best-effort audit trail of every inbound track call).
//!
//! Grounded on `acteon-state`'s `StateStore` trait shape: a single
//! `Send + Sync` trait, `async_trait`, and a crate-local error type.

use async_trait::async_trait;
use uuid::Uuid;

use adrelay_core::{EventLog, RequestLog, RequestLogUpdate};

use crate::error::StateError;

/// Persists `RequestLog` rows, keyed by `rid`.
#[async_trait]
pub trait RequestLogStore: Send + Sync {
    /// Insert a new row at track time. `rid` must be unique.
    async fn insert(&self, log: RequestLog) -> Result<(), StateError>;

    /// Look up a row by `rid`, as read by the callback handler.
    async fn find_by_rid(&self, rid: Uuid) -> Result<Option<RequestLog>, StateError>;

    /// Apply a partial update from the callback handler. No-op fields
    /// are left untouched; returns `Err(NotFound)` if `rid` is unknown.
    async fn update_by_rid(&self, rid: Uuid, update: RequestLogUpdate) -> Result<(), StateError>;
}

/// Persists the best-effort `EventLog` audit trail (spec.md §4.11).
/// Implementations must never let a failure here propagate back to the
/// track request -- callers are expected to log and swallow errors.
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Insert an event log row, ignoring a same-day duplicate
    /// `(ds_id, event_type, click_id)` rather than erroring.
    async fn insert_event_log(&self, log: EventLog) -> Result<(), StateError>;
}

//! The payload carried through the debounce store. See spec.md §4.8 step 9.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use adrelay_core::Udm;

/// A queued click report, keyed by `"<upstream_id>:<ad_id>:<device_key>"`.
/// Whichever submit for a given key carries the highest `order_ts_ms` wins
/// the single dispatch fired after the debounce window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceJob {
    pub trace_id: String,
    pub udm: Udm,
    pub upstream_id: String,
    pub event_type: String,
    pub callback_template: String,
    /// Route-level overrides carried alongside the job so the worker can
    /// re-check routing at dispatch time (SPEC_FULL.md §4.10).
    pub route_params: Value,
}

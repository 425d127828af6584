use async_trait::async_trait;

use crate::job::DebounceJob;

/// Sends a debounced job to its upstream. Implemented by `adrelay-gateway`
/// so the debounce manager never depends on the forwarder or router
/// directly; it only knows how to schedule and hand off jobs.
///
/// Implementations should treat a routing decision that now says "drop"
/// (SPEC_FULL.md §4.10) as a successful no-op, not an error -- the job
/// was superseded, not failed.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: DebounceJob);
}

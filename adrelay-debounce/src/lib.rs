//! Redis-backed debounce manager: coalesces bursts of same-key track
//! submits into a single delayed dispatch (spec.md §4.9).

pub mod dispatch;
pub mod error;
pub mod job;
mod keys;
pub mod manager;
mod scripts;

pub use dispatch::JobDispatcher;
pub use error::DebounceError;
pub use job::DebounceJob;
pub use manager::RedisDebounceManager;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use adrelay_core::config::{DebounceSettings, RedisSettings};
    use adrelay_core::Udm;

    struct CountingDispatcher {
        count: AtomicUsize,
    }

    #[async_trait]
    impl JobDispatcher for CountingDispatcher {
        async fn dispatch(&self, _job: DebounceJob) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn sample_job() -> DebounceJob {
        DebounceJob {
            trace_id: "t1".into(),
            udm: Udm::default(),
            upstream_id: "up1".into(),
            event_type: "click".into(),
            callback_template: String::new(),
            route_params: serde_json::json!({}),
        }
    }

    // This constructs the manager purely to exercise config wiring; it
    // never connects, since no test here calls a Redis-touching method.
    #[test]
    fn manager_builds_from_settings() {
        let redis = RedisSettings::default();
        let settings = DebounceSettings::default();
        let dispatcher = Arc::new(CountingDispatcher {
            count: AtomicUsize::new(0),
        });
        let manager = RedisDebounceManager::new(&redis, &settings, dispatcher);
        assert!(manager.is_ok());
        let _ = sample_job();
    }
}

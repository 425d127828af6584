//! Tuned HTTP client, budgeted retry, and the forwarder-to-upstream
//! adapter (spec.md §4.5, §4.6).

pub mod adapter;
pub mod client;
pub mod error;
pub mod send;

pub use adapter::{build_cb_url, dispatch_to_upstream, DispatchOutcome};
pub use client::build_client;
pub use error::ForwarderError;
pub use send::{http_send, http_send_with_retry, SendResult};

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn cb_url_with_no_template_is_bare() {
        let rid = Uuid::nil();
        let url = build_cb_url("https://cb.example.com", rid, None);
        assert_eq!(url, format!("https://cb.example.com/cb?rid={rid}"));
    }

    #[test]
    fn cb_url_appends_template_query() {
        let rid = Uuid::nil();
        let url = build_cb_url(
            "https://cb.example.com/",
            rid,
            Some("https://x.example.com/cb?a=1&b=2"),
        );
        assert_eq!(url, format!("https://cb.example.com/cb?rid={rid}&a=1&b=2"));
    }

    #[test]
    fn cb_url_ignores_template_without_query() {
        let rid = Uuid::nil();
        let url = build_cb_url("https://cb.example.com", rid, Some("https://x.example.com/cb"));
        assert_eq!(url, format!("https://cb.example.com/cb?rid={rid}"));
    }

    #[tokio::test]
    async fn http_send_with_retry_stops_on_non_timeout_status() {
        let client = build_client().expect("client builds");
        let headers = std::collections::HashMap::new();
        let (status, _) = http_send_with_retry(
            &client,
            "GET",
            "http://127.0.0.1:1/does-not-exist",
            &headers,
            None,
            500,
            2,
            10,
        )
        .await;
        // connection refused on an unroutable local port -> 503, not retried as 408
        assert_ne!(status, 408);
    }
}

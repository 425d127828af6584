//! The process-wide HTTP client. Grounded on
//! `original_source/app/services/connector.py::get_client` for the pool
//! tuning numbers, and on `crates/llm/src/http.rs`'s
//! `reqwest::Client::builder()` pattern.

use std::time::Duration;

/// Build the shared client: tuned for high keep-alive concurrency, no
/// redirect following, TLS verification on. Construct once per process
/// and share via `Arc`/clone (`reqwest::Client` is a cheap handle).
///
/// # Errors
///
/// Returns `reqwest::Error` if the TLS backend fails to initialize.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(8))
        .pool_max_idle_per_host(700)
        .pool_idle_timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

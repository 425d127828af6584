//! Budgeted HTTP send with retry (spec.md §4.5). Grounded on
//! `original_source/app/services/connector.py::http_send`/`http_send_with_retry`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, instrument, warn};

/// `(status, body)` -- body is the parsed JSON response, or `{"text": ...}`
/// when the response isn't JSON. Never a Rust error: status ranges
/// 4xx/5xx/408/503 are results, matching spec.md §4.5.
pub type SendResult = (u16, Value);

/// Single HTTP attempt with a fixed per-attempt timeout.
#[instrument(skip(client, headers, body), fields(method = %method, url = %url))]
pub async fn http_send(
    client: &reqwest::Client,
    method: &str,
    url: &str,
    headers: &HashMap<String, String>,
    body: Option<&Value>,
    timeout_ms: u64,
) -> SendResult {
    let Ok(reqwest_method) = reqwest::Method::from_bytes(method.to_uppercase().as_bytes()) else {
        return (500, serde_json::json!({"error": "invalid_method"}));
    };

    let mut builder = client
        .request(reqwest_method.clone(), url)
        .timeout(Duration::from_millis(timeout_ms));

    for (k, v) in headers {
        builder = builder.header(k, v);
    }

    if let Some(body) = body {
        let is_json = headers
            .get("Content-Type")
            .is_none_or(|ct| ct.starts_with("application/json"));
        builder = if is_json {
            builder.json(body)
        } else if let Value::String(s) = body {
            builder.body(s.clone())
        } else {
            builder.json(body)
        };
    }

    match builder.send().await {
        Ok(response) => {
            let status = response.status().as_u16();
            let text = match response.text().await {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to read response body");
                    return (status, serde_json::json!({"error": "body_read_failed"}));
                }
            };
            let body = serde_json::from_str::<Value>(&text)
                .unwrap_or_else(|_| Value::String(text));
            (status, body)
        }
        Err(e) if e.is_timeout() => {
            warn!(%method, %url, "http request timeout");
            (408, serde_json::json!({"error": "timeout"}))
        }
        Err(e) if e.is_connect() => {
            warn!(%method, %url, "http connection error");
            (503, serde_json::json!({"error": "connection_failed"}))
        }
        Err(e) => {
            warn!(%method, %url, error = %e, "http request error");
            (500, serde_json::json!({"error": e.to_string()}))
        }
    }
}

/// Retries `http_send` within a **total** time budget of `timeout_ms`,
/// not per-attempt. See spec.md §4.5 for the exact algorithm: 2xx/3xx
/// stop immediately, non-timeout errors never retry, timeouts retry
/// until the budget or `max_retries` is exhausted.
pub async fn http_send_with_retry(
    client: &reqwest::Client,
    method: &str,
    url: &str,
    headers: &HashMap<String, String>,
    body: Option<&Value>,
    timeout_ms: u64,
    max_retries: u32,
    backoff_ms: u64,
) -> SendResult {
    let mut last: Option<SendResult> = None;
    let start = Instant::now();
    let deadline = start + Duration::from_millis(timeout_ms);

    let mut attempt = 0u32;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return last.unwrap_or((408, serde_json::json!({"error": "timeout"})));
        }

        let remaining = deadline - now;
        let per_attempt_ms = remaining.as_millis().max(100) as u64;

        let result = http_send(client, method, url, headers, body, per_attempt_ms).await;
        let status = result.0;
        last = Some(result);

        if (200..400).contains(&status) {
            break;
        }
        if status != 408 {
            break;
        }

        attempt += 1;
        if attempt > max_retries {
            break;
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let remaining = deadline - now;
        let sleep_dur = Duration::from_millis(backoff_ms).min(remaining);
        tokio::time::sleep(sleep_dur).await;
        info!(%method, %url, attempt, "retrying http request");
    }

    last.unwrap_or((408, serde_json::json!({"error": "timeout"})))
}

//! Small helpers shared by the HTTP service clients.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

/// Builds a JSON client with `headers` applied to every request.
pub(crate) fn json_client(mut headers: HeaderMap, timeout: Duration, label: &str) -> Result<Client> {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .with_context(|| format!("failed to build {label} HTTP client"))
}

/// Header value for a secret, rejecting blanks and invalid bytes.
pub(crate) fn secret_header(value: &str, label: &str) -> Result<HeaderValue> {
    anyhow::ensure!(!value.trim().is_empty(), "missing {label}");
    let mut header =
        HeaderValue::from_str(value.trim()).with_context(|| format!("invalid {label}"))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Fails with the status and body when `resp` is not a 2xx, otherwise parses JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(resp: Response, service: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        bail!("{} returned {}: {}", service, status, body);
    }
    resp.json::<T>()
        .await
        .with_context(|| format!("failed to parse {service} response"))
}

/// Statuses worth another attempt.
pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Transport failures worth another attempt.
pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

/// Capped exponential backoff: 1s, 2s, 4s ... 16s.
pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

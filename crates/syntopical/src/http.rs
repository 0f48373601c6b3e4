//! Shared HTTP plumbing for the embedding and chat providers.
//!
//! Providers make a single attempt per call; the bounded retry lives in
//! `syntopical_core::retry`, driven by the `transient` flag computed here:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → transient
//! - HTTP 4xx (client error, not 429) → fatal
//! - Timeouts and connection errors → transient

use std::time::Duration;

use anyhow::Result;
use reqwest::{RequestBuilder, StatusCode};

pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// A failed request: message plus whether retrying may help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Failure {
    pub message: String,
    pub transient: bool,
}

pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send `request` and decode a JSON response body.
pub(crate) async fn send_json(
    request: RequestBuilder,
    service: &str,
) -> std::result::Result<serde_json::Value, Failure> {
    let response = request.send().await.map_err(|e| Failure {
        message: format!("{service} request failed: {e}"),
        transient: e.is_timeout() || e.is_connect(),
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Failure {
            message: format!("{service} API error {status}: {body}"),
            transient: is_transient_status(status),
        });
    }

    response.json().await.map_err(|e| Failure {
        message: format!("{service} returned an unreadable response: {e}"),
        transient: false,
    })
}

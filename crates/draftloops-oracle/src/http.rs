//! Shared plumbing for the HTTP providers.

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::OracleError;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> ChatMessage<'a> {
    pub fn new(role: &'static str, content: &'a str) -> Self {
        Self { role, content }
    }
}

pub(crate) fn build_client(timeout: Option<Duration>) -> Result<Client, OracleError> {
    Client::builder()
        .timeout(timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
        .build()
        .map_err(|e| OracleError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Turn a non-success status into an `OracleError`, otherwise return the body
pub(crate) async fn check_status(response: Response) -> Result<String, OracleError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        return Err(OracleError::RateLimited { retry_after });
    }

    let body = response
        .text()
        .await
        .map_err(|e| OracleError::Unreachable(format!("Failed to read response body: {}", e)))?;

    if !status.is_success() {
        return Err(OracleError::Api {
            status: status.as_u16(),
            message: truncate(&body, 500).to_string(),
        });
    }

    Ok(body)
}

/// `Retry-After` in delta-seconds form; HTTP-date values are ignored
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn truncate(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

//! Maps HTTP-level failures from model providers onto [`InferenceError`].

use std::time::Duration;

use patentflow_core::error::InferenceError;
use reqwest::{header::RETRY_AFTER, Response, StatusCode};

const MAX_BODY_IN_ERROR: usize = 500;

pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client, InferenceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| InferenceError::Config(format!("build http client: {e}")))
}

pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout(Duration::from_secs(timeout_secs))
    } else if e.is_builder() {
        InferenceError::Config(e.to_string())
    } else {
        InferenceError::upstream(e.to_string())
    }
}

/// Classifies a non-success status. 429 is a rate limit, 408 and 5xx are
/// retryable, every other 4xx is fatal.
pub fn status_error(status: StatusCode, retry_after: Option<&str>, body: &str) -> InferenceError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return InferenceError::RateLimited { retry_after };
    }
    let message = format!("{status}: {}", truncate(body));
    if status == StatusCode::REQUEST_TIMEOUT || status.is_server_error() {
        InferenceError::upstream(message)
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        InferenceError::Config(message)
    } else {
        InferenceError::fatal(message)
    }
}

pub(crate) async fn check(response: Response) -> Result<Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, retry_after.as_deref(), &body))
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((i, _)) => &body[..i],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = status_error(StatusCode::TOO_MANY_REQUESTS, Some("7"), "");
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn server_errors_retry_client_errors_do_not() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, None, "busy").is_retryable());
        assert!(status_error(StatusCode::REQUEST_TIMEOUT, None, "").is_retryable());
        assert!(!status_error(StatusCode::BAD_REQUEST, None, "bad").is_retryable());
        assert_eq!(status_error(StatusCode::UNAUTHORIZED, None, "").code(), "config");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2_000);
        let err = status_error(StatusCode::BAD_GATEWAY, None, &body);
        assert!(err.to_string().len() < 600);
    }
}

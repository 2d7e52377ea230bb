use std::time::Duration;

use thiserror::Error;

use crate::types::StageKind;

// ── Inference ────────────────────────────────────────────────────────────

/// Failure of a single model call.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("invalid response shape: {0}")]
    InvalidResponseShape(String),

    #[error("upstream error: {message}")]
    Upstream { message: String, retryable: bool },

    #[error("backend configuration error: {0}")]
    Config(String),
}

impl InferenceError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::InvalidResponseShape(_) => true,
            Self::Upstream { retryable, .. } => *retryable,
            Self::Config(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::InvalidResponseShape(_) => "invalid_response_shape",
            Self::Upstream { .. } => "upstream_error",
            Self::Config(_) => "config",
        }
    }
}

// ── Documents ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("could not retrieve {url}: {reason}")]
    Unretrievable { url: String, reason: String },

    #[error("invalid document location: {0}")]
    InvalidLocation(String),

    #[error("failed to store {name}: {reason}")]
    StoreFailed { name: String, reason: String },
}

// ── Stage outcome ────────────────────────────────────────────────────────

/// Marker returned by a stage executor instead of a delta. Carries the message
/// that becomes the run's terminal error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} failed: {message}", .stage.label())]
pub struct StageFailure {
    pub stage: StageKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(stage: StageKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }

    pub fn missing(stage: StageKind, what: &str) -> Self {
        Self::new(stage, format!("missing {what}"))
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("run already failed; refusing {0} output")]
    Sealed(StageKind),
}

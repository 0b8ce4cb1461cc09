//! Error types for the tracker client.

use std::time::Duration;

/// Tracker errors.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Authentication failed or credentials invalid.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Unexpected status or body from the tracker.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Cache file could not be written.
    #[error("cache error: {message}")]
    Cache { message: String },
}

impl TrackerError {
    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

//! Error type for arXiv API access.
//!
//! The crawler retries only what [`ArxivError::is_retryable`] calls
//! transient; everything else is reported straight away.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArxivError {
    #[error("invalid arXiv identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("paper not found on arXiv: {0}")]
    NotFound(String),

    #[error("arXiv rate limit exceeded (HTTP {status})")]
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },

    #[error("arXiv API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("arXiv request timed out: {0}")]
    Timeout(String),

    #[error("network error talking to arXiv: {0}")]
    Network(String),

    #[error("failed to parse arXiv response: {0}")]
    Parse(String),
}

impl ArxivError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ArxivError::RateLimited { .. } | ArxivError::Timeout(_) | ArxivError::Network(_) => {
                true
            }
            ArxivError::Api { status, .. } => *status >= 500,
            ArxivError::InvalidIdentifier(_) | ArxivError::NotFound(_) | ArxivError::Parse(_) => {
                false
            }
        }
    }

    /// Server-requested delay, if the response carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ArxivError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ArxivError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ArxivError::Timeout(err.to_string())
        } else {
            ArxivError::Network(err.to_string())
        }
    }
}

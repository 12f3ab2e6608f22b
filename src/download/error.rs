use std::time::Duration;
use thiserror::Error;

use crate::core::retry::Retryable;

/// Failure of a retrieval, relay or catalog step.
///
/// Whether a failure is worth another attempt is a property of the variant,
/// see [`Retryable`]. Only [`PipelineError::Network`],
/// [`PipelineError::Timeout`] and [`PipelineError::RetryAfter`] are retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed URL, empty file, unknown quality, bad arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Declared or measured size over the configured maximum
    #[error("file too large: {size} bytes exceeds the {max} byte limit")]
    Oversize { size: u64, max: u64 },

    #[error("timed out: {0}")]
    Timeout(String),

    /// Connection failures and non-success HTTP statuses
    #[error("network error: {0}")]
    Network(String),

    /// Extractor produced nothing usable (no JSON, no formats, no output file)
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Missing local file, 404 remote, or unknown catalog entry
    #[error("not found: {0}")]
    NotFound(String),

    /// Catalog store rejected the operation
    #[error("catalog error: {0}")]
    Persistence(String),

    /// Server asked to back off for the given time
    #[error("rate limited by server, retry after {0:?}")]
    RetryAfter(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Returns a stable label for logs
    pub fn subcategory(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::Oversize { .. } => "oversize",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::Network(_) => "network",
            PipelineError::Extraction(_) => "extraction",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::RetryAfter(_) => "retry_after",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Io(_) => "io",
        }
    }
}

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Network(_) | PipelineError::Timeout(_) | PipelineError::RetryAfter(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            PipelineError::RetryAfter(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout(err.to_string())
        } else {
            PipelineError::Network(err.to_string())
        }
    }
}

impl From<teloxide::RequestError> for PipelineError {
    fn from(err: teloxide::RequestError) -> Self {
        use teloxide::RequestError;

        match err {
            RequestError::RetryAfter(seconds) => PipelineError::RetryAfter(seconds.duration()),
            RequestError::Network(e) if e.is_timeout() => PipelineError::Timeout(e.to_string()),
            RequestError::Network(e) => PipelineError::Network(e.to_string()),
            RequestError::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => PipelineError::Timeout(e.to_string()),
            RequestError::Io(e) => PipelineError::Network(e.to_string()),
            RequestError::Api(api) => {
                // Telegram reports unreadable uploads and bad ids as API errors; retrying won't help
                PipelineError::InvalidInput(api.to_string())
            }
            other => PipelineError::Extraction(other.to_string()),
        }
    }
}

impl From<crate::core::worker_pool::WorkerError> for PipelineError {
    fn from(err: crate::core::worker_pool::WorkerError) -> Self {
        PipelineError::Extraction(err.to_string())
    }
}

//! Internal error types for indexer operations.
//!
//! These errors are internal to `foliofox-indexer` and are mapped to the
//! core port errors at the boundary.

use thiserror::Error;

use foliofox_core::ports::IndexerPortError;

/// Result type alias for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Errors related to indexer API operations.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// API request failed with an HTTP error status.
    #[error("Indexer API request failed with status {status}: {url}")]
    ApiRequestFailed {
        /// HTTP status code
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// API returned an invalid or unexpected response.
    #[error("Invalid response from indexer API: {message}")]
    InvalidResponse {
        /// Description of what was invalid
        message: String,
    },

    /// The request exceeded the indexer's timeout.
    #[error("Indexer request timed out after {secs}s")]
    Timeout {
        /// The deadline that was exceeded
        secs: u64,
    },

    /// Network or HTTP client error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl IndexerError {
    /// Map to the core port error for callers behind `IndexerClientPort`.
    #[must_use]
    pub fn into_port_error(self) -> IndexerPortError {
        match self {
            Self::Timeout { secs } => IndexerPortError::Timeout { secs },
            Self::Network(e) if e.is_timeout() => IndexerPortError::Timeout { secs: 0 },
            other => IndexerPortError::upstream(other.to_string()),
        }
    }
}

//! Download error taxonomy.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::events::DownloadStatus;

/// Error type for download operations.
///
/// Validation and state errors are returned synchronously and never mutate
/// persisted state; transfer-time errors feed the retry policy.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// Bad request shape. Never retried.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the request.
        message: String,
    },

    /// No usable download folder could be resolved. The download is not
    /// created.
    #[error("Path resolution failed: {message}")]
    PathResolution {
        /// Why no destination could be resolved.
        message: String,
    },

    /// Action requested from a state that forbids it. No mutation happens.
    #[error("Cannot {action} download {id}: status is {status:?}")]
    InvalidState {
        /// The download the action targeted.
        id: String,
        /// Its status at the time of the request.
        status: DownloadStatus,
        /// The rejected action, e.g. "resume".
        action: String,
    },

    /// An indexer's rate limit window is saturated.
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the window resets.
        retry_after_secs: u64,
    },

    /// Network/IO failure during the transfer. Counts toward the retry
    /// budget unless the status code marks it permanent.
    #[error("Transfer failed: {message}")]
    Transfer {
        /// Detailed error message.
        message: String,
        /// HTTP status code if the failure came from a response.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// The transfer exceeded its deadline.
    #[error("Timed out after {secs}s")]
    Timeout {
        /// The deadline that was exceeded.
        secs: u64,
    },

    /// The retry budget is exhausted; the item stays `Failed`.
    #[error("Download {id} exhausted its retry budget of {max_retries}")]
    MaxRetriesExceeded {
        /// The download that cannot be retried.
        id: String,
        /// Its configured budget.
        max_retries: u32,
    },

    /// No queue item with the given id.
    #[error("Download not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: String,
    },

    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g. "NotFound", "PermissionDenied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The transfer was stopped by an explicit user action (pause, cancel,
    /// shutdown). Never counts toward the retry budget.
    #[error("Transfer cancelled")]
    Cancelled,

    /// Queue store backend failure.
    #[error("Queue store error: {message}")]
    Store {
        /// Detailed error message.
        message: String,
    },
}

impl DownloadError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a path resolution error.
    pub fn path_resolution(message: impl Into<String>) -> Self {
        Self::PathResolution {
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(
        id: impl Into<String>,
        status: DownloadStatus,
        action: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            status,
            action: action.into(),
        }
    }

    /// Create a transfer error with no status code.
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a transfer error from an HTTP response status.
    pub fn transfer_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Transfer {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub const fn timeout(secs: u64) -> Self {
        Self::Timeout { secs }
    }

    /// Create a max-retries-exceeded error.
    pub fn max_retries_exceeded(id: impl Into<String>, max_retries: u32) -> Self {
        Self::MaxRetriesExceeded {
            id: id.into(),
            max_retries,
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an I/O error from a `std::io::Error`.
    ///
    /// Captures the error kind name and message for serialization.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a queue store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Whether a failed attempt with this error consumes retry budget.
    ///
    /// Client-side HTTP errors (4xx) are permanent: the URL is wrong or
    /// gone, and hammering the indexer will not fix it. Everything
    /// network-shaped is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transfer { status_code, .. } => match status_code {
                Some(code) => *code < 400 || *code >= 500 || *code == 429,
                None => true,
            },
            Self::Timeout { .. } | Self::Io { .. } => true,
            _ => false,
        }
    }

    /// Whether this is a cooperative cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = DownloadError::from_io_error(&io_err);

        match err {
            DownloadError::Io { kind, message } => {
                assert_eq!(kind, "NotFound");
                assert!(message.contains("file not found"));
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn retryability_by_status_code() {
        assert!(DownloadError::transfer("connection reset").is_retryable());
        assert!(DownloadError::transfer_with_status("bad gateway", 502).is_retryable());
        assert!(DownloadError::transfer_with_status("slow down", 429).is_retryable());
        assert!(!DownloadError::transfer_with_status("gone", 404).is_retryable());
        assert!(!DownloadError::transfer_with_status("forbidden", 403).is_retryable());
    }

    #[test]
    fn timeouts_count_toward_retry_budget() {
        assert!(DownloadError::timeout(600).is_retryable());
    }

    #[test]
    fn user_actions_never_retry() {
        assert!(!DownloadError::Cancelled.is_retryable());
        assert!(DownloadError::Cancelled.is_cancelled());
        assert!(!DownloadError::validation("bad url").is_retryable());
        assert!(
            !DownloadError::invalid_state("x", DownloadStatus::Completed, "resume").is_retryable()
        );
    }

    #[test]
    fn error_serialization_roundtrip() {
        let err = DownloadError::transfer_with_status("timeout", 408);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("408"));

        let parsed: DownloadError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }
}

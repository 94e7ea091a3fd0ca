//! Search error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for search aggregation.
///
/// Per-indexer failures during a fan-out are swallowed as partial
/// failures; these errors describe the aggregate call.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SearchError {
    /// No candidate indexer was available, or every candidate failed.
    #[error("No indexers available for this search")]
    NoIndexersAvailable,

    /// The aggregate search exceeded its deadline.
    #[error("Search timed out after {secs}s")]
    Timeout {
        /// The deadline that was exceeded.
        secs: u64,
    },

    /// Search history backend failure.
    #[error("Search history error: {message}")]
    History {
        /// Detailed error message.
        message: String,
    },
}

impl SearchError {
    /// Create a history error.
    pub fn history(message: impl Into<String>) -> Self {
        Self::History {
            message: message.into(),
        }
    }
}

//! Indexer client port.
//!
//! Abstracts the HTTP access to one indexer so the search aggregator and
//! the health monitor can be exercised without a network. The production
//! implementation lives in `foliofox-indexer`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::indexer::Indexer;
use crate::search::{SearchRequest, SearchResult};

/// Errors surfaced by indexer client implementations.
///
/// Implementation-internal errors (HTTP, JSON) are mapped to these at the
/// crate boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IndexerPortError {
    /// The indexer did not answer within the deadline.
    #[error("Indexer timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The caller's rate limiter refused the request.
    #[error("Indexer rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The indexer answered with an error or unusable payload.
    #[error("Indexer error: {message}")]
    Upstream { message: String },
}

impl IndexerPortError {
    /// Create an upstream error.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
        }
    }
}

/// Result of a capability probe.
#[derive(Clone, Debug)]
pub struct ProbeOutcome {
    /// Round-trip time of the probe.
    pub response_time: Duration,
}

/// Port for talking to indexers.
#[async_trait]
pub trait IndexerClientPort: Send + Sync {
    /// Run a search against one indexer and parse its matches.
    ///
    /// The implementation bounds the call by the indexer's own timeout;
    /// callers may impose a shorter one.
    async fn search(
        &self,
        indexer: &Indexer,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>, IndexerPortError>;

    /// Lightweight capability probe used by the health monitor.
    async fn probe(&self, indexer: &Indexer) -> Result<ProbeOutcome, IndexerPortError>;
}

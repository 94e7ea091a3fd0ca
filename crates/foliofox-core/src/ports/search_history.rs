//! Search history port.
//!
//! Records executed searches per user and answers the suggestion lookup
//! without touching indexers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::indexer::IndexerId;
use crate::search::{SearchError, Suggestion};

/// One executed search.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub user_id: i64,
    pub query: String,
    pub result_count: usize,
    pub indexers_searched: Vec<IndexerId>,
    pub executed_at: DateTime<Utc>,
}

impl SearchHistoryEntry {
    /// Record a search executed now.
    pub fn new(
        user_id: i64,
        query: impl Into<String>,
        result_count: usize,
        indexers_searched: Vec<IndexerId>,
    ) -> Self {
        Self {
            user_id,
            query: query.into(),
            result_count,
            indexers_searched,
            executed_at: Utc::now(),
        }
    }
}

/// Port for search history storage.
#[async_trait]
pub trait SearchHistoryPort: Send + Sync {
    /// Append an entry.
    async fn record(&self, entry: SearchHistoryEntry) -> Result<(), SearchError>;

    /// A user's history, newest first, capped at `limit`.
    async fn list(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<SearchHistoryEntry>, SearchError>;

    /// Delete a user's history.
    async fn clear(&self, user_id: i64) -> Result<(), SearchError>;

    /// Popular prior queries matching a prefix, most frequent first.
    async fn top_queries(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>, SearchError>;
}

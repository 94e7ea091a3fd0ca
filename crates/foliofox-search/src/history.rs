//! In-memory search history.
//!
//! Reference implementation of `SearchHistoryPort`: a bounded ring of
//! entries backing history listing and the suggestion lookup. A durable
//! implementation is an external collaborator behind the same port.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use foliofox_core::ports::{SearchHistoryEntry, SearchHistoryPort};
use foliofox_core::search::{SearchError, Suggestion};

/// Bounded in-memory history store.
pub struct MemorySearchHistory {
    capacity: usize,
    entries: RwLock<VecDeque<SearchHistoryEntry>>,
}

impl MemorySearchHistory {
    /// Create a store keeping at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::new()),
        }
    }
}

impl Default for MemorySearchHistory {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl SearchHistoryPort for MemorySearchHistory {
    async fn record(&self, entry: SearchHistoryEntry) -> Result<(), SearchError> {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        Ok(())
    }

    async fn list(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<SearchHistoryEntry>, SearchError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear(&self, user_id: i64) -> Result<(), SearchError> {
        let mut entries = self.entries.write().await;
        entries.retain(|entry| entry.user_id != user_id);
        Ok(())
    }

    async fn top_queries(
        &self,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>, SearchError> {
        let prefix = prefix.trim().to_lowercase();
        let entries = self.entries.read().await;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for entry in entries.iter() {
            let normalized = entry.query.trim().to_lowercase();
            if normalized.starts_with(&prefix) {
                *counts.entry(normalized).or_insert(0) += 1;
            }
        }

        let mut suggestions: Vec<Suggestion> = counts
            .into_iter()
            .map(|(query, occurrences)| Suggestion { query, occurrences })
            .collect();
        suggestions.sort_by(|a, b| {
            b.occurrences
                .cmp(&a.occurrences)
                .then_with(|| a.query.cmp(&b.query))
        });
        suggestions.truncate(limit);
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foliofox_core::indexer::IndexerId;

    fn entry(user_id: i64, query: &str) -> SearchHistoryEntry {
        SearchHistoryEntry::new(user_id, query, 5, vec![IndexerId(1)])
    }

    #[tokio::test]
    async fn list_is_per_user_and_newest_first() {
        let history = MemorySearchHistory::default();
        history.record(entry(1, "first")).await.unwrap();
        history.record(entry(2, "other user")).await.unwrap();
        history.record(entry(1, "second")).await.unwrap();

        let listed = history.list(1, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].query, "second");
        assert_eq!(listed[1].query, "first");
    }

    #[tokio::test]
    async fn clear_removes_only_that_user() {
        let history = MemorySearchHistory::default();
        history.record(entry(1, "mine")).await.unwrap();
        history.record(entry(2, "theirs")).await.unwrap();

        history.clear(1).await.unwrap();

        assert!(history.list(1, 10).await.unwrap().is_empty());
        assert_eq!(history.list(2, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn top_queries_ranks_by_frequency() {
        let history = MemorySearchHistory::default();
        for _ in 0..3 {
            history.record(entry(1, "le guin")).await.unwrap();
        }
        history.record(entry(2, "Le Guin")).await.unwrap();
        history.record(entry(1, "lem")).await.unwrap();
        history.record(entry(1, "dune")).await.unwrap();

        let suggestions = history.top_queries("le", 10).await.unwrap();
        assert_eq!(suggestions[0].query, "le guin");
        // Case-insensitive: both users' spellings count together.
        assert_eq!(suggestions[0].occurrences, 4);
        assert_eq!(suggestions[1].query, "lem");
        assert!(!suggestions.iter().any(|s| s.query == "dune"));
    }

    #[tokio::test]
    async fn capacity_drops_oldest() {
        let history = MemorySearchHistory::new(2);
        history.record(entry(1, "a")).await.unwrap();
        history.record(entry(1, "b")).await.unwrap();
        history.record(entry(1, "c")).await.unwrap();

        let listed = history.list(1, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].query, "c");
    }
}

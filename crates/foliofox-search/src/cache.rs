//! TTL cache for merged search responses.
//!
//! Keyed by the query signature. Entries expire after the configured TTL
//! and the oldest entries are evicted once the capacity is reached
//! (insertion order, which is age order here).

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use foliofox_core::search::{QuerySignature, SearchResponse};

struct CacheEntry {
    stored_at: Instant,
    response: SearchResponse,
}

/// In-memory result cache.
pub struct SearchCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<IndexMap<QuerySignature, CacheEntry>>,
}

impl SearchCache {
    /// Create a cache with the given TTL and capacity.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Look up a non-expired response. The returned clone is flagged
    /// `cached`; an expired entry is removed on the way out.
    pub fn get(&self, signature: &QuerySignature) -> Option<SearchResponse> {
        let mut entries = self.entries.lock().expect("search cache poisoned");

        let expired = entries
            .get(signature)
            .is_some_and(|entry| entry.stored_at.elapsed() > self.ttl);
        if expired {
            entries.shift_remove(signature);
            return None;
        }

        entries.get(signature).map(|entry| {
            let mut response = entry.response.clone();
            response.cached = true;
            response
        })
    }

    /// Store a response, evicting the oldest entries beyond capacity.
    pub fn insert(&self, signature: QuerySignature, response: &SearchResponse) {
        let mut entries = self.entries.lock().expect("search cache poisoned");

        let mut stored = response.clone();
        stored.cached = false;
        entries.insert(
            signature,
            CacheEntry {
                stored_at: Instant::now(),
                response: stored,
            },
        );

        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    /// Number of live entries (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.entries.lock().expect("search cache poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foliofox_core::search::SearchRequest;

    fn response(count: usize) -> SearchResponse {
        SearchResponse {
            results: vec![],
            total_count: count,
            indexers_searched: vec![],
            indexers_failed: vec![],
            elapsed_ms: 10,
            cached: false,
        }
    }

    fn signature(query: &str) -> QuerySignature {
        QuerySignature::compute(&SearchRequest::new(query))
    }

    #[test]
    fn hit_is_flagged_cached() {
        let cache = SearchCache::new(Duration::from_secs(60), 10);
        cache.insert(signature("a"), &response(3));

        let hit = cache.get(&signature("a")).unwrap();
        assert!(hit.cached);
        assert_eq!(hit.total_count, 3);
    }

    #[test]
    fn miss_on_different_signature() {
        let cache = SearchCache::new(Duration::from_secs(60), 10);
        cache.insert(signature("a"), &response(3));
        assert!(cache.get(&signature("b")).is_none());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = SearchCache::new(Duration::from_millis(10), 10);
        cache.insert(signature("a"), &response(3));

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get(&signature("a")).is_none());
        // The expired entry was dropped on lookup.
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let cache = SearchCache::new(Duration::from_secs(60), 2);
        cache.insert(signature("a"), &response(1));
        cache.insert(signature("b"), &response(2));
        cache.insert(signature("c"), &response(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&signature("a")).is_none());
        assert!(cache.get(&signature("b")).is_some());
        assert!(cache.get(&signature("c")).is_some());
    }
}

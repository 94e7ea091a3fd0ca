#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

mod aggregator;
mod cache;
mod history;
mod merge;

// ============================================================================
// Public API
// ============================================================================

pub use aggregator::SearchAggregator;
pub use cache::SearchCache;
pub use history::MemorySearchHistory;
pub use merge::{apply_post_filters, merge_results};

// Re-export core types for convenience
pub use foliofox_core::search::{
    IndexerFailure, QuerySignature, SearchError, SearchFilters, SearchRequest, SearchResponse,
    SearchResult, Suggestion,
};

//! Search request/response types.
//!
//! Pure data; the aggregation logic lives in `foliofox-search`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download::BookFormat;
use crate::indexer::IndexerId;

/// Default result cap when a request leaves the limit unspecified.
pub const DEFAULT_RESULT_LIMIT: usize = 50;

/// A user search to be fanned out across indexers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Restrict the fan-out to these indexers. `None` means all indexers
    /// enabled for the user and currently accepting work.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_ids: Option<Vec<IndexerId>>,
    /// Post-filters applied after the merge.
    #[serde(default)]
    pub filters: SearchFilters,
    /// Serve from the result cache when a fresh entry exists.
    pub use_cache: bool,
    /// Overall timeout in seconds; per-indexer calls are additionally
    /// bounded by the indexer's own timeout, whichever is smaller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Maximum number of merged results to return.
    pub limit: usize,
}

impl SearchRequest {
    /// Create a request with defaults (cache on, default limit).
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            indexer_ids: None,
            filters: SearchFilters::default(),
            use_cache: true,
            timeout_secs: None,
            limit: DEFAULT_RESULT_LIMIT,
        }
    }

    /// Restrict the fan-out to a subset of indexers.
    #[must_use]
    pub fn with_indexers(mut self, ids: Vec<IndexerId>) -> Self {
        self.indexer_ids = Some(ids);
        self
    }

    /// Set the post-filters.
    #[must_use]
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Bypass or use the result cache.
    #[must_use]
    pub const fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the overall timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the result cap.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Post-filters for merged search results.
///
/// Applied after the fan-out and merge, never before, so filtering cannot
/// silently starve the fan-out.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Accept only these formats. Empty means any.
    #[serde(default)]
    pub formats: Vec<BookFormat>,
    /// Accept only these languages (lowercase ISO codes). Empty means any.
    #[serde(default)]
    pub languages: Vec<String>,
    /// Minimum quality score (0-100).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<u8>,
    /// Maximum file size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
}

impl SearchFilters {
    /// Whether no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
            && self.languages.is_empty()
            && self.min_quality.is_none()
            && self.max_size_bytes.is_none()
    }

    /// Whether a merged result passes the filters.
    #[must_use]
    pub fn matches(&self, result: &SearchResult) -> bool {
        if !self.formats.is_empty() && !self.formats.contains(&result.file_format) {
            return false;
        }
        if !self.languages.is_empty() {
            match &result.language {
                Some(lang) if self.languages.iter().any(|l| l.eq_ignore_ascii_case(lang)) => {}
                _ => return false,
            }
        }
        if let Some(min) = self.min_quality {
            if result.quality_score < min {
                return false;
            }
        }
        if let Some(max) = self.max_size_bytes {
            match result.file_size_bytes {
                Some(size) if size <= max => {}
                // Unknown sizes are kept; the user asked for a cap, not
                // for dropping results the indexer didn't size.
                None => {}
                _ => return false,
            }
        }
        true
    }

    /// Canonical string used in the query signature.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        let mut formats: Vec<&str> = self.formats.iter().map(BookFormat::as_str).collect();
        formats.sort_unstable();
        let mut languages: Vec<String> =
            self.languages.iter().map(|l| l.to_lowercase()).collect();
        languages.sort_unstable();

        format!(
            "formats={};languages={};min_quality={};max_size={}",
            formats.join(","),
            languages.join(","),
            self.min_quality.map_or_else(String::new, |q| q.to_string()),
            self.max_size_bytes
                .map_or_else(String::new, |s| s.to_string()),
        )
    }
}

/// One match from one indexer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    /// The indexer that produced the match.
    pub indexer_id: IndexerId,
    pub title: String,
    pub author: String,
    pub file_format: BookFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    /// Indexer-reported quality score, 0-100.
    pub quality_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Direct download URL.
    pub download_url: String,
    /// Relevance score used for ranking, higher is better.
    pub relevance_score: f64,
    pub found_at: DateTime<Utc>,
}

impl SearchResult {
    /// Deduplication key: normalized `title|author|format`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!(
            "{}|{}|{}",
            normalize(&self.title),
            normalize(&self.author),
            self.file_format.as_str()
        )
    }
}

/// Normalize a display string for dedup comparison: lowercase,
/// alphanumerics only, whitespace collapsed.
fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Reason an indexer dropped out of a fan-out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexerFailure {
    pub indexer_id: IndexerId,
    pub reason: String,
}

/// The merged outcome of a fan-out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Merged, deduplicated, ranked, post-filtered results.
    pub results: Vec<SearchResult>,
    /// Match count before the limit was applied.
    pub total_count: usize,
    /// Indexers that returned results.
    pub indexers_searched: Vec<IndexerId>,
    /// Indexers that errored, timed out or were rate limited.
    pub indexers_failed: Vec<IndexerFailure>,
    /// Wall-clock duration of the search.
    pub elapsed_ms: u64,
    /// Whether this response was served from the result cache.
    pub cached: bool,
}

/// A popular prior query offered as a suggestion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Suggestion {
    pub query: String,
    /// How many times the query was run.
    pub occurrences: u64,
}

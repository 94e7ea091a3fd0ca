//! Wire types for the indexer API and the HTTP client configuration.

use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use foliofox_core::download::BookFormat;
use foliofox_core::indexer::Indexer;
use foliofox_core::search::SearchResult;

/// HTTP-level configuration for indexer calls.
#[derive(Debug, Clone)]
pub struct IndexerClientConfig {
    /// Connect/read timeout applied by the HTTP client itself; individual
    /// calls are additionally bounded by the indexer's configured timeout.
    pub request_timeout: Duration,
    /// Retries for transient errors (5xx, network).
    pub max_retries: u8,
    /// Base delay for the exponential retry backoff.
    pub retry_base_delay_ms: u64,
}

impl Default for IndexerClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay_ms: 500,
        }
    }
}

/// Search response as indexers return it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSearchResponse {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub results: Vec<ApiSearchItem>,
}

/// One raw search match.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSearchItem {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub quality: Option<u8>,
    #[serde(default)]
    pub language: Option<String>,
    pub download_url: String,
    #[serde(default)]
    pub score: Option<f64>,
}

impl ApiSearchItem {
    /// Convert a raw match into a domain result.
    ///
    /// Format falls back to sniffing the download URL; missing quality
    /// scores become mid-scale so a sparse indexer is not ranked out.
    #[must_use]
    pub fn into_search_result(self, indexer: &Indexer) -> SearchResult {
        let file_format = self
            .format
            .as_deref()
            .and_then(|f| f.parse::<BookFormat>().ok())
            .unwrap_or_else(|| BookFormat::from_filename(&self.download_url));

        SearchResult {
            indexer_id: indexer.id,
            title: self.title,
            author: self.author.unwrap_or_default(),
            file_format,
            file_size_bytes: self.size_bytes,
            quality_score: self.quality.unwrap_or(50).min(100),
            language: self.language,
            download_url: self.download_url,
            relevance_score: self.score.unwrap_or(0.0),
            found_at: Utc::now(),
        }
    }
}

/// Capabilities response used by the health probe.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCapsResponse {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

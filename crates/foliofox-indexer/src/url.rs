//! URL construction helpers for indexer APIs.
//!
//! Pure functions for building indexer API URLs, ensuring consistent
//! construction across all calls.

use url::Url;

use foliofox_core::indexer::Indexer;
use foliofox_core::search::SearchRequest;

use crate::error::IndexerResult;

/// Build the search URL for one indexer.
///
/// The query is percent-encoded; the format filter is forwarded when the
/// request names exactly the formats the indexer should constrain on
/// server-side (results are post-filtered again after the merge either
/// way).
pub fn build_search_url(indexer: &Indexer, request: &SearchRequest) -> IndexerResult<Url> {
    let mut url = Url::parse(&indexer.base_url)?;

    {
        let base_path = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base_path}/search"));
    }

    let mut query_string = format!(
        "q={}&limit={}",
        urlencoding::encode(request.query.trim()),
        request.limit.clamp(1, 100)
    );

    if !request.filters.formats.is_empty() {
        let formats: Vec<&str> = request
            .filters
            .formats
            .iter()
            .map(foliofox_core::download::BookFormat::as_str)
            .collect();
        query_string.push_str(&format!("&formats={}", formats.join(",")));
    }

    url.set_query(Some(&query_string));
    Ok(url)
}

/// Build the capabilities URL used by the health probe.
pub fn build_caps_url(indexer: &Indexer) -> IndexerResult<Url> {
    let mut url = Url::parse(&indexer.base_url)?;
    let base_path = url.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base_path}/caps"));
    Ok(url)
}

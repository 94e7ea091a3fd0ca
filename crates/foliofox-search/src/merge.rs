//! Merging, deduplication and ranking of fan-out results.

use std::cmp::Ordering;
use std::collections::HashMap;

use foliofox_core::search::{SearchFilters, SearchResult};

/// Merge per-indexer result lists into one deduplicated, ranked list.
///
/// Duplicates (same normalized title+author+format) keep the copy with
/// the higher relevance score, ties broken by quality. Ranking is
/// relevance descending, then quality, then title for stability.
pub fn merge_results(per_indexer: Vec<Vec<SearchResult>>) -> Vec<SearchResult> {
    let mut best: HashMap<String, SearchResult> = HashMap::new();

    for result in per_indexer.into_iter().flatten() {
        let key = result.dedup_key();
        match best.get(&key) {
            Some(existing) if !beats(&result, existing) => {}
            _ => {
                best.insert(key, result);
            }
        }
    }

    let mut merged: Vec<SearchResult> = best.into_values().collect();
    merged.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.quality_score.cmp(&a.quality_score))
            .then_with(|| a.title.cmp(&b.title))
    });
    merged
}

fn beats(candidate: &SearchResult, incumbent: &SearchResult) -> bool {
    match candidate
        .relevance_score
        .partial_cmp(&incumbent.relevance_score)
    {
        Some(Ordering::Greater) => true,
        Some(Ordering::Equal) => candidate.quality_score > incumbent.quality_score,
        _ => false,
    }
}

/// Apply the request filters after the merge.
///
/// Filtering is a post-step so a narrow filter can never starve the
/// fan-out itself.
pub fn apply_post_filters(filters: &SearchFilters, results: Vec<SearchResult>) -> Vec<SearchResult> {
    if filters.is_empty() {
        return results;
    }
    results
        .into_iter()
        .filter(|result| filters.matches(result))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use foliofox_core::download::BookFormat;
    use foliofox_core::indexer::IndexerId;

    fn result(
        indexer: i64,
        title: &str,
        relevance: f64,
        quality: u8,
        format: BookFormat,
    ) -> SearchResult {
        SearchResult {
            indexer_id: IndexerId(indexer),
            title: title.to_string(),
            author: "Le Guin".to_string(),
            file_format: format,
            file_size_bytes: Some(1000),
            quality_score: quality,
            language: Some("en".to_string()),
            download_url: format!("https://i{indexer}.example/dl"),
            relevance_score: relevance,
            found_at: Utc::now(),
        }
    }

    #[test]
    fn duplicates_keep_higher_relevance() {
        let merged = merge_results(vec![
            vec![result(1, "The Dispossessed", 0.5, 80, BookFormat::Epub)],
            vec![result(2, "The Dispossessed", 0.9, 60, BookFormat::Epub)],
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].indexer_id, IndexerId(2));
    }

    #[test]
    fn same_title_different_format_is_not_a_duplicate() {
        let merged = merge_results(vec![
            vec![result(1, "The Dispossessed", 0.5, 80, BookFormat::Epub)],
            vec![result(2, "The Dispossessed", 0.9, 60, BookFormat::Pdf)],
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn ranking_is_relevance_then_quality() {
        let merged = merge_results(vec![vec![
            result(1, "B", 0.5, 90, BookFormat::Epub),
            result(1, "A", 0.9, 10, BookFormat::Epub),
            result(1, "C", 0.5, 95, BookFormat::Pdf),
        ]]);

        assert_eq!(merged[0].title, "A");
        assert_eq!(merged[1].title, "C"); // same relevance, higher quality
        assert_eq!(merged[2].title, "B");
    }

    #[test]
    fn post_filters_drop_non_matching() {
        let filters = SearchFilters {
            formats: vec![BookFormat::Epub],
            ..Default::default()
        };
        let filtered = apply_post_filters(
            &filters,
            vec![
                result(1, "A", 0.9, 80, BookFormat::Epub),
                result(1, "B", 0.8, 80, BookFormat::Pdf),
            ],
        );

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "A");
    }
}

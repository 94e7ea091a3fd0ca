//! Stable query signatures.
//!
//! A signature is a SHA-256 digest over the normalized query text, the
//! canonicalized filters and the sorted indexer subset. It keys both the
//! result cache and the deduplication of in-flight identical queries.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::types::SearchRequest;

/// Stable key for a search request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuerySignature(String);

impl QuerySignature {
    /// Compute the signature for a request.
    ///
    /// `use_cache`, `timeout_secs` and `limit` are deliberately excluded:
    /// they change how a search runs, not what it asks for.
    #[must_use]
    pub fn compute(request: &SearchRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_query(&request.query).as_bytes());
        hasher.update(b"\x1f");
        hasher.update(request.filters.canonical_string().as_bytes());
        hasher.update(b"\x1f");

        if let Some(ids) = &request.indexer_ids {
            let mut sorted: Vec<i64> = ids.iter().map(|id| id.0).collect();
            sorted.sort_unstable();
            for id in sorted {
                hasher.update(id.to_le_bytes());
            }
        }

        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in digest {
            use fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough for log correlation.
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

/// Normalize query text: trim, lowercase, collapse internal whitespace.
fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexerId;

    #[test]
    fn whitespace_and_case_do_not_change_signature() {
        let a = QuerySignature::compute(&SearchRequest::new("  The  Dispossessed "));
        let b = QuerySignature::compute(&SearchRequest::new("the dispossessed"));
        assert_eq!(a, b);
    }

    #[test]
    fn indexer_subset_order_does_not_change_signature() {
        let a = QuerySignature::compute(
            &SearchRequest::new("le guin").with_indexers(vec![IndexerId(2), IndexerId(1)]),
        );
        let b = QuerySignature::compute(
            &SearchRequest::new("le guin").with_indexers(vec![IndexerId(1), IndexerId(2)]),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn subset_changes_signature() {
        let all = QuerySignature::compute(&SearchRequest::new("le guin"));
        let subset = QuerySignature::compute(
            &SearchRequest::new("le guin").with_indexers(vec![IndexerId(1)]),
        );
        assert_ne!(all, subset);
    }

    #[test]
    fn cache_flag_does_not_change_signature() {
        let a = QuerySignature::compute(&SearchRequest::new("le guin").with_cache(false));
        let b = QuerySignature::compute(&SearchRequest::new("le guin").with_cache(true));
        assert_eq!(a, b);
    }
}

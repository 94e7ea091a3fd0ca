//! Search domain: requests, responses, filters and query signatures.

mod errors;
mod signature;
mod types;

pub use errors::SearchError;
pub use signature::QuerySignature;
pub use types::{
    IndexerFailure, SearchFilters, SearchRequest, SearchResponse, SearchResult, Suggestion,
    DEFAULT_RESULT_LIMIT,
};

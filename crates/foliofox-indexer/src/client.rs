//! Indexer client: search and capability probe over an `HttpBackend`.

use std::time::{Duration, Instant};

use async_trait::async_trait;

use foliofox_core::indexer::Indexer;
use foliofox_core::ports::{IndexerClientPort, IndexerPortError, ProbeOutcome};
use foliofox_core::search::{SearchRequest, SearchResult};

use crate::error::IndexerResult;
use crate::http::{HttpBackend, ReqwestBackend};
use crate::models::{ApiCapsResponse, ApiSearchResponse, IndexerClientConfig};
use crate::url::{build_caps_url, build_search_url};

/// Deadline for capability probes; kept short so a wedged indexer is
/// reported `Down` quickly.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for indexer APIs, generic over the HTTP backend.
pub struct IndexerClient<B: HttpBackend> {
    backend: B,
}

/// The production client type.
pub type DefaultIndexerClient = IndexerClient<ReqwestBackend>;

impl DefaultIndexerClient {
    /// Create a client with the reqwest backend.
    #[must_use]
    pub fn new(config: &IndexerClientConfig) -> Self {
        Self {
            backend: ReqwestBackend::new(config),
        }
    }
}

impl<B: HttpBackend> IndexerClient<B> {
    /// Create a client over an explicit backend (used by tests).
    pub const fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    async fn search_inner(
        &self,
        indexer: &Indexer,
        request: &SearchRequest,
    ) -> IndexerResult<Vec<SearchResult>> {
        let url = build_search_url(indexer, request)?;
        let timeout = Duration::from_secs(indexer.timeout_secs);

        let response: ApiSearchResponse = self
            .backend
            .get_json(&url, indexer.api_key.as_deref(), timeout)
            .await?;

        tracing::debug!(
            indexer = %indexer.name,
            matches = response.results.len(),
            "Indexer search returned"
        );

        Ok(response
            .results
            .into_iter()
            .map(|item| item.into_search_result(indexer))
            .collect())
    }

    async fn probe_inner(&self, indexer: &Indexer) -> IndexerResult<ProbeOutcome> {
        let url = build_caps_url(indexer)?;
        let started = Instant::now();

        let _caps: ApiCapsResponse = self
            .backend
            .get_json(&url, indexer.api_key.as_deref(), PROBE_TIMEOUT)
            .await?;

        Ok(ProbeOutcome {
            response_time: started.elapsed(),
        })
    }
}

#[async_trait]
impl<B: HttpBackend> IndexerClientPort for IndexerClient<B> {
    async fn search(
        &self,
        indexer: &Indexer,
        request: &SearchRequest,
    ) -> Result<Vec<SearchResult>, IndexerPortError> {
        self.search_inner(indexer, request)
            .await
            .map_err(crate::error::IndexerError::into_port_error)
    }

    async fn probe(&self, indexer: &Indexer) -> Result<ProbeOutcome, IndexerPortError> {
        self.probe_inner(indexer)
            .await
            .map_err(crate::error::IndexerError::into_port_error)
    }
}

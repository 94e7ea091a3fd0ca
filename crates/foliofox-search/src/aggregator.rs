//! The search aggregator.
//!
//! Fans one query out concurrently to every candidate indexer, tolerates
//! partial failures, merges and caches the outcome. Cancellation and the
//! per-indexer timeout are explicit: every fan-out task is bounded by the
//! smaller of the request timeout and the indexer's own, and the join is
//! a wait-all-or-timeout barrier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinSet;

use foliofox_core::config::SearchConfig;
use foliofox_core::indexer::{Indexer, IndexerId};
use foliofox_core::ports::{
    IndexerClientPort, IndexerPortError, IndexerRegistryPort, SearchHistoryEntry,
    SearchHistoryPort,
};
use foliofox_core::search::{
    IndexerFailure, QuerySignature, SearchError, SearchRequest, SearchResponse, Suggestion,
};
use foliofox_indexer::RateLimiterSet;

use crate::cache::SearchCache;
use crate::history::MemorySearchHistory;
use crate::merge::{apply_post_filters, merge_results};

type InflightReceiver = watch::Receiver<Option<Arc<SearchResponse>>>;

/// Multi-indexer search front end.
pub struct SearchAggregator {
    registry: Arc<dyn IndexerRegistryPort>,
    client: Arc<dyn IndexerClientPort>,
    limiters: Arc<RateLimiterSet>,
    history: Arc<dyn SearchHistoryPort>,
    cache: SearchCache,
    config: SearchConfig,
    /// In-flight fan-outs keyed by query signature; followers await the
    /// leader's response instead of re-querying the indexers.
    in_flight: Mutex<HashMap<QuerySignature, InflightReceiver>>,
}

impl SearchAggregator {
    /// Create an aggregator over the given collaborators.
    pub fn new(
        registry: Arc<dyn IndexerRegistryPort>,
        client: Arc<dyn IndexerClientPort>,
        limiters: Arc<RateLimiterSet>,
        history: Arc<dyn SearchHistoryPort>,
        config: SearchConfig,
    ) -> Self {
        let cache = SearchCache::new(config.cache_ttl, config.cache_capacity);
        Self {
            registry,
            client,
            limiters,
            history,
            cache,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Create an aggregator with an in-memory history store.
    pub fn with_memory_history(
        registry: Arc<dyn IndexerRegistryPort>,
        client: Arc<dyn IndexerClientPort>,
        config: SearchConfig,
    ) -> Self {
        Self::new(
            registry,
            client,
            Arc::new(RateLimiterSet::new()),
            Arc::new(MemorySearchHistory::default()),
            config,
        )
    }

    /// Run a search for a user.
    pub async fn search(
        &self,
        user_id: i64,
        request: SearchRequest,
    ) -> Result<SearchResponse, SearchError> {
        let started = Instant::now();
        let signature = QuerySignature::compute(&request);

        if request.use_cache {
            if let Some(hit) = self.cache.get(&signature) {
                tracing::debug!(signature = %signature, "Search served from cache");
                return Ok(hit);
            }
        }

        // In-flight dedup: one leader executes, followers wait.
        enum Role {
            Leader(watch::Sender<Option<Arc<SearchResponse>>>),
            Follower(InflightReceiver),
        }

        let role = {
            let mut in_flight = self.in_flight.lock().expect("in-flight map poisoned");
            if let Some(rx) = in_flight.get(&signature) {
                Role::Follower(rx.clone())
            } else {
                let (tx, rx) = watch::channel(None);
                in_flight.insert(signature.clone(), rx);
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => {
                tracing::debug!(signature = %signature, "Joining in-flight search");
                loop {
                    if let Some(response) = rx.borrow_and_update().clone() {
                        return Ok((*response).clone());
                    }
                    if rx.changed().await.is_err() {
                        // The leader failed; run the fan-out ourselves.
                        break;
                    }
                }
                self.execute(user_id, &request, &signature, started).await
            }
            Role::Leader(tx) => {
                let result = self.execute(user_id, &request, &signature, started).await;
                self.in_flight
                    .lock()
                    .expect("in-flight map poisoned")
                    .remove(&signature);
                if let Ok(response) = &result {
                    let _ = tx.send(Some(Arc::new(response.clone())));
                }
                result
            }
        }
    }

    /// Suggestions from prior popular queries; never re-queries indexers.
    pub async fn suggestions(
        &self,
        query_prefix: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>, SearchError> {
        self.history.top_queries(query_prefix, limit).await
    }

    /// A user's search history, newest first.
    pub async fn history(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<SearchHistoryEntry>, SearchError> {
        self.history.list(user_id, limit).await
    }

    /// Delete a user's search history.
    pub async fn clear_history(&self, user_id: i64) -> Result<(), SearchError> {
        self.history.clear(user_id).await
    }

    /// Run the fan-out, merge and cache the outcome.
    async fn execute(
        &self,
        user_id: i64,
        request: &SearchRequest,
        signature: &QuerySignature,
        started: Instant,
    ) -> Result<SearchResponse, SearchError> {
        let candidates = self.candidates(user_id, request).await?;
        if candidates.is_empty() {
            return Err(SearchError::NoIndexersAvailable);
        }

        let overall_timeout = request
            .timeout_secs
            .map_or(self.config.default_timeout, Duration::from_secs);

        let mut failures: Vec<IndexerFailure> = Vec::new();
        let mut join_set: JoinSet<(IndexerId, Result<Vec<_>, String>)> = JoinSet::new();

        for indexer in candidates {
            // Fail fast on a saturated limiter: the indexer is dropped
            // from this fan-out rather than stalling the whole search.
            let limiter = self.limiters.limiter_for(&indexer);
            if let Err(retry_after) = limiter.try_acquire() {
                tracing::debug!(indexer = %indexer.name, "Rate limited, dropped from fan-out");
                failures.push(IndexerFailure {
                    indexer_id: indexer.id,
                    reason: IndexerPortError::RateLimited {
                        retry_after_secs: retry_after.as_secs().max(1),
                    }
                    .to_string(),
                });
                continue;
            }

            let client = Arc::clone(&self.client);
            let fan_request = request.clone();
            let per_timeout = overall_timeout.min(Duration::from_secs(indexer.timeout_secs));

            join_set.spawn(async move {
                let id = indexer.id;
                let outcome =
                    tokio::time::timeout(per_timeout, client.search(&indexer, &fan_request)).await;
                let mapped = match outcome {
                    Ok(Ok(results)) => Ok(results),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}s", per_timeout.as_secs())),
                };
                (id, mapped)
            });
        }

        let mut searched: Vec<IndexerId> = Vec::new();
        let mut per_indexer: Vec<Vec<_>> = Vec::new();

        // Wait-all-or-timeout barrier over the fan-out. Each task is
        // individually deadline-bounded, so this rarely fires.
        let collection = async {
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((id, Ok(results))) => {
                        searched.push(id);
                        per_indexer.push(results);
                    }
                    Ok((id, Err(reason))) => {
                        tracing::warn!(indexer_id = %id, reason = %reason, "Indexer dropped from search");
                        failures.push(IndexerFailure {
                            indexer_id: id,
                            reason,
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Fan-out task panicked");
                    }
                }
            }
        };

        if tokio::time::timeout(overall_timeout + Duration::from_secs(1), collection)
            .await
            .is_err()
        {
            join_set.abort_all();
            return Err(SearchError::Timeout {
                secs: overall_timeout.as_secs(),
            });
        }

        if searched.is_empty() {
            tracing::warn!(signature = %signature, "Every candidate indexer failed");
            return Err(SearchError::NoIndexersAvailable);
        }
        searched.sort_unstable();

        let merged = merge_results(per_indexer);
        let mut results = apply_post_filters(&request.filters, merged);
        let total_count = results.len();
        results.truncate(request.limit.min(self.config.max_results));

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let response = SearchResponse {
            results,
            total_count,
            indexers_searched: searched.clone(),
            indexers_failed: failures,
            elapsed_ms,
            cached: false,
        };

        self.cache.insert(signature.clone(), &response);

        let entry = SearchHistoryEntry::new(user_id, request.query.clone(), total_count, searched);
        if let Err(e) = self.history.record(entry).await {
            tracing::warn!(error = %e, "Failed to record search history");
        }

        tracing::info!(
            signature = %signature,
            results = response.results.len(),
            indexers = response.indexers_searched.len(),
            failed = response.indexers_failed.len(),
            elapsed_ms,
            "Search completed"
        );

        Ok(response)
    }

    /// Candidate set: the explicit subset when given, else all indexers
    /// enabled for the user; either way minus indexers whose current
    /// health refuses new work. Never-probed indexers are included.
    async fn candidates(
        &self,
        user_id: i64,
        request: &SearchRequest,
    ) -> Result<Vec<Indexer>, SearchError> {
        let base: Vec<Indexer> = if let Some(ids) = &request.indexer_ids {
            let mut selected = Vec::with_capacity(ids.len());
            for id in ids {
                match self.registry.get(*id).await {
                    Ok(indexer) if indexer.enabled => selected.push(indexer),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(indexer_id = %id, error = %e, "Requested indexer unknown");
                    }
                }
            }
            selected
        } else {
            self.registry
                .list_for_user(user_id)
                .await
                .map_err(|_| SearchError::NoIndexersAvailable)?
        };

        let mut candidates = Vec::with_capacity(base.len());
        for indexer in base {
            let healthy = match self.registry.current_health(indexer.id).await {
                Ok(Some(health)) => health.status.accepts_new_work(),
                Ok(None) => true,
                Err(_) => true,
            };
            if healthy {
                candidates.push(indexer);
            } else {
                tracing::debug!(indexer = %indexer.name, "Unhealthy, excluded from fan-out");
            }
        }
        Ok(candidates)
    }
}

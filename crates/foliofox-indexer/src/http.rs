//! HTTP backend abstraction for indexer APIs.
//!
//! The client talks to indexers through a small injectable trait so
//! tests run against canned responses. The production backend is
//! reqwest with automatic retry for transient errors; credentials and
//! the timeout travel per call because one backend serves every
//! configured indexer.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{IndexerError, IndexerResult};
use crate::models::IndexerClientConfig;

/// Header carrying the indexer API key.
const API_KEY_HEADER: &str = "X-Api-Key";

/// Trait for HTTP backends that can fetch JSON from indexer URLs.
///
/// Each call carries the target indexer's credentials and timeout, so one
/// backend serves every configured indexer.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Fetch JSON from a URL and deserialize it.
    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        url: &Url,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> IndexerResult<T>;
}

/// Production backend over reqwest.
///
/// Transient failures (5xx, network errors) are retried with
/// exponential backoff; 4xx responses fail immediately.
pub struct ReqwestBackend {
    client: reqwest::Client,
    max_retries: u8,
    retry_base_delay_ms: u64,
}

impl ReqwestBackend {
    /// Create a backend from the client configuration.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized, which only
    /// happens on broken installs.
    #[must_use]
    pub fn new(config: &IndexerClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            client,
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
        }
    }

    /// Fetch a URL, retrying transient failures with backoff.
    async fn fetch_with_retry(
        &self,
        url: &Url,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> IndexerResult<reqwest::Response> {
        let mut last_error: Option<IndexerError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(
                    self.retry_base_delay_ms * 2u64.pow(u32::from(attempt) - 1),
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.get(url.as_str()).timeout(timeout);
            if let Some(key) = api_key {
                request = request.header(API_KEY_HEADER, key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    // Server-side errors may clear up on a later attempt.
                    if status.is_server_error() && attempt < self.max_retries {
                        last_error = Some(IndexerError::ApiRequestFailed {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                        continue;
                    }

                    // 4xx, or the final attempt.
                    return Err(IndexerError::ApiRequestFailed {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(IndexerError::Timeout {
                            secs: timeout.as_secs(),
                        });
                    }
                    if attempt < self.max_retries {
                        last_error = Some(e.into());
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| IndexerError::InvalidResponse {
            message: "request failed with no recorded error".to_string(),
        }))
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        url: &Url,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> IndexerResult<T> {
        let response = self.fetch_with_retry(url, api_key, timeout).await?;
        let data: T = response.json().await?;
        Ok(data)
    }
}

// ============================================================================
// Fake Backend for Testing
// ============================================================================

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Canned response for the fake backend.
    #[derive(Clone)]
    pub struct CannedResponse {
        pub json: serde_json::Value,
        /// Simulated processing delay before answering.
        pub delay: Option<Duration>,
        /// HTTP status to fail with instead of answering.
        pub fail_status: Option<u16>,
    }

    impl CannedResponse {
        pub fn ok(json: serde_json::Value) -> Self {
            Self {
                json,
                delay: None,
                fail_status: None,
            }
        }

        pub fn error(status: u16) -> Self {
            Self {
                json: serde_json::Value::Null,
                delay: None,
                fail_status: Some(status),
            }
        }

        #[must_use]
        pub const fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    /// A fake HTTP backend that returns canned responses by URL substring.
    pub struct FakeBackend {
        responses: Arc<Mutex<HashMap<String, CannedResponse>>>,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self {
                responses: Arc::new(Mutex::new(HashMap::new())),
                calls: AtomicUsize::new(0),
            }
        }

        /// Add a canned response for a URL pattern.
        #[must_use]
        pub fn with_response(self, url_contains: &str, response: CannedResponse) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url_contains.to_string(), response);
            self
        }

        /// How many requests reached the backend.
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn find_response(&self, url: &str) -> Option<CannedResponse> {
            let responses = self.responses.lock().unwrap();
            responses
                .iter()
                .find(|(pattern, _)| url.contains(pattern.as_str()))
                .map(|(_, response)| response.clone())
        }
    }

    impl Default for FakeBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HttpBackend for FakeBackend {
        async fn get_json<T: DeserializeOwned + Send>(
            &self,
            url: &Url,
            _api_key: Option<&str>,
            timeout: Duration,
        ) -> IndexerResult<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let response =
                self.find_response(url.as_str())
                    .ok_or_else(|| IndexerError::ApiRequestFailed {
                        status: 404,
                        url: url.to_string(),
                    })?;

            if let Some(delay) = response.delay {
                if delay >= timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(IndexerError::Timeout {
                        secs: timeout.as_secs(),
                    });
                }
                tokio::time::sleep(delay).await;
            }

            if let Some(status) = response.fail_status {
                return Err(IndexerError::ApiRequestFailed {
                    status,
                    url: url.to_string(),
                });
            }

            serde_json::from_value(response.json).map_err(Into::into)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{CannedResponse, FakeBackend};
    use super::*;
    use serde_json::json;

    #[test]
    fn reqwest_backend_creation() {
        let config = IndexerClientConfig::default();
        let backend = ReqwestBackend::new(&config);
        assert_eq!(backend.max_retries, 2);
        assert_eq!(backend.retry_base_delay_ms, 500);
    }

    #[tokio::test]
    async fn fake_backend_returns_canned_response() {
        let backend = FakeBackend::new().with_response(
            "search",
            CannedResponse::ok(json!({"total": 1, "results": []})),
        );

        let url = Url::parse("https://indexer.example/api/search?q=test").unwrap();
        let result: serde_json::Value = backend
            .get_json(&url, None, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result["total"], 1);
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn fake_backend_404_for_unknown_url() {
        let backend = FakeBackend::new();
        let url = Url::parse("https://indexer.example/unknown").unwrap();

        let result: IndexerResult<serde_json::Value> =
            backend.get_json(&url, None, Duration::from_secs(5)).await;
        assert!(matches!(
            result,
            Err(IndexerError::ApiRequestFailed { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn fake_backend_times_out_when_delay_exceeds_deadline() {
        let backend = FakeBackend::new().with_response(
            "slow",
            CannedResponse::ok(json!({})).with_delay(Duration::from_secs(60)),
        );

        let url = Url::parse("https://indexer.example/slow").unwrap();
        let result: IndexerResult<serde_json::Value> =
            backend.get_json(&url, None, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(IndexerError::Timeout { .. })));
    }
}

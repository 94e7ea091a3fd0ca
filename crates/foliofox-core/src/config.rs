//! Engine configuration.
//!
//! Plain structs with defaults and builder-style setters. Infrastructure
//! concerns (paths, credentials) stay with the adapters that own them.

use std::time::Duration;

/// Configuration for the download manager.
#[derive(Debug, Clone)]
pub struct DownloadManagerConfig {
    /// Worker pool size; caps concurrent outbound transfers regardless of
    /// queue depth.
    pub max_concurrent: u32,
    /// Capacity of the bounded work channel between feeder and workers.
    pub work_channel_capacity: usize,
    /// Feeder tick interval.
    pub feeder_interval: Duration,
    /// Maximum items the feeder dispatches per tick.
    pub feeder_batch: usize,
    /// Fixed delay before a failed attempt re-enters scheduling.
    pub retry_delay: Duration,
    /// Per-download transfer deadline.
    pub transfer_timeout: Duration,
    /// Minimum interval between progress emissions per download.
    pub progress_interval: Duration,
    /// Buffer size of each subscriber's progress channel; sends beyond it
    /// are dropped.
    pub progress_buffer: usize,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            work_channel_capacity: 8,
            feeder_interval: Duration::from_secs(5),
            feeder_batch: 10,
            retry_delay: Duration::from_secs(300),
            transfer_timeout: Duration::from_secs(600),
            progress_interval: Duration::from_millis(250),
            progress_buffer: 16,
        }
    }
}

impl DownloadManagerConfig {
    /// Set the worker pool size.
    #[must_use]
    pub const fn with_max_concurrent(mut self, max: u32) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the feeder tick interval.
    #[must_use]
    pub const fn with_feeder_interval(mut self, interval: Duration) -> Self {
        self.feeder_interval = interval;
        self
    }

    /// Set the fixed retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the per-download transfer deadline.
    #[must_use]
    pub const fn with_transfer_timeout(mut self, timeout: Duration) -> Self {
        self.transfer_timeout = timeout;
        self
    }

    /// Set the progress emission interval.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

/// Configuration for the search aggregator.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Lifetime of cached responses.
    pub cache_ttl: Duration,
    /// Cached responses kept before the oldest are evicted.
    pub cache_capacity: usize,
    /// Overall search deadline when the request sets none.
    pub default_timeout: Duration,
    /// Hard cap on merged results regardless of the request limit.
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 256,
            default_timeout: Duration::from_secs(30),
            max_results: 200,
        }
    }
}

impl SearchConfig {
    /// Set the cache TTL.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the default search deadline.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_defaults_are_sane() {
        let config = DownloadManagerConfig::default();
        assert!(config.max_concurrent >= 1);
        assert!(config.retry_delay >= Duration::from_secs(60));
        assert!(config.work_channel_capacity >= config.max_concurrent as usize);
    }

    #[test]
    fn builders_override_fields() {
        let config = DownloadManagerConfig::default()
            .with_max_concurrent(8)
            .with_retry_delay(Duration::from_secs(120));
        assert_eq!(config.max_concurrent, 8);
        assert_eq!(config.retry_delay, Duration::from_secs(120));

        let search = SearchConfig::default().with_cache_ttl(Duration::from_secs(60));
        assert_eq!(search.cache_ttl, Duration::from_secs(60));
    }
}

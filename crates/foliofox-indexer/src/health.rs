//! Indexer health monitoring.
//!
//! One probe task per indexer on a fixed interval, independent of request
//! traffic. A probe is a lightweight capabilities request; its outcome is
//! classified by simple thresholds and appended to the registry's health
//! series, which gates search fan-out candidates and download admission.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use foliofox_core::indexer::{HealthStatus, Indexer, IndexerHealth};
use foliofox_core::ports::{IndexerClientPort, IndexerRegistryPort, RegistryError};

/// Configuration for the health monitor.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// How often each indexer is probed.
    pub probe_interval: Duration,
    /// Probes slower than this are classified `Degraded`.
    pub degraded_threshold: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(60),
            degraded_threshold: Duration::from_secs(2),
        }
    }
}

/// Periodic prober for every enabled indexer.
pub struct HealthMonitor {
    registry: Arc<dyn IndexerRegistryPort>,
    client: Arc<dyn IndexerClientPort>,
    config: HealthMonitorConfig,
    cancel: CancellationToken,
}

impl HealthMonitor {
    /// Create a monitor over the given registry and client.
    pub fn new(
        registry: Arc<dyn IndexerRegistryPort>,
        client: Arc<dyn IndexerClientPort>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            registry,
            client,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn one probe loop per enabled indexer. Probes an initial round
    /// immediately so health gating has data before the first interval
    /// elapses.
    pub async fn start(self: &Arc<Self>) -> Result<(), RegistryError> {
        let indexers = self.registry.list_enabled().await?;
        tracing::info!(count = indexers.len(), "Starting indexer health probes");

        for indexer in indexers {
            let monitor = Arc::clone(self);
            tokio::spawn(async move {
                monitor.probe_loop(indexer).await;
            });
        }
        Ok(())
    }

    /// Stop all probe loops.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn probe_loop(&self, indexer: Indexer) {
        let mut tick = interval(self.config.probe_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    tracing::debug!(indexer = %indexer.name, "Health probe loop stopped");
                    return;
                }

                _ = tick.tick() => {
                    self.probe_once(&indexer).await;
                }
            }
        }
    }

    /// Run one probe and record its outcome.
    ///
    /// `Maintenance` is operator-set and never overwritten by probes.
    pub async fn probe_once(&self, indexer: &Indexer) {
        match self.registry.current_health(indexer.id).await {
            Ok(Some(current)) if current.status == HealthStatus::Maintenance => {
                tracing::debug!(indexer = %indexer.name, "In maintenance, probe skipped");
                return;
            }
            Err(e) => {
                tracing::warn!(indexer = %indexer.name, error = %e, "Health lookup failed");
            }
            _ => {}
        }

        let record = match self.client.probe(indexer).await {
            Ok(outcome) => {
                #[allow(clippy::cast_possible_truncation)]
                let millis = outcome.response_time.as_millis() as u64;
                if outcome.response_time <= self.config.degraded_threshold {
                    IndexerHealth::healthy(indexer.id, millis)
                } else {
                    tracing::info!(
                        indexer = %indexer.name,
                        response_ms = millis,
                        "Indexer responding slowly"
                    );
                    IndexerHealth::degraded(indexer.id, millis)
                }
            }
            Err(e) => {
                tracing::warn!(indexer = %indexer.name, error = %e, "Indexer probe failed");
                IndexerHealth::down(indexer.id, e.to_string())
            }
        };

        if let Err(e) = self.registry.record_health(record).await {
            tracing::warn!(indexer = %indexer.name, error = %e, "Failed to record health");
        }
    }
}

//! Download manager.
//!
//! # Architecture
//!
//! - **Manager**: admission, the public pause/resume/cancel/retry
//!   contract, the active-transfer registry and the feeder
//! - **Worker**: claims items, executes transfers, applies the retry and
//!   terminal-failure policy (`worker` module)
//! - **Queue store**: single source of truth for status; the manager's
//!   in-memory registry only carries cancellation signals
//!
//! # Concurrency Model
//!
//! - Fixed pool of N workers (admission control: N caps concurrent
//!   transfers regardless of queue depth)
//! - Periodic feeder pulls dispatchable items ordered by
//!   `(priority, created_at)` into a bounded work channel; a full channel
//!   defers to the next tick
//! - Workers claim via the store's compare-and-set, so an item paused or
//!   cancelled while waiting in the channel is skipped
//! - Lock order: active registry before dispatched set, never inverted

mod worker;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use foliofox_core::config::DownloadManagerConfig;
use foliofox_core::download::{
    DownloadError, DownloadEvent, DownloadId, DownloadProgress, DownloadRequest, DownloadStatus,
    QueueItem, PRIORITY_MAX, PRIORITY_MIN,
};
use foliofox_core::ports::{
    EventSinkPort, HistoryRecord, IndexerRegistryPort, PreferencesPort, QueueFilter, QueueStorePort,
};
use foliofox_indexer::RateLimiterSet;

use crate::placement::PlacementResolver;
use crate::progress::ProgressBroadcaster;
use crate::transfer::TransferClient;

use worker::{ActiveHandle, CancelIntent, WorkerDeps};

/// One of the queue actions applied to a batch of download ids.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BatchAction {
    Pause,
    Resume,
    Cancel { delete_partial: bool },
    Retry,
}

/// Per-id outcome of a batch action. The batch call itself always
/// succeeds; failures are reported here.
#[derive(Clone, Debug, Serialize)]
pub struct BatchActionResult {
    pub id: DownloadId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dependencies for creating a download manager.
pub struct DownloadManagerDeps {
    /// Queue persistence (single source of truth for status).
    pub store: Arc<dyn QueueStorePort>,
    /// User preference store for folder resolution.
    pub prefs: Arc<dyn PreferencesPort>,
    /// Indexer registry for admission gating and rate-limit config.
    pub registry: Arc<dyn IndexerRegistryPort>,
    /// Transfer client performing the network I/O.
    pub transfer: Arc<dyn TransferClient>,
    /// Notification sink for events (best-effort).
    pub sink: Arc<dyn EventSinkPort>,
    /// Per-indexer rate limiters, shared with the search aggregator so
    /// both paths observe the same windows.
    pub limiters: Arc<RateLimiterSet>,
    /// Scheduler configuration.
    pub config: DownloadManagerConfig,
}

/// The download orchestration engine.
pub struct DownloadManager {
    store: Arc<dyn QueueStorePort>,
    registry: Arc<dyn IndexerRegistryPort>,
    placement: PlacementResolver,
    broadcaster: Arc<ProgressBroadcaster>,
    sink: Arc<dyn EventSinkPort>,
    limiters: Arc<RateLimiterSet>,
    config: DownloadManagerConfig,
    worker_deps: WorkerDeps,
    /// Active transfers keyed by download id. Arena-style: never exposed
    /// for external mutation, only cancellation signals cross the
    /// boundary. Never the source of truth for status.
    active: Mutex<std::collections::HashMap<DownloadId, ActiveHandle>>,
    /// Ids sitting in the work channel or being processed, so the feeder
    /// does not dispatch them twice while they are still `Pending`.
    dispatched: std::sync::Mutex<HashSet<DownloadId>>,
    work_tx: mpsc::Sender<QueueItem>,
    work_rx: Mutex<Option<mpsc::Receiver<QueueItem>>>,
    shutdown_token: CancellationToken,
    started: AtomicBool,
}

impl DownloadManager {
    /// Create a manager. Workers and the feeder start with [`start`].
    ///
    /// [`start`]: DownloadManager::start
    #[must_use]
    pub fn new(deps: DownloadManagerDeps) -> Arc<Self> {
        let (work_tx, work_rx) = mpsc::channel(deps.config.work_channel_capacity.max(1));
        let broadcaster = Arc::new(ProgressBroadcaster::new(
            Arc::clone(&deps.sink),
            deps.config.progress_buffer,
        ));

        let worker_deps = WorkerDeps {
            store: Arc::clone(&deps.store),
            prefs: Arc::clone(&deps.prefs),
            transfer: Arc::clone(&deps.transfer),
            broadcaster: Arc::clone(&broadcaster),
            sink: Arc::clone(&deps.sink),
            config: deps.config.clone(),
        };

        Arc::new(Self {
            store: deps.store,
            registry: deps.registry,
            placement: PlacementResolver::new(deps.prefs),
            broadcaster,
            sink: deps.sink,
            limiters: deps.limiters,
            config: deps.config,
            worker_deps,
            active: Mutex::new(std::collections::HashMap::new()),
            dispatched: std::sync::Mutex::new(HashSet::new()),
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            shutdown_token: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    /// Start the feeder and the worker pool. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let feeder = Arc::clone(self);
        tokio::spawn(async move { feeder.feeder_loop().await });

        for worker_id in 0..self.config.max_concurrent {
            let manager = Arc::clone(self);
            tokio::spawn(async move { manager.worker_loop(worker_id).await });
        }

        tracing::info!(
            workers = self.config.max_concurrent,
            feeder_interval = ?self.config.feeder_interval,
            "Download manager started"
        );
    }

    /// Stop the feeder and workers and cancel active transfers. Items in
    /// flight return to `Pending` for the next start.
    pub async fn shutdown(&self) {
        self.shutdown_token.cancel();
        let active = self.active.lock().await;
        for handle in active.values() {
            handle.request(CancelIntent::Shutdown);
        }
        tracing::info!(active = active.len(), "Download manager shutting down");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Public contract
    // ─────────────────────────────────────────────────────────────────────

    /// Validate a request, resolve its destination and persist a
    /// `Pending` item. Workers pick it up asynchronously.
    pub async fn add_download(
        &self,
        request: DownloadRequest,
        user_id: i64,
    ) -> Result<QueueItem, DownloadError> {
        if request.title.trim().is_empty() {
            return Err(DownloadError::validation("title must not be empty"));
        }
        match url::Url::parse(&request.download_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(DownloadError::validation(
                    "download_url must be a valid http(s) URL",
                ));
            }
        }
        if let Some(priority) = request.priority {
            if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
                return Err(DownloadError::validation(format!(
                    "priority must be between {PRIORITY_MIN} and {PRIORITY_MAX}"
                )));
            }
        }

        // Down or maintenance indexers do not accept new items;
        // in-flight downloads targeting them are unaffected.
        let indexer = self
            .registry
            .get(request.indexer_id)
            .await
            .map_err(|_| DownloadError::validation("unknown indexer"))?;
        if !indexer.enabled {
            return Err(DownloadError::validation(format!(
                "indexer {} is disabled",
                indexer.name
            )));
        }
        if let Ok(Some(health)) = self.registry.current_health(indexer.id).await {
            if !health.status.accepts_new_work() {
                return Err(DownloadError::validation(format!(
                    "indexer {} is {}",
                    indexer.name, health.status
                )));
            }
        }

        let destination = self.placement.resolve(user_id, &request).await?;
        let item = QueueItem::from_request(&request, user_id, destination);
        self.store.create(&item).await?;

        self.sink.emit(DownloadEvent::queued(item.id, &item.title));
        tracing::info!(
            id = %item.id,
            title = %item.title,
            priority = item.priority,
            indexer = %indexer.name,
            "Download queued"
        );
        Ok(item)
    }

    /// Pause a download. An active transfer is cancelled cooperatively;
    /// a waiting item is marked `Paused` directly. Paused items are
    /// excluded from scheduling until resumed.
    pub async fn pause_download(&self, id: DownloadId) -> Result<(), DownloadError> {
        {
            let active = self.active.lock().await;
            if let Some(handle) = active.get(&id) {
                handle.request(CancelIntent::Pause);
                tracing::info!(id = %id, "Pause requested for active transfer");
                return Ok(());
            }
        }

        self.store
            .set_status(id, DownloadStatus::Paused, None)
            .await?;
        self.sink.emit(DownloadEvent::paused(id));
        tracing::info!(id = %id, "Download paused");
        Ok(())
    }

    /// Resume a paused download: it re-enters scheduling from the
    /// beginning (no byte-range resume).
    pub async fn resume_download(&self, id: DownloadId) -> Result<(), DownloadError> {
        let item = self.store.get(id).await?;
        if item.status != DownloadStatus::Paused {
            return Err(DownloadError::invalid_state(
                id.to_string(),
                item.status,
                "resume",
            ));
        }

        self.store
            .set_status(id, DownloadStatus::Pending, None)
            .await?;
        self.sink.emit(DownloadEvent::resumed(id));
        tracing::info!(id = %id, "Download resumed");
        Ok(())
    }

    /// Cancel a download, optionally deleting the partial file.
    /// Terminal; not retryable.
    pub async fn cancel_download(
        &self,
        id: DownloadId,
        delete_partial: bool,
    ) -> Result<(), DownloadError> {
        {
            let active = self.active.lock().await;
            if let Some(handle) = active.get(&id) {
                handle.request(CancelIntent::Cancel { delete_partial });
                tracing::info!(id = %id, "Cancel requested for active transfer");
                return Ok(());
            }
        }

        let item = self
            .store
            .set_status(id, DownloadStatus::Cancelled, None)
            .await?;
        if delete_partial {
            if let Err(e) = tokio::fs::remove_file(&item.destination_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(id = %id, error = %e, "Failed to delete partial file");
                }
            }
        }
        self.store
            .record_history(HistoryRecord::for_item(&item, 0))
            .await?;
        self.sink.emit(DownloadEvent::cancelled(id));
        tracing::info!(id = %id, delete_partial, "Download cancelled");
        Ok(())
    }

    /// Operator retry of a failed download: re-opens it to `Pending`
    /// with an incremented retry count, bounded by the budget.
    pub async fn retry_download(&self, id: DownloadId) -> Result<QueueItem, DownloadError> {
        let reopened = self.store.reopen_failed(id).await?;
        self.sink
            .emit(DownloadEvent::queued(reopened.id, &reopened.title));
        tracing::info!(
            id = %id,
            retry_count = reopened.retry_count,
            "Failed download re-opened"
        );
        Ok(reopened)
    }

    /// Apply one action to a set of ids, reporting per-id outcomes. The
    /// batch call itself never fails.
    pub async fn batch_action(
        &self,
        action: BatchAction,
        ids: &[DownloadId],
    ) -> Vec<BatchActionResult> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            let outcome = match action {
                BatchAction::Pause => self.pause_download(id).await,
                BatchAction::Resume => self.resume_download(id).await,
                BatchAction::Cancel { delete_partial } => {
                    self.cancel_download(id, delete_partial).await
                }
                BatchAction::Retry => self.retry_download(id).await.map(|_| ()),
            };
            results.push(match outcome {
                Ok(()) => BatchActionResult {
                    id,
                    success: true,
                    error: None,
                },
                Err(e) => BatchActionResult {
                    id,
                    success: false,
                    error: Some(e.to_string()),
                },
            });
        }
        results
    }

    /// Subscribe to progress snapshots for one download. Best-effort:
    /// updates beyond the buffer are dropped, never waited on.
    pub fn subscribe_progress(&self, id: DownloadId) -> mpsc::Receiver<DownloadProgress> {
        self.broadcaster.subscribe(id)
    }

    /// Drop the progress subscriptions for one download.
    pub fn unsubscribe_progress(&self, id: DownloadId) {
        self.broadcaster.unsubscribe(id);
    }

    /// List queue items through the store.
    pub async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueItem>, DownloadError> {
        self.store.list(filter).await
    }

    /// History records for one download.
    pub async fn history_for(&self, id: DownloadId) -> Result<Vec<HistoryRecord>, DownloadError> {
        self.store.history_for(id).await
    }

    /// Number of transfers currently held by workers.
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Number of items waiting for dispatch.
    pub async fn pending_count(&self) -> Result<usize, DownloadError> {
        let pending = QueueFilter::default().with_status(DownloadStatus::Pending);
        Ok(self.store.list(&pending).await?.len())
    }

    /// Cancel every active and pending download. Used at application
    /// shutdown or to clear the queue; partial files are kept.
    pub async fn cancel_all(&self) -> Result<(), DownloadError> {
        {
            let active = self.active.lock().await;
            for handle in active.values() {
                handle.request(CancelIntent::Cancel {
                    delete_partial: false,
                });
            }
            tracing::info!(active = active.len(), "Cancelling all active transfers");
        }

        let waiting = self
            .store
            .list(&QueueFilter::default().with_status(DownloadStatus::Pending))
            .await?;
        for item in waiting {
            if let Err(e) = self.cancel_download(item.id, false).await {
                // Raced a worker claim or a concurrent cancel; the item is
                // no longer pending either way.
                tracing::debug!(id = %item.id, error = %e, "Queued cancel skipped");
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scheduling
    // ─────────────────────────────────────────────────────────────────────

    async fn feeder_loop(&self) {
        let mut tick = interval(self.config.feeder_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    tracing::debug!("Feeder stopped");
                    return;
                }

                _ = tick.tick() => {
                    self.feed_once().await;
                }
            }
        }
    }

    /// One feeder tick: push dispatchable items into the work channel
    /// until the batch or the channel is exhausted.
    async fn feed_once(&self) {
        let exclude: Vec<DownloadId> = self
            .dispatched
            .lock()
            .expect("dispatched set poisoned")
            .iter()
            .copied()
            .collect();

        let batch = match self
            .store
            .list_dispatchable(Utc::now(), self.config.feeder_batch, &exclude)
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "Feeder failed to list dispatchable items");
                return;
            }
        };

        for item in batch {
            // The download path tolerates waiting: a saturated window
            // just defers the item to a later tick.
            if let Ok(indexer) = self.registry.get(item.indexer_id).await {
                let limiter = self.limiters.limiter_for(&indexer);
                if limiter.try_acquire().is_err() {
                    tracing::debug!(
                        id = %item.id,
                        indexer = %indexer.name,
                        "Rate limit window saturated, dispatch deferred"
                    );
                    continue;
                }
            }

            let id = item.id;
            match self.work_tx.try_send(item) {
                Ok(()) => {
                    self.dispatched
                        .lock()
                        .expect("dispatched set poisoned")
                        .insert(id);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("Work channel full, deferring to next tick");
                    break;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    }

    async fn worker_loop(&self, worker_id: u32) {
        loop {
            let item = {
                let mut rx = self.work_rx.lock().await;
                let Some(rx) = rx.as_mut() else { return };
                tokio::select! {
                    biased;
                    () = self.shutdown_token.cancelled() => None,
                    item = rx.recv() => item,
                }
            };

            let Some(item) = item else {
                tracing::debug!(worker_id, "Worker stopped");
                return;
            };

            self.process(item).await;
        }
    }

    /// Claim and run one dispatched item.
    async fn process(&self, item: QueueItem) {
        let id = item.id;

        match self.store.claim_pending(id).await {
            Ok(true) => {}
            Ok(false) => {
                // Paused or cancelled while waiting in the channel.
                tracing::debug!(id = %id, "Item no longer pending, dispatch skipped");
                self.clear_dispatched(id);
                return;
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Claim failed");
                self.clear_dispatched(id);
                return;
            }
        }

        // Re-read after the claim so the worker sees fresh timestamps.
        let claimed = self.store.get(id).await.unwrap_or(item);

        let handle = ActiveHandle::new();
        self.active.lock().await.insert(id, handle.clone());

        worker::run_claimed(&self.worker_deps, claimed, &handle).await;

        self.active.lock().await.remove(&id);
        self.clear_dispatched(id);
    }

    fn clear_dispatched(&self, id: DownloadId) {
        self.dispatched
            .lock()
            .expect("dispatched set poisoned")
            .remove(&id);
    }
}

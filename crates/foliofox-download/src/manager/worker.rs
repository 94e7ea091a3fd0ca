//! Download worker pipeline.
//!
//! A worker receives an item it has already claimed (`Downloading` in the
//! store), runs the transfer under the per-download deadline, and applies
//! the completion, retry or terminal-failure policy. Progress flows only
//! through the watch channel; a bridge task turns it into snapshots at a
//! bounded rate so a slow consumer can never stall the transfer.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use foliofox_core::config::DownloadManagerConfig;
use foliofox_core::download::{
    DownloadError, DownloadEvent, DownloadId, DownloadProgress, DownloadStatus, QueueItem,
};
use foliofox_core::ports::{EventSinkPort, HistoryRecord, PreferencesPort, QueueStorePort};

use crate::placement;
use crate::progress::ProgressBroadcaster;
use crate::transfer::{TransferClient, TransferContext, TransferSnapshot};

/// What the user asked an active transfer's cancellation to mean.
///
/// Distinguishes explicit user actions from genuine transfer failures:
/// a cancellation never counts toward the retry budget.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum CancelIntent {
    #[default]
    None,
    Pause,
    Cancel {
        delete_partial: bool,
    },
    Shutdown,
}

/// Handle to an active transfer.
///
/// Owned by the manager's registry; only cancellation signals cross this
/// boundary.
#[derive(Clone)]
pub(crate) struct ActiveHandle {
    pub cancel: CancellationToken,
    intent: Arc<std::sync::Mutex<CancelIntent>>,
}

impl ActiveHandle {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            intent: Arc::new(std::sync::Mutex::new(CancelIntent::None)),
        }
    }

    /// Record the intent and interrupt the transfer.
    pub fn request(&self, intent: CancelIntent) {
        *self.intent.lock().expect("intent mutex poisoned") = intent;
        self.cancel.cancel();
    }

    fn intent(&self) -> CancelIntent {
        *self.intent.lock().expect("intent mutex poisoned")
    }
}

/// Collaborators a worker needs: cloned Arcs, no manager locks.
#[derive(Clone)]
pub(crate) struct WorkerDeps {
    pub store: Arc<dyn QueueStorePort>,
    pub prefs: Arc<dyn PreferencesPort>,
    pub transfer: Arc<dyn TransferClient>,
    pub broadcaster: Arc<ProgressBroadcaster>,
    pub sink: Arc<dyn EventSinkPort>,
    pub config: DownloadManagerConfig,
}

/// Run one claimed item to a terminal or rescheduled state.
pub(crate) async fn run_claimed(deps: &WorkerDeps, item: QueueItem, handle: &ActiveHandle) {
    deps.sink.emit(DownloadEvent::started(item.id));
    tracing::info!(id = %item.id, title = %item.title, "Transfer started");

    let (progress_tx, progress_rx) = watch::channel(TransferSnapshot::default());
    let bridge = spawn_progress_bridge(deps, item.id, progress_rx.clone(), handle.cancel.clone());

    let ctx = TransferContext {
        cancel: handle.cancel.clone(),
        progress: progress_tx,
    };
    let deadline = deps.config.transfer_timeout;
    let outcome = match tokio::time::timeout(
        deadline,
        deps.transfer
            .download(&item.download_url, &item.destination_path, &ctx),
    )
    .await
    {
        Ok(result) => result,
        // The dropped future aborts the in-flight request.
        Err(_) => Err(DownloadError::timeout(deadline.as_secs())),
    };

    // Drop the progress sender so the bridge flushes its final snapshot
    // and exits before we finalize.
    drop(ctx);
    let _ = bridge.await;
    let bytes_so_far = progress_rx.borrow().bytes_downloaded;

    finalize(deps, &item, outcome, handle.intent(), bytes_so_far).await;
}

async fn finalize(
    deps: &WorkerDeps,
    item: &QueueItem,
    result: Result<u64, DownloadError>,
    intent: CancelIntent,
    bytes_so_far: u64,
) {
    match result {
        Ok(written) => match verify_non_empty(item, written).await {
            Ok(()) => complete(deps, item, written).await,
            Err(e) => fail_or_retry(deps, item, &e, bytes_so_far).await,
        },
        Err(e) if e.is_cancelled() => handle_cancellation(deps, item, intent).await,
        Err(e) => fail_or_retry(deps, item, &e, bytes_so_far).await,
    }
}

/// A successful transfer of zero bytes is a failure: the indexer served
/// an empty body.
async fn verify_non_empty(item: &QueueItem, written: u64) -> Result<(), DownloadError> {
    if written == 0 {
        return Err(DownloadError::transfer("downloaded file is empty"));
    }
    match tokio::fs::metadata(&item.destination_path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        Ok(_) => Err(DownloadError::transfer("downloaded file is empty")),
        Err(e) => Err(DownloadError::from_io_error(&e)),
    }
}

async fn complete(deps: &WorkerDeps, item: &QueueItem, written: u64) {
    let updated = match deps
        .store
        .set_status(item.id, DownloadStatus::Completed, None)
        .await
    {
        Ok(updated) => updated,
        Err(e) => {
            tracing::warn!(id = %item.id, error = %e, "Completion transition failed");
            return;
        }
    };

    if let Err(e) = deps
        .store
        .record_history(HistoryRecord::for_item(&updated, written))
        .await
    {
        tracing::warn!(id = %item.id, error = %e, "Failed to record history");
    }

    deps.sink.emit(DownloadEvent::completed(
        item.id,
        updated.destination_path.display().to_string(),
    ));
    tracing::info!(id = %item.id, bytes = written, "Download completed");

    // Filing into the organized layout must not block the worker.
    let prefs = Arc::clone(&deps.prefs);
    tokio::spawn(async move {
        match prefs.download_folder(updated.user_id).await {
            Ok(folder) if folder.auto_organize => {
                match placement::organize(&folder, &updated).await {
                    Ok(target) => {
                        tracing::info!(
                            id = %updated.id,
                            path = %target.display(),
                            "Filed completed download"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(id = %updated.id, error = %e, "Auto-organize failed");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(id = %updated.id, error = %e, "No folder for organize step");
            }
        }
    });
}

async fn handle_cancellation(deps: &WorkerDeps, item: &QueueItem, intent: CancelIntent) {
    match intent {
        CancelIntent::Pause => {
            match deps
                .store
                .set_status(item.id, DownloadStatus::Paused, None)
                .await
            {
                Ok(_) => {
                    deps.sink.emit(DownloadEvent::paused(item.id));
                    tracing::info!(id = %item.id, "Download paused");
                }
                Err(e) => tracing::warn!(id = %item.id, error = %e, "Pause transition failed"),
            }
        }
        CancelIntent::Cancel { delete_partial } => {
            if delete_partial {
                if let Err(e) = tokio::fs::remove_file(&item.destination_path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(id = %item.id, error = %e, "Failed to delete partial file");
                    }
                }
            }
            match deps
                .store
                .set_status(item.id, DownloadStatus::Cancelled, None)
                .await
            {
                Ok(updated) => {
                    if let Err(e) = deps
                        .store
                        .record_history(HistoryRecord::for_item(&updated, 0))
                        .await
                    {
                        tracing::warn!(id = %item.id, error = %e, "Failed to record history");
                    }
                    deps.sink.emit(DownloadEvent::cancelled(item.id));
                    tracing::info!(id = %item.id, delete_partial, "Download cancelled");
                }
                Err(e) => tracing::warn!(id = %item.id, error = %e, "Cancel transition failed"),
            }
        }
        CancelIntent::Shutdown | CancelIntent::None => {
            // Return the claim so a restart picks the item up again.
            match deps
                .store
                .set_status(item.id, DownloadStatus::Pending, None)
                .await
            {
                Ok(_) => tracing::info!(id = %item.id, "Transfer stopped, item requeued"),
                Err(e) => tracing::warn!(id = %item.id, error = %e, "Requeue transition failed"),
            }
        }
    }
}

async fn fail_or_retry(
    deps: &WorkerDeps,
    item: &QueueItem,
    error: &DownloadError,
    bytes_so_far: u64,
) {
    let message = error.to_string();

    if error.is_retryable() && item.retry_count < item.max_retries {
        let not_before = Utc::now()
            + chrono::Duration::from_std(deps.config.retry_delay)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        match deps
            .store
            .reschedule_retry(item.id, message.clone(), not_before)
            .await
        {
            Ok(updated) => {
                deps.sink
                    .emit(DownloadEvent::failed(item.id, message.clone(), true));
                tracing::info!(
                    id = %item.id,
                    retry_count = updated.retry_count,
                    max_retries = updated.max_retries,
                    error = %message,
                    "Attempt failed, rescheduled"
                );
            }
            Err(e) => tracing::warn!(id = %item.id, error = %e, "Reschedule failed"),
        }
        return;
    }

    match deps
        .store
        .set_status(item.id, DownloadStatus::Failed, Some(message.clone()))
        .await
    {
        Ok(updated) => {
            if let Err(e) = deps
                .store
                .record_history(HistoryRecord::for_item(&updated, bytes_so_far))
                .await
            {
                tracing::warn!(id = %item.id, error = %e, "Failed to record history");
            }
            deps.sink
                .emit(DownloadEvent::failed(item.id, message.clone(), false));
            tracing::warn!(id = %item.id, error = %message, "Download failed");
        }
        Err(e) => tracing::warn!(id = %item.id, error = %e, "Failure transition failed"),
    }
}

/// Spawn a bridge task that turns byte counters into progress snapshots
/// at a bounded rate.
fn spawn_progress_bridge(
    deps: &WorkerDeps,
    id: DownloadId,
    mut rx: watch::Receiver<TransferSnapshot>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let store = Arc::clone(&deps.store);
    let broadcaster = Arc::clone(&deps.broadcaster);
    let tick_interval = deps.config.progress_interval;

    tokio::spawn(async move {
        let started = Instant::now();
        let mut tick = interval(tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_seq = 0u64;

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    // No final emit on cancel: the terminal event is the
                    // last word for this attempt.
                    break;
                }

                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender dropped (attempt over); flush the final
                        // counter so 100% is observable.
                        let snapshot = rx.borrow().clone();
                        if snapshot.seq > last_seq {
                            publish_snapshot(&store, &broadcaster, id, &snapshot, started).await;
                        }
                        break;
                    }
                    // Picked up on the next tick.
                }

                _ = tick.tick() => {
                    let snapshot = rx.borrow().clone();
                    if snapshot.seq > last_seq {
                        last_seq = snapshot.seq;
                        publish_snapshot(&store, &broadcaster, id, &snapshot, started).await;
                    }
                }
            }
        }
    })
}

async fn publish_snapshot(
    store: &Arc<dyn QueueStorePort>,
    broadcaster: &Arc<ProgressBroadcaster>,
    id: DownloadId,
    snapshot: &TransferSnapshot,
    started: Instant,
) {
    let elapsed = started.elapsed().as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let speed_bps = if elapsed > 0.0 {
        snapshot.bytes_downloaded as f64 / elapsed
    } else {
        0.0
    };

    let progress =
        DownloadProgress::downloading(id, snapshot.bytes_downloaded, snapshot.total_bytes, speed_bps);

    // Percentage is withheld when the total is unknown.
    if let Some(percent) = progress.percent() {
        let estimated_completion = progress.eta_seconds.map(|eta| {
            #[allow(clippy::cast_possible_truncation)]
            let eta_ms = (eta * 1000.0) as i64;
            Utc::now() + chrono::Duration::milliseconds(eta_ms)
        });
        if let Err(e) = store.update_progress(id, percent, estimated_completion).await {
            tracing::debug!(id = %id, error = %e, "Progress write dropped");
        }
    }

    broadcaster.publish(&progress);
}

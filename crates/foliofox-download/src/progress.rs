//! Progress delivery.
//!
//! Workers write byte counters into a `watch` channel; a bridge task per
//! download turns them into `DownloadProgress` snapshots at a bounded
//! rate and hands them to the broadcaster. The broadcaster delivers to
//! subscribers over bounded channels with explicit best-effort semantics:
//! a full channel drops the update, a slow consumer never stalls a
//! transfer. Updates for one download reach a subscriber in order; drops
//! are allowed, reordering is not.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use foliofox_core::download::{DownloadEvent, DownloadId, DownloadProgress};
use foliofox_core::ports::EventSinkPort;

/// Fans progress snapshots out to per-download subscribers and the
/// notification sink.
pub struct ProgressBroadcaster {
    sink: Arc<dyn EventSinkPort>,
    buffer: usize,
    subscribers: Mutex<HashMap<DownloadId, Vec<mpsc::Sender<DownloadProgress>>>>,
}

impl ProgressBroadcaster {
    /// Create a broadcaster emitting to the given sink, with per-
    /// subscriber channels of `buffer` capacity.
    pub fn new(sink: Arc<dyn EventSinkPort>, buffer: usize) -> Self {
        Self {
            sink,
            buffer: buffer.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to progress for one download.
    ///
    /// Delivery is best-effort: updates beyond the channel buffer are
    /// dropped, never waited on.
    pub fn subscribe(&self, id: DownloadId) -> mpsc::Receiver<DownloadProgress> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.subscribers
            .lock()
            .expect("subscriber map poisoned")
            .entry(id)
            .or_default()
            .push(tx);
        rx
    }

    /// Drop all subscriptions for one download.
    pub fn unsubscribe(&self, id: DownloadId) {
        self.subscribers
            .lock()
            .expect("subscriber map poisoned")
            .remove(&id);
    }

    /// Publish a snapshot: to the sink (best-effort by contract) and to
    /// every subscriber (drop-on-full).
    pub fn publish(&self, progress: &DownloadProgress) {
        self.sink.emit(DownloadEvent::progress(progress));

        let mut subscribers = self.subscribers.lock().expect("subscriber map poisoned");
        if let Some(senders) = subscribers.get_mut(&progress.download_id) {
            senders.retain(|sender| match sender.try_send(progress.clone()) {
                Ok(()) => true,
                // Full: drop the update, keep the subscriber.
                Err(mpsc::error::TrySendError::Full(_)) => true,
                // Closed: the subscriber went away.
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            });
            if senders.is_empty() {
                subscribers.remove(&progress.download_id);
            }
        }
    }
}

//! Queue persistence port.
//!
//! The queue store is the single source of truth for download status. It
//! serializes concurrent status transitions per item; the dispatch step
//! claims an item atomically, so only one worker ever holds `Downloading`
//! for a given id.
//!
//! A durable implementation (SQL) is an external collaborator. The engine
//! ships `MemoryQueueStore` in `foliofox-download` as the in-process
//! reference implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download::{DownloadError, DownloadId, DownloadStatus, QueueItem};

/// Listing filter for queue items.
#[derive(Clone, Debug, Default)]
pub struct QueueFilter {
    /// Restrict to one user.
    pub user_id: Option<i64>,
    /// Restrict to one status.
    pub status: Option<DownloadStatus>,
    /// Inclusive priority range.
    pub priority_min: Option<u8>,
    pub priority_max: Option<u8>,
    /// Creation date range.
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Pagination.
    pub offset: usize,
    pub limit: Option<usize>,
}

impl QueueFilter {
    /// Filter to one status.
    #[must_use]
    pub const fn with_status(mut self, status: DownloadStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filter to one user.
    #[must_use]
    pub const fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set pagination.
    #[must_use]
    pub const fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    /// Whether an item passes the filter (pagination excluded).
    #[must_use]
    pub fn matches(&self, item: &QueueItem) -> bool {
        if let Some(user_id) = self.user_id {
            if item.user_id != user_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(min) = self.priority_min {
            if item.priority < min {
                return false;
            }
        }
        if let Some(max) = self.priority_max {
            if item.priority > max {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if item.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if item.created_at > before {
                return false;
            }
        }
        true
    }
}

/// Record written on every terminal transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub download_id: DownloadId,
    pub final_status: DownloadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub bytes_transferred: u64,
    /// Transfer duration from the recorded start time, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    pub completed_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Build a history record for a terminal item, deriving the duration
    /// from the recorded `started_at`.
    #[must_use]
    pub fn for_item(item: &QueueItem, bytes_transferred: u64) -> Self {
        let completed_at = Utc::now();
        let duration_secs = item.started_at.map(|started| {
            let millis = completed_at.signed_duration_since(started).num_milliseconds();
            #[allow(clippy::cast_precision_loss)]
            let secs = millis.max(0) as f64 / 1000.0;
            secs
        });

        Self {
            download_id: item.id,
            final_status: item.status,
            error_message: item.error_message.clone(),
            bytes_transferred,
            duration_secs,
            completed_at,
        }
    }
}

/// Port for persisting download queue state.
///
/// Implementations must serialize transitions per item and enforce the
/// status machine: an illegal transition returns `InvalidState` without
/// mutating anything; terminal records are immutable except for the retry
/// re-open paths below.
#[async_trait]
pub trait QueueStorePort: Send + Sync {
    /// Persist a new `Pending` item.
    async fn create(&self, item: &QueueItem) -> Result<(), DownloadError>;

    /// Fetch one item.
    async fn get(&self, id: DownloadId) -> Result<QueueItem, DownloadError>;

    /// Atomically claim a `Pending` item for a worker: transition it to
    /// `Downloading`, stamp `started_at`, clear the error message and
    /// reset progress. Returns `false` without mutating when the item is
    /// no longer `Pending` (paused or cancelled while waiting for a
    /// worker).
    async fn claim_pending(&self, id: DownloadId) -> Result<bool, DownloadError>;

    /// List items ready for dispatch: `Pending`, `not_before` at or
    /// before `now`, not in `exclude`, ordered by
    /// `(priority asc, created_at asc)`, capped at `limit`.
    async fn list_dispatchable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        exclude: &[DownloadId],
    ) -> Result<Vec<QueueItem>, DownloadError>;

    /// Update progress for a `Downloading` item. Progress is monotonic
    /// within an attempt: a percentage below the stored one is ignored.
    /// `estimated_completion` is advisory and overwritten freely.
    async fn update_progress(
        &self,
        id: DownloadId,
        percent: u8,
        estimated_completion: Option<DateTime<Utc>>,
    ) -> Result<(), DownloadError>;

    /// Transition an item to `status`, recording an optional error
    /// message and stamping the relevant timestamps. Returns the updated
    /// item.
    async fn set_status(
        &self,
        id: DownloadId,
        status: DownloadStatus,
        error: Option<String>,
    ) -> Result<QueueItem, DownloadError>;

    /// Automatic-retry reschedule after a failed attempt with budget
    /// left: increments `retry_count`, records the error, resets
    /// progress, transitions to `Pending` and defers dispatch until
    /// `not_before`.
    async fn reschedule_retry(
        &self,
        id: DownloadId,
        error: String,
        not_before: DateTime<Utc>,
    ) -> Result<QueueItem, DownloadError>;

    /// Operator retry of a `Failed` item: increments `retry_count`,
    /// clears the error, resets progress, transitions to `Pending`.
    async fn reopen_failed(&self, id: DownloadId) -> Result<QueueItem, DownloadError>;

    /// List items matching a filter, newest first, with pagination.
    async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueItem>, DownloadError>;

    /// Append a history record for a terminal transition.
    async fn record_history(&self, record: HistoryRecord) -> Result<(), DownloadError>;

    /// History records for one download, oldest first.
    async fn history_for(&self, id: DownloadId) -> Result<Vec<HistoryRecord>, DownloadError>;
}

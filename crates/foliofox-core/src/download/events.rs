//! Download status machine and the event union for state changes.

use serde::{Deserialize, Serialize};

use super::types::{DownloadId, DownloadProgress};

/// Status of a queued download.
///
/// Legal transitions:
/// `Pending -> Downloading -> {Completed | Failed | Cancelled}`;
/// `Pending | Downloading -> Paused -> Pending`;
/// `Failed -> Pending` (operator retry, bounded by the retry budget);
/// any non-terminal state `-> Cancelled`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting to be dispatched.
    Pending,
    /// A worker holds the transfer.
    Downloading,
    /// Excluded from scheduling until resumed.
    Paused,
    /// Finished and verified. Terminal.
    Completed,
    /// Last attempt failed. Terminal once the retry budget is exhausted.
    Failed,
    /// Stopped by user request. Terminal.
    Cancelled,
}

impl DownloadStatus {
    /// String representation for storage and wire formats.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the stored string representation.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "downloading" => Self::Downloading,
            "paused" => Self::Paused,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            // "pending" or unknown values default to Pending
            _ => Self::Pending,
        }
    }

    /// Whether this status ends the lifecycle. `Failed` stays re-openable
    /// through operator retry while budget remains, but is terminal for
    /// the scheduler.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the transition `self -> to` is legal.
    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            // Any non-terminal state can be cancelled.
            (from, Self::Cancelled) => !from.is_terminal(),
            (Self::Pending, Self::Downloading | Self::Paused)
            | (Self::Downloading, Self::Completed | Self::Failed | Self::Paused)
            | (Self::Paused | Self::Failed, Self::Pending) => true,
            // Retry reschedule goes Downloading -> Pending after a failed
            // attempt with budget left.
            (Self::Downloading, Self::Pending) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single discriminated union for all download state changes.
///
/// Delivered best-effort through the notification sink; consumers must
/// tolerate drops.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// A new item was admitted to the queue.
    Queued {
        id: DownloadId,
        title: String,
        position_hint: Option<u32>,
    },

    /// A worker claimed the item and started the transfer.
    Started { id: DownloadId },

    /// Periodic progress snapshot for an active transfer.
    Progress {
        id: DownloadId,
        bytes_downloaded: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
        speed_bps: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_seconds: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
    },

    /// The item was paused.
    Paused { id: DownloadId },

    /// The item re-entered scheduling after a pause.
    Resumed { id: DownloadId },

    /// The transfer finished and the file was verified.
    Completed { id: DownloadId, path: String },

    /// The attempt failed. `will_retry` distinguishes an automatic
    /// reschedule from a terminal failure.
    Failed {
        id: DownloadId,
        error: String,
        will_retry: bool,
    },

    /// The item was cancelled.
    Cancelled { id: DownloadId },
}

impl DownloadEvent {
    /// Create a queued event.
    pub fn queued(id: DownloadId, title: impl Into<String>) -> Self {
        Self::Queued {
            id,
            title: title.into(),
            position_hint: None,
        }
    }

    /// Create a started event.
    #[must_use]
    pub const fn started(id: DownloadId) -> Self {
        Self::Started { id }
    }

    /// Create a progress event from a worker snapshot.
    #[must_use]
    pub fn progress(snapshot: &DownloadProgress) -> Self {
        Self::Progress {
            id: snapshot.download_id,
            bytes_downloaded: snapshot.bytes_downloaded,
            total_bytes: snapshot.total_bytes,
            speed_bps: snapshot.speed_bps,
            eta_seconds: snapshot.eta_seconds,
            percent: snapshot.percent(),
        }
    }

    /// Create a paused event.
    #[must_use]
    pub const fn paused(id: DownloadId) -> Self {
        Self::Paused { id }
    }

    /// Create a resumed event.
    #[must_use]
    pub const fn resumed(id: DownloadId) -> Self {
        Self::Resumed { id }
    }

    /// Create a completed event.
    pub fn completed(id: DownloadId, path: impl Into<String>) -> Self {
        Self::Completed {
            id,
            path: path.into(),
        }
    }

    /// Create a failed event.
    pub fn failed(id: DownloadId, error: impl Into<String>, will_retry: bool) -> Self {
        Self::Failed {
            id,
            error: error.into(),
            will_retry,
        }
    }

    /// Create a cancelled event.
    #[must_use]
    pub const fn cancelled(id: DownloadId) -> Self {
        Self::Cancelled { id }
    }

    /// Get the download ID for any event type.
    #[must_use]
    pub const fn id(&self) -> DownloadId {
        match self {
            Self::Queued { id, .. }
            | Self::Started { id }
            | Self::Progress { id, .. }
            | Self::Paused { id }
            | Self::Resumed { id }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Cancelled { id } => *id,
        }
    }

    /// Get the event name for wire protocols.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "download:queued",
            Self::Started { .. } => "download:started",
            Self::Progress { .. } => "download:progress",
            Self::Paused { .. } => "download:paused",
            Self::Resumed { .. } => "download:resumed",
            Self::Completed { .. } => "download:completed",
            Self::Failed { .. } => "download:failed",
            Self::Cancelled { .. } => "download:cancelled",
        }
    }
}

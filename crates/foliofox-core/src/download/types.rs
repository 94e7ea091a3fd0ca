//! Core domain types for downloads.
//!
//! Pure data types with no I/O dependencies.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::DownloadStatus;
use crate::indexer::IndexerId;

/// Priority bounds for queue items. Lower values are more urgent.
pub const PRIORITY_MIN: u8 = 1;
pub const PRIORITY_MAX: u8 = 10;
/// Default priority when a request leaves it unspecified (mid-scale).
pub const PRIORITY_DEFAULT: u8 = 5;

/// Default automatic-retry budget for new queue items.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Canonical identifier for a queued download.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(Uuid);

impl DownloadId {
    /// Mint a fresh download id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DownloadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DownloadId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// E-book file format of a search result or download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    #[default]
    Epub,
    Mobi,
    Azw3,
    Pdf,
    Djvu,
    Cbz,
    Cbr,
    Fb2,
    Txt,
}

/// Pattern table for format extraction, most specific first.
const FORMAT_PATTERNS: &[(&str, BookFormat)] = &[
    ("EPUB", BookFormat::Epub),
    ("MOBI", BookFormat::Mobi),
    ("AZW3", BookFormat::Azw3),
    ("PDF", BookFormat::Pdf),
    ("DJVU", BookFormat::Djvu),
    ("CBZ", BookFormat::Cbz),
    ("CBR", BookFormat::Cbr),
    ("FB2", BookFormat::Fb2),
    ("TXT", BookFormat::Txt),
];

impl BookFormat {
    /// Extract a format from a filename or URL, defaulting to EPUB when
    /// nothing matches.
    #[must_use]
    pub fn from_filename(filename: &str) -> Self {
        let upper = filename.to_uppercase();
        FORMAT_PATTERNS
            .iter()
            .find(|(pattern, _)| upper.ends_with(&format!(".{pattern}")))
            .map_or(Self::Epub, |(_, f)| *f)
    }

    /// Canonical lowercase name, doubling as the file extension.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::Mobi => "mobi",
            Self::Azw3 => "azw3",
            Self::Pdf => "pdf",
            Self::Djvu => "djvu",
            Self::Cbz => "cbz",
            Self::Cbr => "cbr",
            Self::Fb2 => "fb2",
            Self::Txt => "txt",
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BookFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_uppercase();
        FORMAT_PATTERNS
            .iter()
            .find(|(pattern, _)| *pattern == upper)
            .map(|(_, f)| *f)
            .ok_or(())
    }
}

/// Request to queue a new download.
///
/// Pure data; validation and path resolution happen in the download
/// manager when the request is admitted.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Book identity in the library, when the download originates from one.
    pub book_id: Option<i64>,
    /// Indexer the file will be fetched from.
    pub indexer_id: IndexerId,
    /// Denormalized title for display.
    pub title: String,
    /// Denormalized author for display.
    pub author: String,
    /// Direct download URL reported by the indexer.
    pub download_url: String,
    /// Requested file format.
    pub file_format: BookFormat,
    /// Known file size in bytes, if the indexer reported one.
    pub file_size_bytes: Option<u64>,
    /// Priority 1-10, lower = more urgent. Defaults to mid-scale.
    pub priority: Option<u8>,
    /// Automatic-retry budget override.
    pub max_retries: Option<u32>,
}

impl DownloadRequest {
    /// Create a request with required fields.
    pub fn new(
        indexer_id: IndexerId,
        title: impl Into<String>,
        author: impl Into<String>,
        download_url: impl Into<String>,
        file_format: BookFormat,
    ) -> Self {
        Self {
            book_id: None,
            indexer_id,
            title: title.into(),
            author: author.into(),
            download_url: download_url.into(),
            file_format,
            file_size_bytes: None,
            priority: None,
            max_retries: None,
        }
    }

    /// Associate the request with a library book.
    #[must_use]
    pub const fn with_book_id(mut self, book_id: i64) -> Self {
        self.book_id = Some(book_id);
        self
    }

    /// Set the known file size.
    #[must_use]
    pub const fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size_bytes = Some(bytes);
        self
    }

    /// Set the priority (1-10, lower = more urgent).
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Override the automatic-retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// One user-requested download, tracked through its status lifecycle.
///
/// Owned by the queue store; mutated exclusively through the store's
/// transition methods while the download manager processes it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: DownloadId,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i64>,
    pub indexer_id: IndexerId,
    pub title: String,
    pub author: String,
    pub download_url: String,
    pub file_format: BookFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_bytes: Option<u64>,
    /// 1-10, lower = more urgent.
    pub priority: u8,
    pub status: DownloadStatus,
    /// 0-100; monotonically non-decreasing within a downloading attempt.
    pub progress_percent: u8,
    /// Resolved destination path for the finished file.
    pub destination_path: PathBuf,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Earliest time the feeder may dispatch this item again. Set by the
    /// deferred retry delay; `None` means dispatchable now.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Build a new `Pending` item from an admitted request.
    #[must_use]
    pub fn from_request(
        request: &DownloadRequest,
        user_id: i64,
        destination_path: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: DownloadId::new(),
            user_id,
            book_id: request.book_id,
            indexer_id: request.indexer_id,
            title: request.title.clone(),
            author: request.author.clone(),
            download_url: request.download_url.clone(),
            file_format: request.file_format,
            file_size_bytes: request.file_size_bytes,
            priority: request.priority.unwrap_or(PRIORITY_DEFAULT),
            status: DownloadStatus::Pending,
            progress_percent: 0,
            destination_path,
            retry_count: 0,
            max_retries: request.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            estimated_completion: None,
            not_before: None,
        }
    }

    /// Whether the item is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the automatic-retry budget is exhausted.
    #[must_use]
    pub const fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Ephemeral progress snapshot for one download attempt.
///
/// Owned by the worker processing the download; read-only everywhere else.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub download_id: DownloadId,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Instantaneous speed estimate in bytes per second.
    pub speed_bps: f64,
    /// Estimated seconds remaining, when the speed estimate allows one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl DownloadProgress {
    /// Snapshot a downloading attempt from its byte counter.
    #[must_use]
    pub fn downloading(
        download_id: DownloadId,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        speed_bps: f64,
    ) -> Self {
        let eta_seconds = match total_bytes {
            #[allow(clippy::cast_precision_loss)]
            Some(total) if speed_bps > 0.0 && total > bytes_downloaded => {
                Some((total - bytes_downloaded) as f64 / speed_bps)
            }
            _ => None,
        };

        Self {
            download_id,
            status: DownloadStatus::Downloading,
            bytes_downloaded,
            total_bytes,
            speed_bps,
            eta_seconds,
            timestamp: Utc::now(),
        }
    }

    /// Progress percentage, withheld when the total is unknown.
    ///
    /// Computed as `floor(bytes * 100 / total)`.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        self.total_bytes.and_then(|total| {
            if total == 0 {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            Some(((self.bytes_downloaded.min(total) * 100) / total) as u8)
        })
    }
}

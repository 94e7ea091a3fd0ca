//! Download domain: queue items, status machine, errors and events.

mod errors;
mod events;
mod types;

pub use errors::{DownloadError, DownloadResult};
pub use events::{DownloadEvent, DownloadStatus};
pub use types::{
    BookFormat, DownloadId, DownloadProgress, DownloadRequest, QueueItem, DEFAULT_MAX_RETRIES,
    PRIORITY_DEFAULT, PRIORITY_MAX, PRIORITY_MIN,
};

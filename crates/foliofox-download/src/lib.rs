#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

// Re-export core types for convenience
pub use foliofox_core::config::DownloadManagerConfig;
pub use foliofox_core::download::{
    DownloadError, DownloadEvent, DownloadId, DownloadProgress, DownloadRequest, DownloadStatus,
    QueueItem,
};
pub use foliofox_core::ports::{HistoryRecord, QueueFilter, QueueStorePort};

mod manager;
mod placement;
mod progress;
mod store;
mod transfer;

// Public API - the orchestration engine
pub use manager::{BatchAction, BatchActionResult, DownloadManager, DownloadManagerDeps};

// Queue store reference implementation
pub use store::MemoryQueueStore;

// Progress delivery for consumers (adapters)
pub use progress::ProgressBroadcaster;

// File placement
pub use placement::{organize, organized_path, PlacementResolver};

// Transfer abstraction (public so adapters can inject their own)
pub use transfer::{HttpTransferClient, TransferClient, TransferContext, TransferSnapshot};

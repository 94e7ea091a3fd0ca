#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

pub mod config;
pub mod download;
pub mod indexer;
pub mod ports;
pub mod search;

// Re-export commonly used types for convenience
pub use config::{DownloadManagerConfig, SearchConfig};
pub use download::{
    BookFormat, DownloadError, DownloadEvent, DownloadId, DownloadProgress, DownloadRequest,
    DownloadResult, DownloadStatus, QueueItem, DEFAULT_MAX_RETRIES, PRIORITY_DEFAULT,
    PRIORITY_MAX, PRIORITY_MIN,
};
pub use indexer::{HealthStatus, Indexer, IndexerHealth, IndexerId};
pub use ports::{
    DownloadFolder, EventSinkPort, HistoryRecord, IndexerClientPort, IndexerPortError,
    IndexerRegistryPort, MemoryIndexerRegistry, NoopEventSink, PreferencesPort, ProbeOutcome,
    QualityProfile, QueueFilter, QueueStorePort, RegistryError, SearchHistoryEntry,
    SearchHistoryPort, StaticPreferences,
};
pub use search::{
    IndexerFailure, QuerySignature, SearchError, SearchFilters, SearchRequest, SearchResponse,
    SearchResult, Suggestion, DEFAULT_RESULT_LIMIT,
};

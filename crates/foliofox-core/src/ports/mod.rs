//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core domain expects from
//! infrastructure. They contain no implementation details and use only
//! domain types.
//!
//! # Design Rules
//!
//! - No database or HTTP types in any signature
//! - Intent-based methods, not generic CRUD
//! - Reference in-memory implementations ship next to the trait where the
//!   engine needs one for wiring and tests

pub mod event_sink;
pub mod indexer_client;
pub mod indexer_registry;
pub mod preferences;
pub mod queue_store;
pub mod search_history;

pub use event_sink::{EventSinkPort, NoopEventSink};
pub use indexer_client::{IndexerClientPort, IndexerPortError, ProbeOutcome};
pub use indexer_registry::{IndexerRegistryPort, MemoryIndexerRegistry, RegistryError};
pub use preferences::{DownloadFolder, PreferencesPort, QualityProfile, StaticPreferences};
pub use queue_store::{HistoryRecord, QueueFilter, QueueStorePort};
pub use search_history::{SearchHistoryEntry, SearchHistoryPort};

//! Indexer registry port and its in-memory reference implementation.
//!
//! The registry owns indexer configuration and the append-only health
//! time series. A durable implementation is an external collaborator;
//! `MemoryIndexerRegistry` backs tests and single-process wiring.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::indexer::{Indexer, IndexerHealth, IndexerId};

/// Errors from registry operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No indexer with the given id.
    #[error("Indexer not found: {id}")]
    NotFound { id: IndexerId },

    /// Backend failure.
    #[error("Registry error: {message}")]
    Backend { message: String },
}

/// Port for indexer configuration and health records.
#[async_trait]
pub trait IndexerRegistryPort: Send + Sync {
    /// All enabled indexers.
    async fn list_enabled(&self) -> Result<Vec<Indexer>, RegistryError>;

    /// Enabled indexers visible to one user.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Indexer>, RegistryError>;

    /// Fetch one indexer.
    async fn get(&self, id: IndexerId) -> Result<Indexer, RegistryError>;

    /// Append a health record.
    async fn record_health(&self, record: IndexerHealth) -> Result<(), RegistryError>;

    /// Most recent health record, if the indexer was ever probed.
    async fn current_health(&self, id: IndexerId) -> Result<Option<IndexerHealth>, RegistryError>;
}

/// In-memory registry: indexers keyed by id, bounded health series per
/// indexer.
#[derive(Default)]
pub struct MemoryIndexerRegistry {
    indexers: RwLock<HashMap<IndexerId, Indexer>>,
    health: RwLock<HashMap<IndexerId, Vec<IndexerHealth>>>,
}

/// Health records kept per indexer before the oldest are dropped.
const HEALTH_SERIES_CAP: usize = 100;

impl MemoryIndexerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an indexer.
    pub async fn upsert(&self, indexer: Indexer) {
        self.indexers.write().await.insert(indexer.id, indexer);
    }

    /// Remove an indexer and its health series.
    pub async fn remove(&self, id: IndexerId) {
        self.indexers.write().await.remove(&id);
        self.health.write().await.remove(&id);
    }
}

#[async_trait]
impl IndexerRegistryPort for MemoryIndexerRegistry {
    async fn list_enabled(&self) -> Result<Vec<Indexer>, RegistryError> {
        let indexers = self.indexers.read().await;
        let mut enabled: Vec<Indexer> =
            indexers.values().filter(|i| i.enabled).cloned().collect();
        enabled.sort_by_key(|i| i.id);
        Ok(enabled)
    }

    async fn list_for_user(&self, _user_id: i64) -> Result<Vec<Indexer>, RegistryError> {
        // The in-memory registry has no per-user enablement; a durable
        // implementation joins against user settings here.
        self.list_enabled().await
    }

    async fn get(&self, id: IndexerId) -> Result<Indexer, RegistryError> {
        self.indexers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound { id })
    }

    async fn record_health(&self, record: IndexerHealth) -> Result<(), RegistryError> {
        let mut health = self.health.write().await;
        let series = health.entry(record.indexer_id).or_default();
        series.push(record);
        if series.len() > HEALTH_SERIES_CAP {
            let excess = series.len() - HEALTH_SERIES_CAP;
            series.drain(..excess);
        }
        Ok(())
    }

    async fn current_health(&self, id: IndexerId) -> Result<Option<IndexerHealth>, RegistryError> {
        Ok(self
            .health
            .read()
            .await
            .get(&id)
            .and_then(|series| series.last().cloned()))
    }
}

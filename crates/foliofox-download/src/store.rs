//! In-memory queue store.
//!
//! Reference implementation of `QueueStorePort`: a pure state machine
//! guarded by an async lock. Every transition is validated against the
//! status machine under the write lock, which serializes concurrent
//! transitions per item; the claim step is the compare-and-set that
//! guarantees only one worker ever holds `Downloading` for an id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use foliofox_core::download::{DownloadError, DownloadId, DownloadStatus, QueueItem};
use foliofox_core::ports::{HistoryRecord, QueueFilter, QueueStorePort};

/// In-memory queue store.
#[derive(Default)]
pub struct MemoryQueueStore {
    items: RwLock<HashMap<DownloadId, QueueItem>>,
    history: RwLock<Vec<HistoryRecord>>,
}

impl MemoryQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_transition(
        item: &QueueItem,
        to: DownloadStatus,
        action: &str,
    ) -> Result<(), DownloadError> {
        if item.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(DownloadError::invalid_state(
                item.id.to_string(),
                item.status,
                action,
            ))
        }
    }
}

#[async_trait]
impl QueueStorePort for MemoryQueueStore {
    async fn create(&self, item: &QueueItem) -> Result<(), DownloadError> {
        let mut items = self.items.write().await;
        if items.contains_key(&item.id) {
            return Err(DownloadError::store(format!(
                "duplicate queue item {}",
                item.id
            )));
        }
        items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get(&self, id: DownloadId) -> Result<QueueItem, DownloadError> {
        self.items
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DownloadError::not_found(id.to_string()))
    }

    async fn claim_pending(&self, id: DownloadId) -> Result<bool, DownloadError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| DownloadError::not_found(id.to_string()))?;

        if item.status != DownloadStatus::Pending {
            return Ok(false);
        }

        let now = Utc::now();
        item.status = DownloadStatus::Downloading;
        item.started_at = Some(now);
        item.updated_at = now;
        item.progress_percent = 0;
        item.error_message = None;
        item.not_before = None;
        item.estimated_completion = None;
        Ok(true)
    }

    async fn list_dispatchable(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        exclude: &[DownloadId],
    ) -> Result<Vec<QueueItem>, DownloadError> {
        let items = self.items.read().await;
        let mut ready: Vec<QueueItem> = items
            .values()
            .filter(|item| item.status == DownloadStatus::Pending)
            .filter(|item| item.not_before.is_none_or(|t| t <= now))
            .filter(|item| !exclude.contains(&item.id))
            .cloned()
            .collect();

        // Lower priority number wins, ties broken by age.
        ready.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        ready.truncate(limit);
        Ok(ready)
    }

    async fn update_progress(
        &self,
        id: DownloadId,
        percent: u8,
        estimated_completion: Option<DateTime<Utc>>,
    ) -> Result<(), DownloadError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| DownloadError::not_found(id.to_string()))?;

        // Progress writes racing a pause/cancel are dropped, and progress
        // is monotonic within an attempt.
        if item.status == DownloadStatus::Downloading && percent > item.progress_percent {
            item.progress_percent = percent.min(100);
            item.estimated_completion = estimated_completion;
            item.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_status(
        &self,
        id: DownloadId,
        status: DownloadStatus,
        error: Option<String>,
    ) -> Result<QueueItem, DownloadError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| DownloadError::not_found(id.to_string()))?;

        Self::check_transition(item, status, status.as_str())?;

        let now = Utc::now();
        item.status = status;
        item.updated_at = now;
        item.error_message = error;
        match status {
            DownloadStatus::Completed => {
                item.progress_percent = 100;
                item.completed_at = Some(now);
                item.estimated_completion = None;
            }
            DownloadStatus::Failed | DownloadStatus::Cancelled => {
                item.completed_at = Some(now);
                item.estimated_completion = None;
            }
            DownloadStatus::Pending => {
                item.not_before = None;
            }
            _ => {}
        }
        Ok(item.clone())
    }

    async fn reschedule_retry(
        &self,
        id: DownloadId,
        error: String,
        not_before: DateTime<Utc>,
    ) -> Result<QueueItem, DownloadError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| DownloadError::not_found(id.to_string()))?;

        if item.status != DownloadStatus::Downloading {
            return Err(DownloadError::invalid_state(
                item.id.to_string(),
                item.status,
                "reschedule",
            ));
        }
        if item.retries_exhausted() {
            return Err(DownloadError::max_retries_exceeded(
                item.id.to_string(),
                item.max_retries,
            ));
        }

        item.retry_count += 1;
        item.status = DownloadStatus::Pending;
        item.progress_percent = 0;
        item.error_message = Some(error);
        item.not_before = Some(not_before);
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn reopen_failed(&self, id: DownloadId) -> Result<QueueItem, DownloadError> {
        let mut items = self.items.write().await;
        let item = items
            .get_mut(&id)
            .ok_or_else(|| DownloadError::not_found(id.to_string()))?;

        if item.status != DownloadStatus::Failed {
            return Err(DownloadError::invalid_state(
                item.id.to_string(),
                item.status,
                "retry",
            ));
        }
        if item.retries_exhausted() {
            return Err(DownloadError::max_retries_exceeded(
                item.id.to_string(),
                item.max_retries,
            ));
        }

        item.retry_count += 1;
        item.status = DownloadStatus::Pending;
        item.progress_percent = 0;
        item.error_message = None;
        item.not_before = None;
        item.completed_at = None;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn list(&self, filter: &QueueFilter) -> Result<Vec<QueueItem>, DownloadError> {
        let items = self.items.read().await;
        let mut matching: Vec<QueueItem> = items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page: Vec<QueueItem> = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(page)
    }

    async fn record_history(&self, record: HistoryRecord) -> Result<(), DownloadError> {
        self.history.write().await.push(record);
        Ok(())
    }

    async fn history_for(&self, id: DownloadId) -> Result<Vec<HistoryRecord>, DownloadError> {
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|record| record.download_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foliofox_core::download::{BookFormat, DownloadRequest};
    use foliofox_core::indexer::IndexerId;
    use std::path::PathBuf;

    fn request(priority: u8) -> DownloadRequest {
        DownloadRequest::new(
            IndexerId(1),
            "Title",
            "Author",
            "https://indexer.example/dl/1.epub",
            BookFormat::Epub,
        )
        .with_priority(priority)
    }

    async fn insert(store: &MemoryQueueStore, priority: u8) -> QueueItem {
        let item = QueueItem::from_request(&request(priority), 1, PathBuf::from("/books/x.epub"));
        store.create(&item).await.unwrap();
        // Distinct created_at for deterministic ordering.
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        item
    }

    #[tokio::test]
    async fn claim_is_a_compare_and_set() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;

        assert!(store.claim_pending(item.id).await.unwrap());
        // Second claim fails: the item is no longer pending.
        assert!(!store.claim_pending(item.id).await.unwrap());

        let claimed = store.get(item.id).await.unwrap();
        assert_eq!(claimed.status, DownloadStatus::Downloading);
        assert!(claimed.started_at.is_some());
    }

    #[tokio::test]
    async fn dispatch_order_is_priority_then_age() {
        let store = MemoryQueueStore::new();
        let first = insert(&store, 5).await;
        let urgent = insert(&store, 1).await;
        let second = insert(&store, 5).await;

        let ready = store
            .list_dispatchable(Utc::now(), 10, &[])
            .await
            .unwrap();
        let ids: Vec<DownloadId> = ready.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![urgent.id, first.id, second.id]);
    }

    #[tokio::test]
    async fn deferred_items_are_not_dispatchable() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;
        store.claim_pending(item.id).await.unwrap();
        store
            .reschedule_retry(
                item.id,
                "connection reset".to_string(),
                Utc::now() + chrono::Duration::seconds(300),
            )
            .await
            .unwrap();

        let ready = store.list_dispatchable(Utc::now(), 10, &[]).await.unwrap();
        assert!(ready.is_empty());

        // Once the delay elapses the item is dispatchable again.
        let later = Utc::now() + chrono::Duration::seconds(301);
        let ready = store.list_dispatchable(later, 10, &[]).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].retry_count, 1);
    }

    #[tokio::test]
    async fn excluded_items_are_skipped() {
        let store = MemoryQueueStore::new();
        let a = insert(&store, 5).await;
        let b = insert(&store, 5).await;

        let ready = store
            .list_dispatchable(Utc::now(), 10, &[a.id])
            .await
            .unwrap();
        let ids: Vec<DownloadId> = ready.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![b.id]);
    }

    #[tokio::test]
    async fn progress_is_monotonic_within_an_attempt() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;
        store.claim_pending(item.id).await.unwrap();

        store.update_progress(item.id, 40, None).await.unwrap();
        store.update_progress(item.id, 30, None).await.unwrap();
        assert_eq!(store.get(item.id).await.unwrap().progress_percent, 40);

        store.update_progress(item.id, 80, None).await.unwrap();
        assert_eq!(store.get(item.id).await.unwrap().progress_percent, 80);
    }

    #[tokio::test]
    async fn progress_after_pause_is_dropped() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;
        store.claim_pending(item.id).await.unwrap();
        store
            .set_status(item.id, DownloadStatus::Paused, None)
            .await
            .unwrap();

        store.update_progress(item.id, 50, None).await.unwrap();
        assert_eq!(store.get(item.id).await.unwrap().progress_percent, 0);
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected_without_mutation() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;

        // Pending -> Completed skips Downloading.
        let err = store
            .set_status(item.id, DownloadStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::InvalidState { .. }));
        assert_eq!(
            store.get(item.id).await.unwrap().status,
            DownloadStatus::Pending
        );
    }

    #[tokio::test]
    async fn terminal_states_are_immutable() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;
        store.claim_pending(item.id).await.unwrap();
        store
            .set_status(item.id, DownloadStatus::Completed, None)
            .await
            .unwrap();

        for status in [
            DownloadStatus::Pending,
            DownloadStatus::Downloading,
            DownloadStatus::Cancelled,
        ] {
            let err = store.set_status(item.id, status, None).await.unwrap_err();
            assert!(matches!(err, DownloadError::InvalidState { .. }));
        }
    }

    #[tokio::test]
    async fn reopen_failed_respects_budget() {
        let store = MemoryQueueStore::new();
        let mut item = QueueItem::from_request(&request(5), 1, PathBuf::from("/x.epub"));
        item.max_retries = 1;
        store.create(&item).await.unwrap();

        store.claim_pending(item.id).await.unwrap();
        store
            .set_status(item.id, DownloadStatus::Failed, Some("404".to_string()))
            .await
            .unwrap();

        // First operator retry fits the budget.
        let reopened = store.reopen_failed(item.id).await.unwrap();
        assert_eq!(reopened.status, DownloadStatus::Pending);
        assert_eq!(reopened.retry_count, 1);
        assert!(reopened.error_message.is_none());

        // Fail again; the budget is now exhausted.
        store.claim_pending(item.id).await.unwrap();
        store
            .set_status(item.id, DownloadStatus::Failed, Some("404".to_string()))
            .await
            .unwrap();
        let err = store.reopen_failed(item.id).await.unwrap_err();
        assert!(matches!(err, DownloadError::MaxRetriesExceeded { .. }));
    }

    #[tokio::test]
    async fn reopen_requires_failed_status() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;

        let err = store.reopen_failed(item.id).await.unwrap_err();
        assert!(matches!(err, DownloadError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn reschedule_never_exceeds_budget() {
        let store = MemoryQueueStore::new();
        let mut item = QueueItem::from_request(&request(5), 1, PathBuf::from("/x.epub"));
        item.max_retries = 1;
        store.create(&item).await.unwrap();

        store.claim_pending(item.id).await.unwrap();
        store
            .reschedule_retry(item.id, "boom".to_string(), Utc::now())
            .await
            .unwrap();

        store.claim_pending(item.id).await.unwrap();
        let err = store
            .reschedule_retry(item.id, "boom".to_string(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::MaxRetriesExceeded { .. }));

        let current = store.get(item.id).await.unwrap();
        assert!(current.retry_count <= current.max_retries);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = MemoryQueueStore::new();
        for _ in 0..5 {
            insert(&store, 5).await;
        }
        let other_user =
            QueueItem::from_request(&request(5), 2, PathBuf::from("/books/other.epub"));
        store.create(&other_user).await.unwrap();

        let filter = QueueFilter::default().with_user(1).with_page(1, 2);
        let page = store.list(&filter).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page.iter().all(|item| item.user_id == 1));

        // Newest first.
        assert!(page[0].created_at >= page[1].created_at);
    }

    #[tokio::test]
    async fn history_roundtrip() {
        let store = MemoryQueueStore::new();
        let item = insert(&store, 5).await;
        store.claim_pending(item.id).await.unwrap();
        let terminal = store
            .set_status(item.id, DownloadStatus::Completed, None)
            .await
            .unwrap();

        store
            .record_history(HistoryRecord::for_item(&terminal, 4096))
            .await
            .unwrap();

        let records = store.history_for(item.id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].final_status, DownloadStatus::Completed);
        assert_eq!(records[0].bytes_transferred, 4096);
        assert!(records[0].duration_secs.is_some());
    }
}

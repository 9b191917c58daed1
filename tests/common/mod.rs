//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use prometheus_posting_queue::core::{
    CompletionEngine, HistoryRecord, HistoryStore, MediaCatalog, MediaItem, OperationCoordinator,
    PostingQueue, QueueError, QueueStore, WorkItem,
};
use prometheus_posting_queue::infra::{
    InMemoryCatalog, InMemoryCategoryMixStore, InMemoryHistoryStore, InMemoryNotifier,
    InMemoryQueueStore, PoolLimits, SessionPool,
};
use prometheus_posting_queue::util::{
    init_tracing, ChatRef, Clock, ManualClock, MediaId, WorkItemId,
};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

pub const CHAT: ChatRef = ChatRef(-100_200);

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

pub fn pool_limits() -> PoolLimits {
    PoolLimits {
        max_sessions: 4,
        acquire_timeout: Duration::from_millis(200),
        idle_in_transaction_timeout: Duration::from_secs(30),
    }
}

/// In-memory collaborators plus a shared coordinator and pool.
pub struct Harness {
    pub queue: Arc<InMemoryQueueStore>,
    pub history: Arc<InMemoryHistoryStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub mix: Arc<InMemoryCategoryMixStore>,
    pub notifier: Arc<InMemoryNotifier>,
    pub clock: Arc<ManualClock>,
    pub pool: Arc<SessionPool>,
    pub coordinator: Arc<OperationCoordinator>,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            queue: Arc::new(InMemoryQueueStore::new()),
            history: Arc::new(InMemoryHistoryStore::new()),
            catalog: Arc::new(InMemoryCatalog::new()),
            mix: Arc::new(InMemoryCategoryMixStore::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
            clock: Arc::new(ManualClock::new(t0())),
            pool: Arc::new(SessionPool::new(pool_limits())),
            coordinator: Arc::new(OperationCoordinator::new(Duration::from_secs(60))),
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn engine(&self) -> CompletionEngine {
        self.engine_with(self.queue.clone(), self.history.clone())
    }

    pub fn engine_with(
        &self,
        queue: Arc<dyn QueueStore>,
        history: Arc<dyn HistoryStore>,
    ) -> CompletionEngine {
        self.engine_with_catalog(queue, history, self.catalog.clone())
    }

    pub fn engine_with_catalog(
        &self,
        queue: Arc<dyn QueueStore>,
        history: Arc<dyn HistoryStore>,
        catalog: Arc<dyn MediaCatalog>,
    ) -> CompletionEngine {
        CompletionEngine::new(
            queue,
            history,
            catalog,
            Arc::clone(&self.pool),
            self.notifier.clone(),
            self.clock(),
            chrono::Duration::hours(72),
        )
    }

    pub fn service(&self) -> PostingQueue {
        PostingQueue::new(Arc::clone(&self.coordinator), Arc::new(self.engine()))
    }

    pub fn service_with(&self, engine: CompletionEngine) -> PostingQueue {
        PostingQueue::new(Arc::clone(&self.coordinator), Arc::new(engine))
    }

    pub fn add_media(&self, id: u64, category: &str) -> MediaItem {
        let item = MediaItem::new(MediaId(id), category);
        self.catalog.insert(item.clone());
        item
    }

    /// Catalog entry plus a pending work item pointing at it.
    pub async fn seed_item(&self, media: u64, category: &str) -> WorkItem {
        let media = self.add_media(media, category);
        let item = WorkItem::pending(media.media_ref(), CHAT, t0(), t0());
        self.queue.create(item.clone()).await.unwrap();
        item
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// History store whose first `failures` appends fail transiently without
/// writing anything.
pub struct FlakyHistory {
    pub inner: Arc<InMemoryHistoryStore>,
    failures: AtomicU32,
}

impl FlakyHistory {
    pub fn new(inner: Arc<InMemoryHistoryStore>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl HistoryStore for FlakyHistory {
    async fn append(&self, record: HistoryRecord) -> Result<(), QueueError> {
        if take_failure(&self.failures) {
            return Err(QueueError::TransientStore("connection reset by peer".into()));
        }
        self.inner.append(record).await
    }

    async fn find_latest_by_work_item(
        &self,
        id: WorkItemId,
    ) -> Result<Option<HistoryRecord>, QueueError> {
        self.inner.find_latest_by_work_item(id).await
    }

    async fn find_by_work_item(&self, id: WorkItemId) -> Result<Vec<HistoryRecord>, QueueError> {
        self.inner.find_by_work_item(id).await
    }
}

/// Queue store whose first `failures` deletes fail transiently after the
/// history record has already been written.
pub struct FlakyDelete {
    pub inner: Arc<InMemoryQueueStore>,
    failures: AtomicU32,
    /// When set, the failing delete still removes the item, as if the
    /// connection dropped after the server committed.
    delete_anyway: bool,
}

impl FlakyDelete {
    pub fn new(inner: Arc<InMemoryQueueStore>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            delete_anyway: false,
        }
    }

    pub fn committing(inner: Arc<InMemoryQueueStore>, failures: u32) -> Self {
        Self {
            delete_anyway: true,
            ..Self::new(inner, failures)
        }
    }
}

#[async_trait]
impl QueueStore for FlakyDelete {
    async fn create(&self, item: WorkItem) -> Result<(), QueueError> {
        self.inner.create(item).await
    }

    async fn get_by_id(&self, id: WorkItemId) -> Result<Option<WorkItem>, QueueError> {
        self.inner.get_by_id(id).await
    }

    async fn delete(&self, id: WorkItemId) -> Result<bool, QueueError> {
        if take_failure(&self.failures) {
            if self.delete_anyway {
                self.inner.delete(id).await?;
            }
            return Err(QueueError::TransientStore("server closed the connection".into()));
        }
        self.inner.delete(id).await
    }

    async fn list_pending(&self) -> Result<Vec<WorkItem>, QueueError> {
        self.inner.list_pending().await
    }
}

/// Catalog with no entries at all.
pub struct EmptyCatalog;

#[async_trait]
impl MediaCatalog for EmptyCatalog {
    async fn categories(&self) -> Result<Vec<String>, QueueError> {
        Ok(Vec::new())
    }

    async fn list_eligible(
        &self,
        _category: &str,
        _now: DateTime<Utc>,
    ) -> Result<Vec<MediaItem>, QueueError> {
        Ok(Vec::new())
    }

    async fn record_post(
        &self,
        _id: MediaId,
        _work_item_id: WorkItemId,
        _at: DateTime<Utc>,
    ) -> Result<bool, QueueError> {
        Ok(false)
    }

    async fn add_cooldown(&self, _id: MediaId, _until: DateTime<Utc>) -> Result<(), QueueError> {
        Ok(())
    }
}

/// Catalog whose first `failures` cooldown writes fail transiently, after the
/// post counter has already been bumped.
pub struct FlakyCooldown {
    pub inner: Arc<InMemoryCatalog>,
    failures: AtomicU32,
}

impl FlakyCooldown {
    pub fn new(inner: Arc<InMemoryCatalog>, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl MediaCatalog for FlakyCooldown {
    async fn categories(&self) -> Result<Vec<String>, QueueError> {
        self.inner.categories().await
    }

    async fn list_eligible(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MediaItem>, QueueError> {
        self.inner.list_eligible(category, now).await
    }

    async fn record_post(
        &self,
        id: MediaId,
        work_item_id: WorkItemId,
        at: DateTime<Utc>,
    ) -> Result<bool, QueueError> {
        self.inner.record_post(id, work_item_id, at).await
    }

    async fn add_cooldown(&self, id: MediaId, until: DateTime<Utc>) -> Result<(), QueueError> {
        if take_failure(&self.failures) {
            return Err(QueueError::TransientStore("statement timeout".into()));
        }
        self.inner.add_cooldown(id, until).await
    }
}

//! Persistence contracts the engine calls through.
//!
//! Implementations live outside the core; `infra` ships in-memory versions
//! for development and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::model::{HistoryRecord, MediaItem, WorkItem};
use crate::core::QueueError;
use crate::util::ids::{MediaId, WorkItemId};

/// Pending work items.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new pending item.
    async fn create(&self, item: WorkItem) -> Result<(), QueueError>;
    /// Fetch an item; `None` once it has been resolved.
    async fn get_by_id(&self, id: WorkItemId) -> Result<Option<WorkItem>, QueueError>;
    /// Remove an item. Returns whether it was present.
    async fn delete(&self, id: WorkItemId) -> Result<bool, QueueError>;
    /// All pending items, oldest slot first.
    async fn list_pending(&self) -> Result<Vec<WorkItem>, QueueError>;
}

/// Append-only history of terminal transitions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a record. Never updates or deletes.
    async fn append(&self, record: HistoryRecord) -> Result<(), QueueError>;
    /// Most recent record for a work item.
    async fn find_latest_by_work_item(
        &self,
        id: WorkItemId,
    ) -> Result<Option<HistoryRecord>, QueueError>;
    /// Every record for a work item, most recent first.
    async fn find_by_work_item(&self, id: WorkItemId) -> Result<Vec<HistoryRecord>, QueueError>;
}

/// Ordering key for exposure spreading: never-posted items first, then the
/// oldest `last_posted_at`, then catalog id.
pub fn least_recent_key(item: &MediaItem) -> (Option<DateTime<Utc>>, MediaId) {
    (item.last_posted_at, item.id)
}

/// Inventory of postable media with usage and cooldown state.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Categories that have at least one catalog entry.
    async fn categories(&self) -> Result<Vec<String>, QueueError>;

    /// Items of `category` not under a cooldown lock at `now`, in
    /// [`least_recent_key`] order.
    async fn list_eligible(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MediaItem>, QueueError>;

    /// The single best candidate of `category` at `now`.
    async fn least_recently_used(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MediaItem>, QueueError> {
        let eligible = self.list_eligible(category, now).await?;
        Ok(eligible.into_iter().min_by_key(least_recent_key))
    }

    /// Increment the post counter and stamp `last_posted_at` for the post
    /// made by `work_item_id`.
    ///
    /// Idempotent per work item: a repeat for a work item already counted
    /// changes nothing and returns `false`.
    async fn record_post(
        &self,
        id: MediaId,
        work_item_id: WorkItemId,
        at: DateTime<Utc>,
    ) -> Result<bool, QueueError>;

    /// Exclude the item from selection until `until`.
    async fn add_cooldown(&self, id: MediaId, until: DateTime<Utc>) -> Result<(), QueueError>;
}

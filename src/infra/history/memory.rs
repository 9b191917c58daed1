//! Append-only in-memory history.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{HistoryRecord, HistoryStore, QueueError};
use crate::util::ids::WorkItemId;

/// History log kept in insertion order.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: RwLock<Vec<HistoryRecord>>,
}

impl InMemoryHistoryStore {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Vec<HistoryRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, record: HistoryRecord) -> Result<(), QueueError> {
        self.records.write().push(record);
        Ok(())
    }

    async fn find_latest_by_work_item(
        &self,
        id: WorkItemId,
    ) -> Result<Option<HistoryRecord>, QueueError> {
        // max_by_key keeps the last maximum, so later appends win ties
        Ok(self
            .records
            .read()
            .iter()
            .filter(|r| r.work_item_id == id)
            .max_by_key(|r| r.posted_at)
            .cloned())
    }

    async fn find_by_work_item(&self, id: WorkItemId) -> Result<Vec<HistoryRecord>, QueueError> {
        let mut found: Vec<HistoryRecord> = self
            .records
            .read()
            .iter()
            .filter(|r| r.work_item_id == id)
            .cloned()
            .collect();
        found.reverse();
        found.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
        Ok(found)
    }
}

//! In-memory queue store keyed by work item id.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{QueueError, QueueStore, WorkItem};
use crate::util::ids::WorkItemId;

/// Pending work items held in a map. Suitable for development and tests.
#[derive(Default)]
pub struct InMemoryQueueStore {
    items: RwLock<HashMap<WorkItemId, WorkItem>>,
}

impl InMemoryQueueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Whether no item is pending.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn create(&self, item: WorkItem) -> Result<(), QueueError> {
        let mut items = self.items.write();
        if items.contains_key(&item.id) {
            return Err(QueueError::Store(format!("work item {} already exists", item.id)));
        }
        items.insert(item.id, item);
        Ok(())
    }

    async fn get_by_id(&self, id: WorkItemId) -> Result<Option<WorkItem>, QueueError> {
        Ok(self.items.read().get(&id).cloned())
    }

    async fn delete(&self, id: WorkItemId) -> Result<bool, QueueError> {
        Ok(self.items.write().remove(&id).is_some())
    }

    async fn list_pending(&self) -> Result<Vec<WorkItem>, QueueError> {
        let mut pending: Vec<WorkItem> = self.items.read().values().cloned().collect();
        pending.sort_by_key(|item| (item.scheduled_for, item.id));
        Ok(pending)
    }
}

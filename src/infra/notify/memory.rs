//! In-memory acknowledgement mailbox.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::{Acknowledgement, Notifier, QueueError};
use crate::util::ids::WorkItemId;

/// Stores acknowledgements per work item for later inspection.
#[derive(Default)]
pub struct InMemoryNotifier {
    acks: Mutex<HashMap<WorkItemId, Vec<Acknowledgement>>>,
}

impl InMemoryNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch acknowledgements for an item, optionally since a timestamp.
    pub fn fetch(
        &self,
        id: WorkItemId,
        since_ms: Option<u128>,
        limit: usize,
    ) -> Vec<Acknowledgement> {
        self.acks
            .lock()
            .get(&id)
            .map(|acks| {
                acks.iter()
                    .filter(|a| since_ms.is_none_or(|s| a.created_at_ms >= s))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total acknowledgements delivered.
    pub fn len(&self) -> usize {
        self.acks.lock().values().map(Vec::len).sum()
    }

    /// Whether nothing was delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Notifier for InMemoryNotifier {
    fn acknowledge(&self, ack: &Acknowledgement) -> Result<(), QueueError> {
        self.acks
            .lock()
            .entry(ack.work_item_id)
            .or_default()
            .push(ack.clone());
        Ok(())
    }
}

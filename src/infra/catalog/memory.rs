//! In-memory media catalog.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::core::{least_recent_key, MediaCatalog, MediaItem, QueueError};
use crate::util::ids::{MediaId, WorkItemId};

#[derive(Default)]
struct CatalogState {
    items: BTreeMap<MediaId, MediaItem>,
    /// Work items whose post has been counted.
    counted: HashSet<WorkItemId>,
}

/// Catalog held in an id-ordered map.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&self, item: MediaItem) {
        self.state.write().items.insert(item.id, item);
    }

    /// Look up an entry.
    pub fn get(&self, id: MediaId) -> Option<MediaItem> {
        self.state.read().items.get(&id).cloned()
    }

    fn update<F>(&self, id: MediaId, f: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut MediaItem),
    {
        let mut state = self.state.write();
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| QueueError::Store(format!("media {} not in catalog", id.0)))?;
        f(item);
        Ok(())
    }
}

#[async_trait]
impl MediaCatalog for InMemoryCatalog {
    async fn categories(&self) -> Result<Vec<String>, QueueError> {
        let names: BTreeSet<String> = self
            .state
            .read()
            .items
            .values()
            .map(|item| item.category.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn list_eligible(
        &self,
        category: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MediaItem>, QueueError> {
        let mut eligible: Vec<MediaItem> = self
            .state
            .read()
            .items
            .values()
            .filter(|item| item.category == category && !item.is_cooling_down(now))
            .cloned()
            .collect();
        eligible.sort_by_key(least_recent_key);
        Ok(eligible)
    }

    async fn record_post(
        &self,
        id: MediaId,
        work_item_id: WorkItemId,
        at: DateTime<Utc>,
    ) -> Result<bool, QueueError> {
        let mut state = self.state.write();
        let state = &mut *state;
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| QueueError::Store(format!("media {} not in catalog", id.0)))?;
        if !state.counted.insert(work_item_id) {
            return Ok(false);
        }
        item.post_count = item.post_count.saturating_add(1);
        item.last_posted_at = Some(at);
        Ok(true)
    }

    async fn add_cooldown(&self, id: MediaId, until: DateTime<Utc>) -> Result<(), QueueError> {
        self.update(id, |item| {
            item.cooldown_until = Some(item.cooldown_until.map_or(until, |cur| cur.max(until)));
        })
    }
}

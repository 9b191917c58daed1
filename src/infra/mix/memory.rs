//! Insert-only in-memory category mix.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::core::{validate_ratios, CategoryMix, CategoryMixStore, QueueError, Ratios};

/// Every mix row ever written, oldest first.
#[derive(Default)]
pub struct InMemoryCategoryMixStore {
    rows: RwLock<Vec<CategoryMix>>,
}

impl InMemoryCategoryMixStore {
    /// Create a store with no mix.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CategoryMixStore for InMemoryCategoryMixStore {
    async fn current_ratios(&self) -> Result<Ratios, QueueError> {
        Ok(self
            .rows
            .read()
            .iter()
            .filter(|row| row.is_current)
            .map(|row| (row.category.clone(), row.ratio))
            .collect())
    }

    async fn set_ratios(&self, ratios: Ratios, at: DateTime<Utc>) -> Result<(), QueueError> {
        validate_ratios(&ratios)?;
        let mut rows = self.rows.write();
        for row in rows.iter_mut().filter(|row| row.is_current) {
            row.is_current = false;
            row.effective_to = Some(at);
        }
        rows.extend(ratios.iter().map(|(category, ratio)| CategoryMix {
            category: category.clone(),
            ratio: *ratio,
            effective_from: at,
            effective_to: None,
            is_current: true,
        }));
        info!(categories = ratios.len(), "category mix updated");
        Ok(())
    }

    async fn history(&self) -> Result<Vec<CategoryMix>, QueueError> {
        Ok(self.rows.read().clone())
    }
}

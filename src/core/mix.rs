//! Versioned per-category posting ratios.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::model::CategoryMix;
use crate::core::QueueError;

/// Allowed deviation of a current ratio set from 1.0.
pub const RATIO_EPSILON: f64 = 1e-3;

/// Category → ratio map, ordered by category name.
pub type Ratios = BTreeMap<String, f64>;

/// History-preserving store of category ratios.
///
/// Writes never overwrite: a new ratio set closes every current row and
/// inserts fresh current rows, so exactly one ratio set is current at a time.
#[async_trait]
pub trait CategoryMixStore: Send + Sync {
    /// The live ratio set. Empty if none was ever written.
    async fn current_ratios(&self) -> Result<Ratios, QueueError>;

    /// Replace the live ratio set as of `at`.
    async fn set_ratios(&self, ratios: Ratios, at: DateTime<Utc>) -> Result<(), QueueError>;

    /// Every row ever written, oldest first.
    async fn history(&self) -> Result<Vec<CategoryMix>, QueueError>;
}

/// Check that a ratio set can become current.
///
/// # Errors
///
/// [`QueueError::Validation`] if the set is empty, a category name is blank,
/// a ratio is outside `[0, 1]` or not finite, or the sum is off 1.0 by more
/// than [`RATIO_EPSILON`].
pub fn validate_ratios(ratios: &Ratios) -> Result<(), QueueError> {
    if ratios.is_empty() {
        return Err(QueueError::Validation("ratio set is empty".into()));
    }
    for (category, ratio) in ratios {
        if category.trim().is_empty() {
            return Err(QueueError::Validation("category name is blank".into()));
        }
        if !ratio.is_finite() || !(0.0..=1.0).contains(ratio) {
            return Err(QueueError::Validation(format!(
                "ratio for `{category}` must be within [0, 1], got {ratio}"
            )));
        }
    }
    let sum: f64 = ratios.values().sum();
    if (sum - 1.0).abs() > RATIO_EPSILON {
        return Err(QueueError::Validation(format!(
            "ratios must sum to 1.0, got {sum:.4}"
        )));
    }
    Ok(())
}

/// Equal weights over `categories`, used when no mix has been configured.
pub fn uniform_ratios<I, S>(categories: I) -> Ratios
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: Vec<String> = categories.into_iter().map(Into::into).collect();
    if names.is_empty() {
        return Ratios::new();
    }
    #[allow(clippy::cast_precision_loss)]
    let share = 1.0 / names.len() as f64;
    names.into_iter().map(|name| (name, share)).collect()
}

//! Classifies "work item not found" using the history log.
//!
//! A missing work item is usually the second of two legitimate triggers: the
//! first already resolved it. History tells which outcome won.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::model::{HistoryRecord, Outcome, PostMethod};
use crate::core::store::HistoryStore;
use crate::core::QueueError;
use crate::util::ids::WorkItemId;

/// What actually happened to a work item that is no longer pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciledOutcome {
    /// The auto-poster published it.
    PostedViaAutomation,
    /// A human marked it posted.
    PostedManually,
    /// Someone skipped it.
    Skipped,
    /// Someone rejected it.
    Rejected,
    /// An earlier automated attempt failed and closed it.
    PreviousAttemptFailed,
    /// Neither pending nor in history.
    NotFound,
}

impl ReconciledOutcome {
    /// Classify the most recent history record of an item.
    pub const fn from_record(record: &HistoryRecord) -> Self {
        match (record.status, record.method) {
            (Outcome::Posted, PostMethod::Automation) => Self::PostedViaAutomation,
            (Outcome::Posted, PostMethod::Manual) => Self::PostedManually,
            (Outcome::Skipped, _) => Self::Skipped,
            (Outcome::Rejected, _) => Self::Rejected,
            (Outcome::Failed, _) => Self::PreviousAttemptFailed,
        }
    }

    /// Short human-readable description for chat replies.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::PostedViaAutomation => "already posted via automation",
            Self::PostedManually => "already posted manually",
            Self::Skipped => "already skipped",
            Self::Rejected => "already rejected",
            Self::PreviousAttemptFailed => "previous posting attempt failed",
            Self::NotFound => "not found",
        }
    }
}

impl fmt::Display for ReconciledOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// History-backed reconciliation of missing work items.
#[derive(Clone)]
pub struct RaceReconciler {
    history: Arc<dyn HistoryStore>,
}

impl RaceReconciler {
    /// Reconcile against `history`.
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self { history }
    }

    /// Explain why `id` is no longer pending.
    ///
    /// # Errors
    ///
    /// Propagates history lookup failures.
    pub async fn reconcile(&self, id: WorkItemId) -> Result<ReconciledOutcome, QueueError> {
        match self.history.find_latest_by_work_item(id).await? {
            Some(record) => {
                let outcome = ReconciledOutcome::from_record(&record);
                info!(
                    work_item_id = %id,
                    status = %record.status,
                    method = record.method.as_str(),
                    actor = %record.actor,
                    "work item already resolved"
                );
                Ok(outcome)
            }
            None => {
                warn!(work_item_id = %id, "work item missing from queue and history");
                Ok(ReconciledOutcome::NotFound)
            }
        }
    }
}

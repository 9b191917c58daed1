//! API-facing request/response models for chat transports.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{ErrorKind, Outcome, PostingQueue, ReconciledOutcome, Resolution};
use crate::util::ids::WorkItemId;

/// A button press.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Target item.
    pub work_item_id: WorkItemId,
    /// Requested outcome.
    pub outcome: Outcome,
    /// Chat username.
    pub actor: String,
    /// Wait this long for an in-flight automated run to step aside.
    /// Absent means report busy immediately.
    #[serde(default)]
    pub preempt_ms: Option<u64>,
}

/// What happened to a button press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    /// This press resolved the item.
    Completed {
        /// Applied outcome.
        outcome: Outcome,
    },
    /// Someone else is working on it.
    Busy,
    /// Already resolved earlier.
    Reconciled {
        /// What happened earlier.
        outcome: ReconciledOutcome,
        /// Human-readable summary.
        message: String,
    },
    /// Failed.
    Error {
        /// Error class.
        kind: ErrorKind,
        /// Error text.
        message: String,
    },
}

/// Response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Target item.
    pub work_item_id: WorkItemId,
    /// Result.
    #[serde(flatten)]
    pub result: ActionResult,
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag.
    pub ok: bool,
}

/// Run a button press through the queue. Errors are folded into the
/// response.
pub async fn handle_action(queue: &PostingQueue, req: ActionRequest) -> ActionResponse {
    let id = req.work_item_id;
    let resolved = match req.preempt_ms {
        Some(ms) => {
            queue
                .resolve_preempting(id, req.outcome, &req.actor, Duration::from_millis(ms))
                .await
        }
        None => queue.resolve(id, req.outcome, &req.actor).await,
    };
    let result = match resolved {
        Ok(Resolution::Completed(outcome)) => ActionResult::Completed { outcome },
        Ok(Resolution::Busy) => ActionResult::Busy,
        Ok(Resolution::Reconciled(outcome)) => ActionResult::Reconciled {
            outcome,
            message: outcome.describe().to_string(),
        },
        Err(err) => ActionResult::Error {
            kind: err.kind(),
            message: err.to_string(),
        },
    };
    ActionResponse {
        work_item_id: id,
        result,
    }
}

/// Return a health payload.
pub const fn health() -> Health {
    Health { ok: true }
}

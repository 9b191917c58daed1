//! Immediate acknowledgement of a trigger, decoupled from storage latency.

use serde::{Deserialize, Serialize};

use crate::core::model::{Actor, Outcome};
use crate::core::QueueError;
use crate::util::ids::WorkItemId;

/// "Action received" signal pushed to the chat before any mutation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// Item the trigger targets.
    pub work_item_id: WorkItemId,
    /// Requested outcome.
    pub outcome: Outcome,
    /// Who pressed the button.
    pub actor: Actor,
    /// Timestamp in milliseconds since epoch.
    pub created_at_ms: u128,
}

/// Sink for acknowledgements. Must not block: implementations hand the
/// message to their transport and return.
pub trait Notifier: Send + Sync {
    /// Deliver an acknowledgement.
    ///
    /// # Errors
    ///
    /// Any error is logged by the caller and otherwise ignored.
    fn acknowledge(&self, ack: &Acknowledgement) -> Result<(), QueueError>;
}

/// Notifier that drops everything. Used when no chat transport is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn acknowledge(&self, _ack: &Acknowledgement) -> Result<(), QueueError> {
        Ok(())
    }
}

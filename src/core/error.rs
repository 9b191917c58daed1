//! Error types for posting-queue operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::ids::WorkItemId;

/// Errors produced by the scheduler, coordinator, and completion engine.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// Storage failed in a way that may succeed on a second attempt
    /// (dropped connection, reclaimed session, serialization conflict).
    #[error("transient store error: {0}")]
    TransientStore(String),
    /// Storage failed permanently.
    #[error("store error: {0}")]
    Store(String),
    /// A category has no eligible catalog items left for a slot.
    #[error("insufficient inventory for category `{category}`")]
    InsufficientInventory {
        /// Category that ran dry.
        category: String,
    },
    /// Another operation currently holds the work item.
    #[error("work item {0} is busy")]
    Busy(WorkItemId),
    /// Malformed input, rejected before any lock is taken.
    #[error("validation error: {0}")]
    Validation(String),
    /// The session pool stayed exhausted for the whole bounded wait.
    #[error("session pool exhausted after waiting {waited_ms} ms")]
    PoolTimeout {
        /// How long the caller waited before giving up.
        waited_ms: u64,
    },
    /// The external publisher rejected or failed a call.
    #[error("publisher error: {0}")]
    Publisher(String),
}

/// Fieldless classification of [`QueueError`] for transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`QueueError::TransientStore`].
    TransientStore,
    /// See [`QueueError::Store`].
    Store,
    /// See [`QueueError::InsufficientInventory`].
    InsufficientInventory,
    /// See [`QueueError::Busy`].
    Busy,
    /// See [`QueueError::Validation`].
    Validation,
    /// See [`QueueError::PoolTimeout`].
    PoolTimeout,
    /// See [`QueueError::Publisher`].
    Publisher,
}

impl QueueError {
    /// Classification without payload.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TransientStore(_) => ErrorKind::TransientStore,
            Self::Store(_) => ErrorKind::Store,
            Self::InsufficientInventory { .. } => ErrorKind::InsufficientInventory,
            Self::Busy(_) => ErrorKind::Busy,
            Self::Validation(_) => ErrorKind::Validation,
            Self::PoolTimeout { .. } => ErrorKind::PoolTimeout,
            Self::Publisher(_) => ErrorKind::Publisher,
        }
    }

    /// Whether the completion engine may spend its retry budget on this error.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

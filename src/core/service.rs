//! Entry point for transports: one call per button press.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::coordinator::{OperationCoordinator, OperationGuard};
use crate::core::engine::{CompletionEngine, EngineStats, Resolution};
use crate::core::model::{Actor, CompletionRequest, Outcome};
use crate::core::QueueError;
use crate::util::ids::WorkItemId;

/// Coordinator and completion engine behind one handle.
#[derive(Clone)]
pub struct PostingQueue {
    coordinator: Arc<OperationCoordinator>,
    engine: Arc<CompletionEngine>,
}

impl PostingQueue {
    /// Bundle a coordinator and engine.
    pub fn new(coordinator: Arc<OperationCoordinator>, engine: Arc<CompletionEngine>) -> Self {
        Self {
            coordinator,
            engine,
        }
    }

    /// Shared coordinator, for auto-posters and schedulers.
    pub fn coordinator(&self) -> &Arc<OperationCoordinator> {
        &self.coordinator
    }

    /// Shared engine.
    pub fn engine(&self) -> &Arc<CompletionEngine> {
        &self.engine
    }

    /// Engine counters.
    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }

    /// Resolve `id` on behalf of a human.
    ///
    /// Signals any in-flight automated run to stop, then tries the lock
    /// without waiting. Contention yields [`Resolution::Busy`].
    ///
    /// # Errors
    ///
    /// [`QueueError::Validation`] for a bad actor or a manual
    /// [`Outcome::Failed`], before anything is locked. Store errors from the
    /// engine propagate.
    pub async fn resolve(
        &self,
        id: WorkItemId,
        outcome: Outcome,
        actor: &str,
    ) -> Result<Resolution, QueueError> {
        let request = CompletionRequest::manual(id, outcome, Actor::new(actor)?)?;
        self.coordinator.cancel(id);
        match self.coordinator.try_acquire(id) {
            Ok(guard) => self.complete(guard, &request).await,
            Err(QueueError::Busy(_)) => {
                debug!(work_item_id = %id, actor, "resolve rejected: busy");
                Ok(Resolution::Busy)
            }
            Err(err) => Err(err),
        }
    }

    /// Like [`PostingQueue::resolve`], but waits up to `wait` for an
    /// in-flight holder to reach its checkpoint and step aside.
    ///
    /// # Errors
    ///
    /// As [`PostingQueue::resolve`].
    pub async fn resolve_preempting(
        &self,
        id: WorkItemId,
        outcome: Outcome,
        actor: &str,
        wait: Duration,
    ) -> Result<Resolution, QueueError> {
        let request = CompletionRequest::manual(id, outcome, Actor::new(actor)?)?;
        self.coordinator.cancel(id);
        match self.coordinator.acquire_within(id, wait).await {
            Ok(guard) => self.complete(guard, &request).await,
            Err(QueueError::Busy(_)) => Ok(Resolution::Busy),
            Err(err) => Err(err),
        }
    }

    async fn complete(
        &self,
        guard: OperationGuard,
        request: &CompletionRequest,
    ) -> Result<Resolution, QueueError> {
        let result = self.engine.complete(&guard, request).await;
        self.coordinator.release(guard);
        result
    }
}

//! Automated posting pipeline with cooperative cancellation.
//!
//! `upload → checkpoint → remote call → checkpoint → finalize`
//!
//! Checkpoints consume the item's cancellation flag. A network call that is
//! already in flight is never interrupted; cancellation only suppresses the
//! next side effect.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::coordinator::{CancelSignal, Checkpoint, OperationCoordinator, OperationGuard};
use crate::core::engine::{CompletionEngine, Resolution};
use crate::core::model::{Actor, CompletionRequest, Outcome, PostMethod, WorkItem};
use crate::core::reconciler::ReconciledOutcome;
use crate::core::QueueError;
use crate::util::ids::WorkItemId;

/// Opaque reference to media uploaded but not yet published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadHandle(pub String);

/// Identifier the social network assigned to a published post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePostId(pub String);

impl fmt::Display for RemotePostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client of the social network.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Upload the item's media.
    async fn upload(&self, item: &WorkItem) -> Result<UploadHandle, QueueError>;
    /// Publish previously uploaded media.
    async fn publish(
        &self,
        item: &WorkItem,
        upload: &UploadHandle,
    ) -> Result<RemotePostId, QueueError>;
    /// Delete an upload that will never be published.
    async fn discard(&self, upload: &UploadHandle) -> Result<(), QueueError>;
}

/// Pipeline stage after which a cancellation was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Media uploaded.
    Upload,
    /// Remote call issued.
    RemoteCall,
}

/// Result of one automated run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AutoPostOutcome {
    /// Published and recorded as posted.
    Posted {
        /// Remote identifier.
        remote_id: RemotePostId,
    },
    /// The publisher failed; the item was recorded as failed.
    Failed {
        /// Publisher error.
        reason: String,
    },
    /// A cancellation stopped the run with no state change.
    Cancelled {
        /// Last stage that ran.
        after: Stage,
    },
    /// Cancelled after the post went live. Nothing was recorded; whoever
    /// cancelled owns the outcome.
    CancelledAfterPublish {
        /// Remote identifier of the orphaned post.
        remote_id: RemotePostId,
    },
    /// Another operation holds the item.
    Busy,
    /// The item was already resolved.
    Reconciled(ReconciledOutcome),
}

/// Drives a [`Publisher`] for one work item at a time.
pub struct AutoPoster<P> {
    coordinator: Arc<OperationCoordinator>,
    engine: Arc<CompletionEngine>,
    publisher: P,
}

impl<P: Publisher> AutoPoster<P> {
    /// Create an auto-poster over shared coordinator and engine.
    pub fn new(
        coordinator: Arc<OperationCoordinator>,
        engine: Arc<CompletionEngine>,
        publisher: P,
    ) -> Self {
        Self {
            coordinator,
            engine,
            publisher,
        }
    }

    /// Run the pipeline for `id`.
    ///
    /// # Errors
    ///
    /// Store errors from fetching or finalizing. Publisher errors are not
    /// returned; they become [`AutoPostOutcome::Failed`].
    pub async fn run(&self, id: WorkItemId) -> Result<AutoPostOutcome, QueueError> {
        let guard = match self.coordinator.try_acquire(id) {
            Ok(guard) => guard,
            Err(QueueError::Busy(_)) => return Ok(AutoPostOutcome::Busy),
            Err(err) => return Err(err),
        };
        let outcome = self.run_guarded(&guard).await;
        self.coordinator.release(guard);
        outcome
    }

    async fn run_guarded(&self, guard: &OperationGuard) -> Result<AutoPostOutcome, QueueError> {
        let id = guard.work_item_id();
        let signal = guard.cancellation();

        let Some(item) = self.engine.fetch(id).await? else {
            let outcome = self.engine.reconcile(id).await?;
            return Ok(AutoPostOutcome::Reconciled(outcome));
        };

        debug!(work_item_id = %id, "uploading");
        let upload = match self.publisher.upload(&item).await {
            Ok(upload) => upload,
            Err(err) => return self.fail(guard, &signal, Stage::Upload, err).await,
        };

        if signal.checkpoint() == Checkpoint::Cancelled {
            info!(work_item_id = %id, "cancelled after upload");
            self.discard(id, &upload).await;
            return Ok(AutoPostOutcome::Cancelled {
                after: Stage::Upload,
            });
        }

        debug!(work_item_id = %id, "publishing");
        let remote_id = match self.publisher.publish(&item, &upload).await {
            Ok(remote_id) => remote_id,
            Err(err) => {
                self.discard(id, &upload).await;
                return self.fail(guard, &signal, Stage::RemoteCall, err).await;
            }
        };

        if signal.checkpoint() == Checkpoint::Cancelled {
            warn!(
                work_item_id = %id,
                remote_id = %remote_id,
                "cancelled after publish; remote post exists but is not recorded"
            );
            return Ok(AutoPostOutcome::CancelledAfterPublish { remote_id });
        }

        let request = CompletionRequest::new(
            id,
            Outcome::Posted,
            PostMethod::Automation,
            Actor::automation(),
        )?;
        Ok(match self.engine.complete(guard, &request).await? {
            Resolution::Completed(_) => AutoPostOutcome::Posted { remote_id },
            Resolution::Reconciled(outcome) => AutoPostOutcome::Reconciled(outcome),
            Resolution::Busy => AutoPostOutcome::Busy,
        })
    }

    /// Record a publisher failure, unless someone cancelled in the meantime.
    async fn fail(
        &self,
        guard: &OperationGuard,
        signal: &CancelSignal,
        stage: Stage,
        err: QueueError,
    ) -> Result<AutoPostOutcome, QueueError> {
        let id = guard.work_item_id();
        if signal.checkpoint() == Checkpoint::Cancelled {
            info!(work_item_id = %id, error = %err, "publisher failed after cancellation");
            return Ok(AutoPostOutcome::Cancelled { after: stage });
        }
        warn!(work_item_id = %id, ?stage, error = %err, "publisher failed");
        let request = CompletionRequest::new(
            id,
            Outcome::Failed,
            PostMethod::Automation,
            Actor::automation(),
        )?;
        Ok(match self.engine.complete(guard, &request).await? {
            Resolution::Completed(_) => AutoPostOutcome::Failed {
                reason: err.to_string(),
            },
            Resolution::Reconciled(outcome) => AutoPostOutcome::Reconciled(outcome),
            Resolution::Busy => AutoPostOutcome::Busy,
        })
    }

    async fn discard(&self, id: WorkItemId, upload: &UploadHandle) {
        if let Err(err) = self.publisher.discard(upload).await {
            warn!(work_item_id = %id, error = %err, "failed to discard upload");
        }
    }
}

//! Terminal state transitions for work items.
//!
//! `Pending → {Posted, Skipped, Rejected, Failed}`; every target is absorbing.
//! A transition runs under the item's [`OperationGuard`] and:
//!
//! 1. pushes an immediate acknowledgement (best-effort)
//! 2. re-fetches the item; a miss is reconciled from history, not an error
//! 3. applies the mutation set in one session: history record, post counter
//!    and cooldown lock for `Posted`, then deletion of the work item
//! 4. on a transient store error, invalidates stale sessions, re-fetches, and
//!    retries the whole set once on the re-fetched item
//! 5. emits an audit event on the side channel (best-effort)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::audit::{build_audit_event, AuditChannel};
use crate::core::coordinator::OperationGuard;
use crate::core::model::{CompletionRequest, Outcome, WorkItem};
use crate::core::notify::{Acknowledgement, Notifier};
use crate::core::reconciler::{RaceReconciler, ReconciledOutcome};
use crate::core::retry::{with_bounded_retry, Attempt, Recovery, Retried, RETRY_BUDGET};
use crate::core::store::{HistoryStore, MediaCatalog, QueueStore};
use crate::core::QueueError;
use crate::infra::pool::SessionPool;
use crate::util::clock::{now_ms, Clock};
use crate::util::ids::WorkItemId;

/// What a trigger achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// This trigger moved the item into the given terminal state.
    Completed(Outcome),
    /// Another operation holds the item; nothing was done.
    Busy,
    /// The item was already gone; history says what happened to it.
    Reconciled(ReconciledOutcome),
}

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Transitions applied by this engine.
    pub completed: u64,
    /// Triggers answered from history.
    pub reconciled: u64,
    /// Retries started after a transient failure.
    pub retries: u64,
    /// Retries that failed as well.
    pub retry_failures: u64,
    /// Retries started after a history record had already been written.
    pub duplicate_history_risk: u64,
}

#[derive(Default)]
struct EngineCounters {
    completed: AtomicU64,
    reconciled: AtomicU64,
    retries: AtomicU64,
    retry_failures: AtomicU64,
    duplicate_history_risk: AtomicU64,
}

/// Applies terminal transitions with bounded retry and race reconciliation.
pub struct CompletionEngine {
    queue: Arc<dyn QueueStore>,
    history: Arc<dyn HistoryStore>,
    catalog: Arc<dyn MediaCatalog>,
    reconciler: RaceReconciler,
    pool: Arc<SessionPool>,
    notifier: Arc<dyn Notifier>,
    audit: Option<AuditChannel>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    counters: EngineCounters,
}

impl CompletionEngine {
    /// Create an engine over the given collaborators. `cooldown` is the
    /// length of the lock placed on media after a successful post.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn QueueStore>,
        history: Arc<dyn HistoryStore>,
        catalog: Arc<dyn MediaCatalog>,
        pool: Arc<SessionPool>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        cooldown: Duration,
    ) -> Self {
        Self {
            reconciler: RaceReconciler::new(Arc::clone(&history)),
            queue,
            history,
            catalog,
            pool,
            notifier,
            audit: None,
            clock,
            cooldown,
            counters: EngineCounters::default(),
        }
    }

    /// Attach the audit side channel.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditChannel) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Fetch a pending item.
    ///
    /// # Errors
    ///
    /// Propagates queue store failures.
    pub async fn fetch(&self, id: WorkItemId) -> Result<Option<WorkItem>, QueueError> {
        self.queue.get_by_id(id).await
    }

    /// Explain a missing item from history and count it.
    ///
    /// # Errors
    ///
    /// Propagates history lookup failures.
    pub async fn reconcile(&self, id: WorkItemId) -> Result<ReconciledOutcome, QueueError> {
        let outcome = self.reconciler.reconcile(id).await?;
        self.counters.reconciled.fetch_add(1, Ordering::Relaxed);
        Ok(outcome)
    }

    /// Move the guarded item into `request.outcome`.
    ///
    /// Returns [`Resolution::Completed`] when this call applied the
    /// transition and [`Resolution::Reconciled`] when the item was already
    /// gone. Never returns [`Resolution::Busy`]; admission is the
    /// coordinator's job.
    ///
    /// # Errors
    ///
    /// [`QueueError::Validation`] if the guard covers another item. Store
    /// errors that are not transient, or that persist through the retry,
    /// propagate.
    pub async fn complete(
        &self,
        guard: &OperationGuard,
        request: &CompletionRequest,
    ) -> Result<Resolution, QueueError> {
        let id = request.work_item_id;
        if guard.work_item_id() != id {
            return Err(QueueError::Validation(format!(
                "guard for {} cannot complete {id}",
                guard.work_item_id()
            )));
        }

        self.acknowledge(request);

        let Some(item) = self.queue.get_by_id(id).await? else {
            let outcome = self.reconcile(id).await?;
            self.audit(request, "reconciled", Some(outcome.describe().to_string()));
            return Ok(Resolution::Reconciled(outcome));
        };

        let result = with_bounded_retry(
            RETRY_BUDGET,
            item,
            move |item, attempt| self.apply(item, request, attempt),
            move |err, attempt| self.prepare_retry(id, err, attempt),
        )
        .await;

        match result {
            Ok(Retried::Done(())) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                info!(
                    work_item_id = %id,
                    outcome = %request.outcome,
                    method = request.method.as_str(),
                    actor = %request.actor,
                    "work item resolved"
                );
                self.audit(request, "completed", Some(request.outcome.to_string()));
                Ok(Resolution::Completed(request.outcome))
            }
            Ok(Retried::Resolved(resolution)) => Ok(resolution),
            Err(err) => {
                if err.is_transient() {
                    self.counters.retry_failures.fetch_add(1, Ordering::Relaxed);
                    error!(work_item_id = %id, error = %err, "transition failed after retry");
                } else {
                    error!(work_item_id = %id, error = %err, "transition failed");
                }
                self.audit(request, "failed", Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            reconciled: self.counters.reconciled.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            retry_failures: self.counters.retry_failures.load(Ordering::Relaxed),
            duplicate_history_risk: self.counters.duplicate_history_risk.load(Ordering::Relaxed),
        }
    }

    async fn apply(&self, item: WorkItem, request: &CompletionRequest, attempt: u32) -> Attempt<()> {
        debug!(work_item_id = %item.id, attempt, "applying mutation set");
        Attempt::from(self.apply_mutations(&item, request).await)
    }

    async fn apply_mutations(
        &self,
        item: &WorkItem,
        request: &CompletionRequest,
    ) -> Result<(), QueueError> {
        let mut session = self.pool.acquire("completion").await?;
        session.begin()?;
        let now = self.clock.now();

        self.history.append(request.to_history(item, now)).await?;
        session.touch()?;

        if request.outcome == Outcome::Posted {
            let media = item.media_ref.id;
            if !self.catalog.record_post(media, item.id, now).await? {
                debug!(work_item_id = %item.id, media_id = media.0, "post already counted");
            }
            self.catalog.add_cooldown(media, now + self.cooldown).await?;
            session.touch()?;
        }

        if !self.queue.delete(item.id).await? {
            debug!(work_item_id = %item.id, "work item already deleted");
        }
        session.commit()
    }

    async fn prepare_retry(
        &self,
        id: WorkItemId,
        err: QueueError,
        attempt: u32,
    ) -> Result<Recovery<WorkItem, Resolution>, QueueError> {
        self.counters.retries.fetch_add(1, Ordering::Relaxed);
        warn!(work_item_id = %id, attempt, error = %err, "transient store error; retrying");
        self.pool.invalidate();

        let Some(fresh) = self.queue.get_by_id(id).await? else {
            let outcome = self.reconcile(id).await?;
            return Ok(Recovery::Resolved(Resolution::Reconciled(outcome)));
        };

        if !self.history.find_by_work_item(id).await?.is_empty() {
            self.counters
                .duplicate_history_risk
                .fetch_add(1, Ordering::Relaxed);
            warn!(work_item_id = %id, "history already written; retry may duplicate it");
        }
        Ok(Recovery::Retry(fresh))
    }

    fn acknowledge(&self, request: &CompletionRequest) {
        let ack = Acknowledgement {
            work_item_id: request.work_item_id,
            outcome: request.outcome,
            actor: request.actor.clone(),
            created_at_ms: now_ms(),
        };
        if let Err(err) = self.notifier.acknowledge(&ack) {
            warn!(work_item_id = %request.work_item_id, error = %err, "acknowledgement failed");
        }
    }

    fn audit(&self, request: &CompletionRequest, action: &str, payload: Option<String>) {
        if let Some(audit) = &self.audit {
            audit.emit(build_audit_event(
                request.work_item_id.to_string(),
                action,
                request.actor.as_str(),
                payload,
            ));
        }
    }
}

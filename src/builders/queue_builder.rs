//! Assembles a posting queue from configuration and collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::{
    AppResult, AuditChannel, AuditSink, AuditWriterHandle, CategoryMixStore, CompletionEngine,
    HistoryStore, MediaCatalog, Notifier, OperationCoordinator, PostingQueue, QueueStore,
    Scheduler,
};
use crate::infra::{
    HygieneHandle, InMemoryCatalog, InMemoryCategoryMixStore, InMemoryHistoryStore,
    InMemoryNotifier, InMemoryQueueStore, SessionPool,
};
use crate::runtime::Spawn;
use crate::util::clock::Clock;

/// External collaborators the engine calls through.
#[derive(Clone)]
pub struct Collaborators {
    /// Pending work items.
    pub queue: Arc<dyn QueueStore>,
    /// Append-only history.
    pub history: Arc<dyn HistoryStore>,
    /// Media inventory.
    pub catalog: Arc<dyn MediaCatalog>,
    /// Category ratios.
    pub mix: Arc<dyn CategoryMixStore>,
    /// Acknowledgement transport.
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Fresh in-memory collaborators.
    pub fn in_memory() -> Self {
        Self {
            queue: Arc::new(InMemoryQueueStore::new()),
            history: Arc::new(InMemoryHistoryStore::new()),
            catalog: Arc::new(InMemoryCatalog::new()),
            mix: Arc::new(InMemoryCategoryMixStore::new()),
            notifier: Arc::new(InMemoryNotifier::new()),
        }
    }
}

/// Everything [`build_posting_queue`] started.
pub struct BuiltQueue {
    /// Transport entry point.
    pub service: PostingQueue,
    /// Daily scheduler sharing the service's coordinator.
    pub scheduler: Scheduler,
    /// Session pool.
    pub pool: Arc<SessionPool>,
    /// Stops the session hygiene task.
    pub hygiene: HygieneHandle,
    /// Audit writer, if an audit sink was given.
    pub audit_writer: Option<AuditWriterHandle>,
    purge_stop: Arc<AtomicBool>,
}

impl BuiltQueue {
    /// Stop background tasks and wait for the audit writer to drain.
    ///
    /// Blocks the calling thread until every other clone of the engine is
    /// dropped, since the writer runs until the last audit sender is gone.
    /// Call it outside async context; from a Tokio task use
    /// [`BuiltQueue::shutdown_async`].
    pub fn shutdown(self) {
        self.hygiene.stop();
        self.purge_stop.store(true, Ordering::Release);
        let Self {
            service,
            scheduler,
            audit_writer,
            ..
        } = self;
        drop(service);
        drop(scheduler);
        if let Some(writer) = audit_writer {
            writer.join();
        }
        info!("posting queue shut down");
    }

    /// [`BuiltQueue::shutdown`] on Tokio's blocking pool, so the writer join
    /// never stalls a runtime worker.
    ///
    /// # Errors
    ///
    /// The blocking task panicked or was cancelled.
    pub async fn shutdown_async(self) -> AppResult<()> {
        tokio::task::spawn_blocking(move || self.shutdown())
            .await
            .context("joining posting queue shutdown")
    }
}

/// Build the coordinator, engine, scheduler, and session pool, and start the
/// pool hygiene, coordinator flag purge, and (optionally) audit writer.
///
/// # Errors
///
/// Invalid configuration, or a writer thread that cannot be started.
pub fn build_posting_queue<S: Spawn>(
    cfg: &EngineConfig,
    collaborators: Collaborators,
    audit_sink: Option<Box<dyn AuditSink>>,
    clock: Arc<dyn Clock>,
    spawner: &S,
) -> AppResult<BuiltQueue> {
    cfg.validate().map_err(|e| anyhow!("config invalid: {e}"))?;

    let pool = Arc::new(SessionPool::new(cfg.pool.to_limits()));
    let hygiene = pool.spawn_hygiene(spawner, cfg.pool.hygiene_interval());

    let coordinator = Arc::new(OperationCoordinator::new(cfg.cancel_flag_ttl()));
    let purge_stop = spawn_flag_purge(spawner, &coordinator, cfg.cancel_flag_ttl());

    let mut engine = CompletionEngine::new(
        Arc::clone(&collaborators.queue),
        Arc::clone(&collaborators.history),
        Arc::clone(&collaborators.catalog),
        Arc::clone(&pool),
        Arc::clone(&collaborators.notifier),
        Arc::clone(&clock),
        cfg.cooldown(),
    );
    let audit_writer = match audit_sink {
        Some(sink) => {
            let (channel, writer) = AuditChannel::spawn(sink, &pool, cfg.audit_channel_capacity)
                .context("starting audit writer")?;
            engine = engine.with_audit(channel);
            Some(writer)
        }
        None => None,
    };

    let scheduler = Scheduler::new(
        collaborators.mix,
        collaborators.catalog,
        collaborators.queue,
        Arc::clone(&coordinator),
        clock,
        cfg.window,
        cfg.slots_per_day,
    )
    .with_default_chat(cfg.default_chat);

    info!(
        slots_per_day = cfg.slots_per_day,
        max_sessions = cfg.pool.max_sessions,
        audit = audit_writer.is_some(),
        "posting queue built"
    );

    Ok(BuiltQueue {
        service: PostingQueue::new(coordinator, Arc::new(engine)),
        scheduler,
        pool,
        hygiene,
        audit_writer,
        purge_stop,
    })
}

fn spawn_flag_purge<S: Spawn>(
    spawner: &S,
    coordinator: &Arc<OperationCoordinator>,
    interval: std::time::Duration,
) -> Arc<AtomicBool> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let coordinator = Arc::downgrade(coordinator);
    spawner.spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if stop_flag.load(Ordering::Acquire) {
                break;
            }
            let Some(coordinator) = coordinator.upgrade() else { break };
            let purged = coordinator.purge_stale_flags();
            if purged > 0 {
                debug!(purged, "stale cancellation flags purged");
            }
        }
    });
    stop
}

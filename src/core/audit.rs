//! Best-effort audit side channel.
//!
//! Terminal transitions emit an [`AuditEvent`] onto a bounded channel. A
//! dedicated writer thread drains it into an [`AuditSink`] through a
//! long-lived session registered with the [`SessionPool`], so the pool's
//! hygiene sweep can see and reclaim it. Emitting never blocks and never
//! fails the caller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::QueueError;
use crate::infra::pool::{Session, SessionPool};
use crate::util::clock::now_ms;

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related work item.
    pub work_item_id: String,
    /// Action taken (completed, reconciled, retry, cancelled, failed).
    pub action: String,
    /// Who triggered the action.
    pub actor: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    ///
    /// # Errors
    ///
    /// Implementations report storage failures; the writer logs and moves on.
    fn record(&mut self, event: AuditEvent) -> Result<(), QueueError>;
}

/// In-memory audit sink for testing and dev. Clones share one buffer.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) -> Result<(), QueueError> {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    work_item_id: impl Into<String>,
    action: impl Into<String>,
    actor: impl Into<String>,
    payload: Option<String>,
) -> AuditEvent {
    let work_item_id = work_item_id.into();
    let action = action.into();
    let created_at_ms = now_ms();
    AuditEvent {
        event_id: format!("{work_item_id}-{action}-{created_at_ms}"),
        work_item_id,
        action,
        actor: actor.into(),
        created_at_ms,
        payload,
    }
}

/// Sending half of the audit side channel.
#[derive(Clone)]
pub struct AuditChannel {
    tx: Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

/// Label of the writer's long-lived session in the pool registry.
pub const AUDIT_SESSION_LABEL: &str = "audit-log";

impl AuditChannel {
    /// Start the writer thread and return the sending half.
    ///
    /// The writer exits once every [`AuditChannel`] clone is dropped.
    ///
    /// # Errors
    ///
    /// [`QueueError::Store`] if the writer thread cannot be spawned.
    pub fn spawn(
        sink: Box<dyn AuditSink>,
        pool: &SessionPool,
        capacity: usize,
    ) -> Result<(Self, AuditWriterHandle), QueueError> {
        let (tx, rx) = bounded(capacity);
        let session = pool.open_long_lived(AUDIT_SESSION_LABEL);
        let join = thread::Builder::new()
            .name("audit-writer".into())
            .spawn(move || writer_loop(&rx, sink, session))
            .map_err(|e| QueueError::Store(format!("failed to spawn audit writer: {e}")))?;
        Ok((
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            AuditWriterHandle { join: Some(join) },
        ))
    }

    /// Queue an event. Drops it with a warning if the channel is full or the
    /// writer is gone.
    pub fn emit(&self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(work_item_id = %event.work_item_id, action = %event.action, "audit channel full; event dropped");
            }
            Err(TrySendError::Disconnected(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(work_item_id = %event.work_item_id, action = %event.action, "audit writer gone; event dropped");
            }
        }
    }

    /// Events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Join handle of the writer thread.
pub struct AuditWriterHandle {
    join: Option<JoinHandle<()>>,
}

impl AuditWriterHandle {
    /// Wait for the writer to drain and exit. Drop every [`AuditChannel`]
    /// first or this blocks forever.
    pub fn join(mut self) {
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("audit writer panicked");
            }
        }
    }
}

fn writer_loop(rx: &Receiver<AuditEvent>, mut sink: Box<dyn AuditSink>, mut session: Session) {
    debug!(session = session.id(), "audit writer started");
    for event in rx {
        if let Err(err) = write_one(sink.as_mut(), &mut session, event.clone()) {
            if err.is_transient() {
                // reclaimed or stale: reconnect and try once more
                session.reset();
                if let Err(err) = write_one(sink.as_mut(), &mut session, event) {
                    warn!(error = %err, "audit write failed after session reset");
                }
            } else {
                warn!(error = %err, work_item_id = %event.work_item_id, "audit write failed");
            }
        }
    }
    debug!("audit writer stopped");
}

fn write_one(
    sink: &mut dyn AuditSink,
    session: &mut Session,
    event: AuditEvent,
) -> Result<(), QueueError> {
    session.begin()?;
    if let Err(err) = sink.record(event) {
        session.rollback();
        return Err(err);
    }
    session.touch()?;
    session.commit()
}

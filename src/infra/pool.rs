//! Bounded session pool with idle-in-transaction hygiene.
//!
//! Every session the engine talks to storage through is registered here,
//! including long-lived side-channel sessions that never go through the
//! semaphore. The hygiene sweep walks the whole registry, so a side channel
//! stuck in an open transaction is reclaimed like any pooled session.
//!
//! # Design
//!
//! - **Bounded wait**: `acquire` waits at most `acquire_timeout`, then fails
//!   with [`QueueError::PoolTimeout`]
//! - **Generations**: `invalidate` bumps a counter; sessions opened before the
//!   bump refuse to begin new work until their owner refreshes them
//! - **RAII**: dropping a [`Session`] rolls back and unregisters it

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::core::QueueError;
use crate::runtime::Spawn;

/// Capacity and hygiene limits for a [`SessionPool`].
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Maximum concurrently checked-out pooled sessions.
    pub max_sessions: usize,
    /// Longest a caller waits for a free session.
    pub acquire_timeout: Duration,
    /// A session in a transaction with no activity for this long is reclaimed.
    pub idle_in_transaction_timeout: Duration,
}

/// Lifecycle of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, no transaction.
    Idle,
    /// Inside a transaction.
    InTransaction,
    /// Forcibly rolled back by the hygiene sweep.
    Reclaimed,
}

/// Read-only view of a registry entry.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Registry id.
    pub id: u64,
    /// Owner label, e.g. `completion` or `audit-log`.
    pub label: String,
    /// Current state.
    pub state: SessionState,
    /// Whether the session bypasses the semaphore.
    pub long_lived: bool,
}

/// Pool utilisation snapshot.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Configured pooled capacity.
    pub max_sessions: usize,
    /// Pooled sessions currently checked out.
    pub in_use: usize,
    /// All registered sessions, pooled and long-lived.
    pub registered: usize,
    /// Sessions reclaimed by hygiene sweeps since start.
    pub reclaimed_total: u64,
    /// Acquisitions that gave up after the bounded wait.
    pub timeouts_total: u64,
    /// Number of `invalidate` calls.
    pub invalidations_total: u64,
}

#[derive(Debug)]
struct SessionEntry {
    label: String,
    state: SessionState,
    last_activity: Instant,
    long_lived: bool,
}

type Registry = Arc<Mutex<HashMap<u64, SessionEntry>>>;

#[derive(Default)]
struct PoolCounters {
    reclaimed: AtomicU64,
    timeouts: AtomicU64,
    invalidations: AtomicU64,
}

/// Bounded pool of storage sessions.
pub struct SessionPool {
    limits: PoolLimits,
    permits: Arc<Semaphore>,
    registry: Registry,
    next_id: AtomicU64,
    generation: Arc<AtomicU64>,
    counters: PoolCounters,
}

impl SessionPool {
    /// Create a pool.
    pub fn new(limits: PoolLimits) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limits.max_sessions)),
            limits,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            generation: Arc::new(AtomicU64::new(0)),
            counters: PoolCounters::default(),
        }
    }

    /// Configured limits.
    pub const fn limits(&self) -> &PoolLimits {
        &self.limits
    }

    /// Check out a pooled session, waiting at most `acquire_timeout`.
    ///
    /// # Errors
    ///
    /// [`QueueError::PoolTimeout`] if no session frees up in time.
    pub async fn acquire(&self, label: &str) -> Result<Session, QueueError> {
        let started = Instant::now();
        let permit = tokio::time::timeout(
            self.limits.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        )
        .await;

        let permit = match permit {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => {
                return Err(QueueError::Store("session pool is closed".into()));
            }
            Err(_elapsed) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                warn!(label, waited_ms, "session pool exhausted");
                return Err(QueueError::PoolTimeout { waited_ms });
            }
        };

        Ok(self.register(label, Some(permit)))
    }

    /// Open a session outside the semaphore for a long-running side channel.
    /// It is still visible to [`SessionPool::sweep`].
    pub fn open_long_lived(&self, label: &str) -> Session {
        self.register(label, None)
    }

    fn register(&self, label: &str, permit: Option<OwnedSemaphorePermit>) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let long_lived = permit.is_none();
        self.registry.lock().insert(
            id,
            SessionEntry {
                label: label.to_string(),
                state: SessionState::Idle,
                last_activity: Instant::now(),
                long_lived,
            },
        );
        debug!(session = id, label, long_lived, "session opened");
        Session {
            id,
            registry: Arc::clone(&self.registry),
            generation: Arc::clone(&self.generation),
            born_generation: self.generation.load(Ordering::Acquire),
            _permit: permit,
        }
    }

    /// Mark every open session stale. Stale sessions refuse to begin new
    /// transactions until refreshed.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        debug!(generation, "session pool invalidated");
    }

    /// Reclaim sessions idle in a transaction for longer than the threshold.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`SessionPool::sweep`] evaluated at a given instant.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let threshold = self.limits.idle_in_transaction_timeout;
        let mut reclaimed = 0;
        let mut registry = self.registry.lock();
        for (id, entry) in registry.iter_mut() {
            if entry.state == SessionState::InTransaction
                && now.saturating_duration_since(entry.last_activity) >= threshold
            {
                entry.state = SessionState::Reclaimed;
                reclaimed += 1;
                warn!(
                    session = *id,
                    label = %entry.label,
                    long_lived = entry.long_lived,
                    "reclaimed idle-in-transaction session"
                );
            }
        }
        drop(registry);
        if reclaimed > 0 {
            self.counters
                .reclaimed
                .fetch_add(reclaimed as u64, Ordering::Relaxed);
        }
        reclaimed
    }

    /// Every registered session.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let registry = self.registry.lock();
        let mut out: Vec<SessionInfo> = registry
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                label: entry.label.clone(),
                state: entry.state,
                long_lived: entry.long_lived,
            })
            .collect();
        out.sort_by_key(|info| info.id);
        out
    }

    /// Utilisation snapshot.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max_sessions: self.limits.max_sessions,
            in_use: self
                .limits
                .max_sessions
                .saturating_sub(self.permits.available_permits()),
            registered: self.registry.lock().len(),
            reclaimed_total: self.counters.reclaimed.load(Ordering::Relaxed),
            timeouts_total: self.counters.timeouts.load(Ordering::Relaxed),
            invalidations_total: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Run [`SessionPool::sweep`] every `interval` on `spawner` until the
    /// returned handle is stopped or the pool is dropped.
    pub fn spawn_hygiene<S: Spawn>(self: &Arc<Self>, spawner: &S, interval: Duration) -> HygieneHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let pool: Weak<Self> = Arc::downgrade(self);
        let stop_flag = Arc::clone(&stop);
        spawner.spawn(async move {
            info!(interval_ms = interval.as_millis(), "session hygiene started");
            loop {
                tokio::time::sleep(interval).await;
                if stop_flag.load(Ordering::Acquire) {
                    break;
                }
                let Some(pool) = pool.upgrade() else { break };
                let reclaimed = pool.sweep();
                if reclaimed > 0 {
                    info!(reclaimed, "session hygiene sweep");
                }
            }
            debug!("session hygiene stopped");
        });
        HygieneHandle { stop }
    }
}

/// Stops the periodic hygiene task.
#[derive(Debug, Clone)]
pub struct HygieneHandle {
    stop: Arc<AtomicBool>,
}

impl HygieneHandle {
    /// Ask the task to exit after its current sleep.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// A registered storage session. Dropping it rolls back any open
/// transaction and returns the slot to the pool.
#[derive(Debug)]
pub struct Session {
    id: u64,
    registry: Registry,
    generation: Arc<AtomicU64>,
    born_generation: u64,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Session {
    /// Registry id.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.registry
            .lock()
            .get(&self.id)
            .map_or(SessionState::Reclaimed, |entry| entry.state)
    }

    /// Whether [`SessionPool::invalidate`] ran after this session opened.
    pub fn is_stale(&self) -> bool {
        self.born_generation < self.generation.load(Ordering::Acquire)
    }

    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// [`QueueError::TransientStore`] if the session is stale or was reclaimed.
    pub fn begin(&mut self) -> Result<(), QueueError> {
        if self.is_stale() {
            return Err(QueueError::TransientStore(format!(
                "session {} is stale",
                self.id
            )));
        }
        self.transition(SessionState::Idle, SessionState::InTransaction)
    }

    /// Record statement activity inside the open transaction.
    ///
    /// # Errors
    ///
    /// [`QueueError::TransientStore`] if the transaction was reclaimed.
    pub fn touch(&self) -> Result<(), QueueError> {
        let mut registry = self.registry.lock();
        match registry.get_mut(&self.id) {
            Some(entry) if entry.state == SessionState::InTransaction => {
                entry.last_activity = Instant::now();
                Ok(())
            }
            _ => Err(self.reclaimed_error()),
        }
    }

    /// Close the open transaction.
    ///
    /// # Errors
    ///
    /// [`QueueError::TransientStore`] if the transaction was reclaimed before
    /// it could commit.
    pub fn commit(&mut self) -> Result<(), QueueError> {
        self.transition(SessionState::InTransaction, SessionState::Idle)
    }

    /// Abandon the open transaction, if any.
    pub fn rollback(&mut self) {
        if let Some(entry) = self.registry.lock().get_mut(&self.id) {
            if entry.state == SessionState::InTransaction {
                entry.state = SessionState::Idle;
            }
        }
    }

    /// Reconnect: clear a reclaimed or stale state so the owner can continue.
    pub fn reset(&mut self) {
        self.born_generation = self.generation.load(Ordering::Acquire);
        if let Some(entry) = self.registry.lock().get_mut(&self.id) {
            entry.state = SessionState::Idle;
            entry.last_activity = Instant::now();
        }
        debug!(session = self.id, "session reset");
    }

    fn transition(&self, from: SessionState, to: SessionState) -> Result<(), QueueError> {
        let mut registry = self.registry.lock();
        match registry.get_mut(&self.id) {
            Some(entry) if entry.state == from => {
                entry.state = to;
                entry.last_activity = Instant::now();
                Ok(())
            }
            Some(entry) if entry.state == SessionState::Reclaimed => {
                // the rollback already happened server side
                entry.state = SessionState::Idle;
                Err(self.reclaimed_error())
            }
            Some(entry) => Err(QueueError::Store(format!(
                "session {} is {:?}, expected {:?}",
                self.id, entry.state, from
            ))),
            None => Err(self.reclaimed_error()),
        }
    }

    fn reclaimed_error(&self) -> QueueError {
        QueueError::TransientStore(format!("session {} was reclaimed", self.id))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(entry) = self.registry.lock().remove(&self.id) {
            if entry.state == SessionState::InTransaction {
                debug!(session = self.id, label = %entry.label, "rolled back on drop");
            }
        }
    }
}

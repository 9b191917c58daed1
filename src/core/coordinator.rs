//! Per-work-item mutual exclusion and cooperative cancellation.
//!
//! One map keyed by [`WorkItemId`] holds an entry per item that is currently
//! being operated on (or has a pending cancellation request). Entries are
//! inserted on first use and removed when the last holder or waiter lets go,
//! so memory is bounded by the number of concurrently active items.
//!
//! Locks are Tokio mutexes so holders may await storage I/O. Interactive
//! triggers use [`OperationCoordinator::try_acquire`], which never waits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::core::QueueError;
use crate::util::ids::WorkItemId;

/// Result of a cancellation checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// No cancellation requested; proceed to the next stage.
    Continue,
    /// Cancellation requested; abort before the next side effect.
    Cancelled,
}

struct OperationSlot {
    lock: Arc<tokio::sync::Mutex<()>>,
    cancelled: Arc<AtomicBool>,
    cancelled_at: Option<Instant>,
    /// Holders plus waiters. Guarded by the map mutex.
    refs: usize,
}

impl OperationSlot {
    fn new() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            cancelled: Arc::new(AtomicBool::new(false)),
            cancelled_at: None,
            refs: 0,
        }
    }

    /// Drop a cancellation nobody consumed within `ttl`.
    fn expire_flag(&mut self, ttl: Duration) {
        if self.refs == 0 && self.cancelled_at.is_some_and(|at| at.elapsed() >= ttl) {
            self.cancelled.store(false, Ordering::Release);
            self.cancelled_at = None;
        }
    }
}

type SlotMap = Arc<Mutex<HashMap<WorkItemId, OperationSlot>>>;

/// Registry of in-flight operations.
pub struct OperationCoordinator {
    slots: SlotMap,
    flag_ttl: Duration,
}

impl OperationCoordinator {
    /// Create a coordinator. Cancellation flags set on idle items expire
    /// after `flag_ttl`.
    pub fn new(flag_ttl: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            flag_ttl,
        }
    }

    /// Take the item's lock without waiting.
    ///
    /// # Errors
    ///
    /// [`QueueError::Busy`] if another operation holds it.
    pub fn try_acquire(&self, id: WorkItemId) -> Result<OperationGuard, QueueError> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(id).or_insert_with(OperationSlot::new);
        slot.expire_flag(self.flag_ttl);
        match Arc::clone(&slot.lock).try_lock_owned() {
            Ok(held) => {
                slot.refs += 1;
                let cancelled = Arc::clone(&slot.cancelled);
                drop(slots);
                debug!(work_item_id = %id, "operation admitted");
                Ok(OperationGuard {
                    cancel: CancelSignal { flag: cancelled },
                    held: Some(held),
                    slot: SlotRef {
                        id,
                        slots: Arc::clone(&self.slots),
                    },
                })
            }
            Err(_) => {
                debug!(work_item_id = %id, "operation rejected: busy");
                Err(QueueError::Busy(id))
            }
        }
    }

    /// Take the item's lock, waiting as long as needed. Only for callers that
    /// own the item outright, such as the scheduler's batch pass.
    pub async fn acquire(&self, id: WorkItemId) -> OperationGuard {
        let (lock, slot_ref, cancel) = self.register_waiter(id);
        let held = lock.lock_owned().await;
        OperationGuard {
            cancel,
            held: Some(held),
            slot: slot_ref,
        }
    }

    /// Take the item's lock, waiting at most `wait`.
    ///
    /// # Errors
    ///
    /// [`QueueError::Busy`] if the current holder does not step aside in time.
    pub async fn acquire_within(
        &self,
        id: WorkItemId,
        wait: Duration,
    ) -> Result<OperationGuard, QueueError> {
        let (lock, slot_ref, cancel) = self.register_waiter(id);
        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(held) => Ok(OperationGuard {
                cancel,
                held: Some(held),
                slot: slot_ref,
            }),
            // dropping slot_ref withdraws the waiter
            Err(_) => Err(QueueError::Busy(id)),
        }
    }

    fn register_waiter(&self, id: WorkItemId) -> (Arc<tokio::sync::Mutex<()>>, SlotRef, CancelSignal) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(id).or_insert_with(OperationSlot::new);
        slot.expire_flag(self.flag_ttl);
        slot.refs += 1;
        let lock = Arc::clone(&slot.lock);
        let cancel = CancelSignal {
            flag: Arc::clone(&slot.cancelled),
        };
        drop(slots);
        (
            lock,
            SlotRef {
                id,
                slots: Arc::clone(&self.slots),
            },
            cancel,
        )
    }

    /// Ask whatever is running on `id` to stop at its next checkpoint.
    ///
    /// Idempotent. If nothing is running the flag waits for the next
    /// operation or expires after the TTL.
    pub fn cancel(&self, id: WorkItemId) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(id).or_insert_with(OperationSlot::new);
        slot.cancelled.store(true, Ordering::Release);
        slot.cancelled_at = Some(Instant::now());
        debug!(work_item_id = %id, running = slot.refs > 0, "cancellation requested");
    }

    /// Finish an operation: clears the cancellation flag and frees the lock.
    /// Dropping the guard does the same.
    pub fn release(&self, guard: OperationGuard) {
        let id = guard.work_item_id();
        drop(guard);
        debug!(work_item_id = %id, "operation released");
    }

    /// Whether a cancellation is pending for `id`.
    pub fn is_cancel_requested(&self, id: WorkItemId) -> bool {
        self.slots
            .lock()
            .get(&id)
            .is_some_and(|slot| slot.cancelled.load(Ordering::Acquire))
    }

    /// Whether an operation currently holds `id`.
    pub fn is_held(&self, id: WorkItemId) -> bool {
        self.slots
            .lock()
            .get(&id)
            .is_some_and(|slot| slot.lock.try_lock().is_err())
    }

    /// Number of live entries (held, awaited, or carrying a pending flag).
    pub fn active_len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Remove flag-only entries whose cancellation is older than the TTL.
    pub fn purge_stale_flags(&self) -> usize {
        let ttl = self.flag_ttl;
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| {
            slot.refs > 0 || slot.cancelled_at.is_none_or(|at| at.elapsed() < ttl)
        });
        before - slots.len()
    }
}

/// Read side of an item's cancellation flag, handed to pipeline stages.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    /// Consume a pending cancellation, if any.
    pub fn checkpoint(&self) -> Checkpoint {
        if self.flag.swap(false, Ordering::AcqRel) {
            Checkpoint::Cancelled
        } else {
            Checkpoint::Continue
        }
    }

    /// Look without consuming.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Holds the item's slot reference; the last one out removes the entry.
struct SlotRef {
    id: WorkItemId,
    slots: SlotMap,
}

impl Drop for SlotRef {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&self.id) {
            slot.refs = slot.refs.saturating_sub(1);
            if slot.refs == 0 {
                slots.remove(&self.id);
            }
        }
    }
}

/// Exclusive right to operate on one work item. Dropping it releases the
/// item and clears its cancellation flag.
pub struct OperationGuard {
    cancel: CancelSignal,
    held: Option<OwnedMutexGuard<()>>,
    slot: SlotRef,
}

impl OperationGuard {
    /// Item this guard covers.
    pub const fn work_item_id(&self) -> WorkItemId {
        self.slot.id
    }

    /// Cancellation signal for checkpointed stages.
    pub fn cancellation(&self) -> CancelSignal {
        self.cancel.clone()
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        // reset before unlocking so the next holder starts clean
        self.cancel.flag.store(false, Ordering::Release);
        self.held.take();
    }
}

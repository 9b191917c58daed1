//! Posting-queue lifecycle: scheduling, coordination, and terminal transitions.

pub mod allocation;
pub mod audit;
pub mod autopost;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod mix;
pub mod model;
pub mod notify;
pub mod reconciler;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod store;

pub use allocation::{interleave, largest_remainder};
pub use audit::{
    build_audit_event, AuditChannel, AuditEvent, AuditSink, AuditWriterHandle, InMemoryAuditSink,
    AUDIT_SESSION_LABEL,
};
pub use autopost::{AutoPostOutcome, AutoPoster, Publisher, RemotePostId, Stage, UploadHandle};
pub use coordinator::{CancelSignal, Checkpoint, OperationCoordinator, OperationGuard};
pub use engine::{CompletionEngine, EngineStats, Resolution};
pub use error::{AppResult, ErrorKind, QueueError};
pub use mix::{uniform_ratios, validate_ratios, CategoryMixStore, Ratios, RATIO_EPSILON};
pub use model::{
    Actor, CategoryMix, CompletionRequest, HistoryRecord, MediaItem, MediaRef, Outcome,
    PostMethod, WorkItem, WorkItemStatus,
};
pub use notify::{Acknowledgement, Notifier, NullNotifier};
pub use reconciler::{RaceReconciler, ReconciledOutcome};
pub use retry::{with_bounded_retry, Attempt, Recovery, Retried, RETRY_BUDGET};
pub use scheduler::{
    plan_slots, PlannedSlot, PostingWindow, ScheduleReport, Scheduler, SlotShortfall,
};
pub use service::PostingQueue;
pub use store::{least_recent_key, HistoryStore, MediaCatalog, QueueStore};

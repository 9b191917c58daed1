//! In-memory collaborators and the bounded session pool.

pub mod catalog;
pub mod history;
pub mod mix;
pub mod notify;
pub mod pool;
pub mod queue;

pub use catalog::InMemoryCatalog;
pub use history::InMemoryHistoryStore;
pub use mix::InMemoryCategoryMixStore;
pub use notify::InMemoryNotifier;
pub use pool::{HygieneHandle, PoolLimits, PoolStats, Session, SessionInfo, SessionPool, SessionState};
pub use queue::InMemoryQueueStore;

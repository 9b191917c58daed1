//! History store backends.

pub mod memory;

pub use memory::InMemoryHistoryStore;

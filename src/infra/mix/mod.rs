//! Category mix store backends.

pub mod memory;

pub use memory::InMemoryCategoryMixStore;

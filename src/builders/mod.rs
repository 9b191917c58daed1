//! Builders to construct engine components from configuration.

pub mod queue_builder;

pub use queue_builder::{build_posting_queue, BuiltQueue, Collaborators};

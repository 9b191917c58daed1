//! Runtime-agnostic task spawning.

use std::future::Future;

/// Spawner abstraction to decouple from a specific runtime.
pub trait Spawn {
    /// Spawn a detached async task.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

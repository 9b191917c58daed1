//! Runtime adapters and API surface.

pub mod api;
pub mod spawn;
pub mod tokio_spawner;

pub use api::{handle_action, health, ActionRequest, ActionResponse, ActionResult, Health};
pub use spawn::Spawn;
pub use tokio_spawner::TokioSpawner;

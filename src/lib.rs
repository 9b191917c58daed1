//! # Prometheus Posting Queue
//!
//! Lifecycle engine for time-slotted social-media posting.
//!
//! A scheduler fills each day's posting window with work items drawn from a
//! media catalog according to a versioned category mix. Human reviewers (via
//! chat buttons) and an automated poster then race to resolve every item to
//! exactly one terminal outcome. The engine guarantees that outcome even under
//! duplicate clicks, transient storage failures, and automated runs that a
//! human overrides halfway through.
//!
//! ## Core Guarantees
//!
//! - **One operation per item**: a per-item lock admits a single caller;
//!   interactive triggers get `Busy` instead of queueing
//! - **Cooperative cancellation**: a human override stops the auto-poster at
//!   its next checkpoint and discards any uploaded artifact
//! - **Idempotent races**: a trigger for an item that is already gone is
//!   answered from history, not reported as an error
//! - **Bounded retry**: a transient storage error is retried exactly once
//!   after refreshing stale sessions
//! - **Bounded resources**: the session pool times out instead of blocking,
//!   and its hygiene sweep also covers the audit writer's long-lived session
//!
//! ## Resolving an item
//!
//! ```rust,ignore
//! use prometheus_posting_queue::builders::{build_posting_queue, Collaborators};
//! use prometheus_posting_queue::config::EngineConfig;
//! use prometheus_posting_queue::core::{Outcome, Resolution};
//! use prometheus_posting_queue::runtime::TokioSpawner;
//!
//! let built = build_posting_queue(
//!     &EngineConfig::default(),
//!     Collaborators::in_memory(),
//!     None,
//!     clock,
//!     &TokioSpawner::current(),
//! )?;
//! let report = built.scheduler.schedule_day(date, Some(chat)).await?;
//!
//! let id = report.created[0].id;
//! match built.service.resolve(id, Outcome::Skipped, "alice").await? {
//!     Resolution::Completed(outcome) => println!("{outcome}"),
//!     Resolution::Busy => println!("someone else is on it"),
//!     Resolution::Reconciled(what) => println!("{what}"),
//! }
//! ```
//!
//! For complete scenarios, see:
//! - `tests/engine_test.rs` - completion, retry, and race reconciliation
//! - `tests/autopost_test.rs` - cancellation between checkpoints

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduling, coordination, and terminal transitions.
pub mod core;
/// Engine configuration.
pub mod config;
/// Builders to assemble the engine from configuration.
pub mod builders;
/// In-memory collaborators and the session pool.
pub mod infra;
/// Task spawning and transport-facing API models.
pub mod runtime;
/// Shared utilities.
pub mod util;

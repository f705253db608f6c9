//! Storage layer for taskledger
//!
//! This crate implements the persistence collaborators of the core:
//! - [`EventStore`]: append-only, per-workspace event storage
//! - [`InMemoryEventStore`]: DashMap-sharded store for tests and embedding
//! - [`FileEventStore`]: checksummed append-only log file with replay on open
//! - [`JobQueue`]: delayed, at-least-once closure job storage
//! - [`InMemoryJobQueue`]: in-process queue with retries and retention
//!
//! Both event stores enforce the chain-tip constraint: an event is only
//! accepted if its `prev_hash` equals the workspace's current tip. A stale
//! writer gets [`taskledger_core::Error::Conflict`] instead of forking the chain.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod file;
pub mod format;
pub mod queue;
pub mod sharded;
pub mod store;

pub use file::{FileEventStore, RecoveryReport, LOG_FILE_NAME};
pub use queue::{EnqueueRequest, InMemoryJobQueue, JobQueue, QueueSettings};
pub use sharded::InMemoryEventStore;
pub use store::EventStore;

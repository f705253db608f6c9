//! Core types for taskledger
//!
//! This crate defines the canonical data model shared by every other crate:
//! - [`Event`]: an immutable, hash-chained delivery fact
//! - [`chain`]: pure hashing and chain verification (no I/O)
//! - [`Policy`] / [`PolicyTier`]: closure rule sets
//! - [`ClosureJob`]: one scheduled delayed closure evaluation
//! - [`LedgerConfig`]: TOML-loadable configuration
//! - [`Error`]: the single error type used across the workspace
//!
//! ## Design Principle
//!
//! - **taskledger-core** defines semantic types and pure functions (this crate)
//! - **taskledger-storage** persists events and closure jobs
//! - **taskledger-engine** orchestrates appends, policy evaluation and scheduling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chain;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod job;
pub mod policy;
pub mod types;

pub use chain::{
    compute_event_hash, verify_chain_integrity, ChainError, ChainErrorKind, ChainVerification,
    GENESIS_SENTINEL,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DurabilityMode, LedgerConfig, SchedulerConfig, MAX_BACKOFF_BASE_SECS};
pub use error::{Error, Result};
pub use event::{Event, Fact};
pub use job::{ClosureJob, JobStatus};
pub use policy::{Policy, PolicyTier};
pub use types::{EventId, EventType, JobId, TaskId, WorkspaceId, DEFAULT_TRIGGER_SOURCE};

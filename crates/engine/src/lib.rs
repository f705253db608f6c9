//! Orchestration layer for taskledger
//!
//! This crate turns facts into chained events and drives optimistic closure:
//! - [`EventLogService`]: serialized per-workspace appends, verification, queries
//! - [`PolicyRegistry`] / [`PolicyEngine`]: closure eligibility and finalization
//! - [`ClosureScheduler`]: delayed, vetoable closure checks over a [`JobQueue`]
//!
//! [`JobQueue`]: taskledger_storage::JobQueue

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod event_log;
pub mod policy;
pub mod scheduler;
pub mod summary;

pub use event_log::{EventFilter, EventLogService, EventPage, Page};
pub use policy::{ClosureChecks, ClosureEvaluation, FinalizeOutcome, PolicyEngine, PolicyRegistry};
pub use scheduler::{ClosureScheduler, ProcessReport, VetoOutcome, VetoRequest};
pub use summary::{ClosureState, TaskHistory, TaskSummary};

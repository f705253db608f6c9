//! Public types for the taskledger API.
//!
//! This module re-exports types from the member crates with a single import path.

// Identifiers and events
pub use taskledger_core::{EventId, EventType, JobId, TaskId, WorkspaceId, DEFAULT_TRIGGER_SOURCE};
pub use taskledger_core::{Event, Fact};

// Hash chain
pub use taskledger_core::{
    compute_event_hash, verify_chain_integrity, ChainError, ChainErrorKind, ChainVerification,
    GENESIS_SENTINEL,
};

// Policies and jobs
pub use taskledger_core::{ClosureJob, JobStatus, Policy, PolicyTier};

// Time and configuration
pub use taskledger_core::{Clock, DurabilityMode, LedgerConfig, ManualClock, SchedulerConfig, SystemClock};

// Engine results
pub use taskledger_engine::{
    ClosureChecks, ClosureEvaluation, ClosureState, EventFilter, EventPage, FinalizeOutcome, Page,
    ProcessReport, TaskHistory, TaskSummary, VetoOutcome, VetoRequest,
};

// Storage seams
pub use taskledger_storage::{EventStore, JobQueue};

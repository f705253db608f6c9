//! Convenient imports for taskledger.
//!
//! ```ignore
//! use taskledger::prelude::*;
//!
//! let ledger = Ledger::in_memory()?;
//! ledger.record_fact(Fact::new("acme", EventType::Handshake).task("T-1"))?;
//! ```

// Main entry point
pub use crate::ledger::{Ledger, LedgerBuilder, RecordOutcome};

// Error handling
pub use crate::error::{Error, Result};

// Core types
pub use crate::types::{Event, EventType, Fact, JobId, TaskId, WorkspaceId};

// Policies and closure
pub use crate::types::{ClosureEvaluation, FinalizeOutcome, Policy, PolicyTier, VetoRequest};

// Verification
pub use crate::types::{ChainErrorKind, ChainVerification};

// Re-export serde_json for payloads
pub use serde_json::json;

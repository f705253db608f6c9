//! # Taskledger
//!
//! Tamper-evident delivery event log with optimistic task closure.
//!
//! Every workspace owns a SHA-256 hash chain of delivery events (handshakes,
//! pull requests, CI results, approvals). Anyone holding the events can prove
//! the history was not altered by re-running [`verify_chain_integrity`]. On
//! top of the chain, tasks are closed optimistically: a closure proposal
//! schedules a delayed check, which finalizes the task if its workspace
//! policy is satisfied and nobody vetoed it first.
//!
//! ## Quick Start
//!
//! ```ignore
//! use taskledger::prelude::*;
//!
//! let ledger = Ledger::builder()
//!     .path("./ledger-data")
//!     .default_tier(PolicyTier::Standard)
//!     .open()?;
//!
//! ledger.record_fact(Fact::new("acme", EventType::PrOpened).task("T-1"))?;
//! ledger.record_fact(
//!     Fact::new("acme", EventType::PrApproved)
//!         .task("T-1")
//!         .payload(json!({"reviewer": "ana"})),
//! )?;
//! ledger.record_fact(Fact::new("acme", EventType::CiPassed).task("T-1"))?;
//!
//! // schedules a closure check 48h out
//! ledger.record_fact(Fact::new("acme", EventType::TaskCompleted).task("T-1"))?;
//!
//! ledger.scheduler.start()?;
//! ```
//!
//! ## Layers
//!
//! - `taskledger-core`: data model, hash chain, configuration
//! - `taskledger-storage`: event stores and job queue
//! - `taskledger-engine`: event log service, policies, closure scheduler

#![warn(missing_docs)]

mod error;
mod ledger;
mod types;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerBuilder, RecordOutcome};

// Re-export types
pub use types::*;

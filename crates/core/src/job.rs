//! Closure job types
//!
//! A [`ClosureJob`] is one scheduled, cancellable delayed evaluation of a
//! task's closure policy.
//!
//! ## Lifecycle
//!
//! ```text
//! Scheduled ──fetch──▶ Active ──complete──▶ Completed
//!     │                  │
//!     │                  └──fail──▶ Scheduled (retry, backoff)
//!     │                               └──▶ Failed (attempts exhausted)
//!     └──cancel──▶ Vetoed
//! ```
//!
//! Vetoed, Completed and Failed are terminal. A vetoed proposal is never
//! resumed; a new proposal needs a new job.

use crate::types::{JobId, TaskId, WorkspaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closure job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for `scheduled_for`
    Scheduled,
    /// Leased by a worker
    Active,
    /// Evaluated (finalized or dropped)
    Completed,
    /// Cancelled before it fired
    Vetoed,
    /// Retries exhausted; abandoned
    Failed,
}

impl JobStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Vetoed | JobStatus::Failed
        )
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Vetoed => "vetoed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduled delayed closure evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureJob {
    /// Queue-issued identifier
    pub id: JobId,
    /// Subject workspace
    pub workspace_id: WorkspaceId,
    /// Subject task
    pub task_id: TaskId,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may run (creation + delay, or retry time)
    pub scheduled_for: DateTime<Utc>,
    /// Current status
    pub status: JobStatus,
    /// Failed attempts so far
    pub attempts: u32,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

impl ClosureJob {
    /// Whether the job may be fetched at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Scheduled && self.scheduled_for <= now
    }
}

//! The `EventStore` contract
//!
//! Durable, append-only storage keyed by workspace. Implementations must:
//!
//! - accept an event only when its `prev_hash` equals the workspace tip
//!   (`None` for an empty workspace), otherwise return `Error::Conflict`
//! - return events in chain order (append order), oldest first
//! - never update or delete a stored event

use taskledger_core::{Event, Result, TaskId, WorkspaceId};

/// Append-only event persistence
pub trait EventStore: Send + Sync {
    /// Append an event at the tip of its workspace chain
    ///
    /// # Errors
    ///
    /// - `Conflict`: `event.prev_hash` is not the current tip
    /// - `Io` / `Storage`: the backend failed to persist the record
    fn append(&self, event: &Event) -> Result<()>;

    /// Hash of the most recent event in the workspace, `None` if empty
    fn latest_hash(&self, workspace: &WorkspaceId) -> Result<Option<String>>;

    /// Every event of a workspace, oldest first
    fn list_workspace(&self, workspace: &WorkspaceId) -> Result<Vec<Event>>;

    /// Every event linked to a task, oldest first within each workspace
    fn list_task(&self, task: &TaskId) -> Result<Vec<Event>>;

    /// All workspaces holding at least one event, sorted
    fn workspaces(&self) -> Result<Vec<WorkspaceId>>;

    /// Number of events in a workspace
    fn len(&self, workspace: &WorkspaceId) -> Result<usize>;

    /// Check if a workspace has no events
    fn is_empty(&self, workspace: &WorkspaceId) -> Result<bool> {
        Ok(self.len(workspace)? == 0)
    }
}

pub(crate) fn tip_conflict(
    workspace: &WorkspaceId,
    stated: Option<&str>,
    tip: Option<&str>,
) -> taskledger_core::Error {
    taskledger_core::Error::Conflict {
        workspace: workspace.to_string(),
        expected: stated.unwrap_or("genesis").to_string(),
        actual: tip.unwrap_or("genesis").to_string(),
    }
}

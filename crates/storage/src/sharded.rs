//! Sharded in-memory event store
//!
//! # Design
//!
//! - DashMap: one shard per workspace, so different workspaces never contend
//! - Vec per shard: append order is chain order
//! - The tip check and the push happen under the shard's write guard, which
//!   makes "one event per prev_hash per workspace" hold even for writers that
//!   bypass the event log service
//!
//! # Example
//!
//! ```ignore
//! use taskledger_storage::{EventStore, InMemoryEventStore};
//!
//! let store = InMemoryEventStore::new();
//! store.append(&genesis)?;
//! assert_eq!(store.latest_hash(&ws)?, Some(genesis.event_hash.clone()));
//! ```

use crate::store::{tip_conflict, EventStore};
use dashmap::DashMap;
use taskledger_core::{Event, Result, TaskId, WorkspaceId};

/// Per-workspace shard holding the workspace chain
#[derive(Debug, Default)]
pub struct Shard {
    pub(crate) events: Vec<Event>,
}

impl Shard {
    /// Hash of the last event, if any
    pub fn tip(&self) -> Option<&str> {
        self.events.last().map(|e| e.event_hash.as_str())
    }

    /// Get number of events in this shard
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if shard is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// In-memory event store, sharded by workspace
///
/// # Thread Safety
///
/// All operations are thread-safe:
/// - reads clone out of a shard read guard
/// - `append` only locks the target workspace's shard
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    shards: DashMap<WorkspaceId, Shard>,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of workspaces
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Get total number of events across all workspaces
    pub fn total_events(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, event: &Event) -> Result<()> {
        let mut shard = self.shards.entry(event.workspace_id.clone()).or_default();
        if shard.tip() != event.prev_hash.as_deref() {
            return Err(tip_conflict(
                &event.workspace_id,
                event.prev_hash.as_deref(),
                shard.tip(),
            ));
        }
        shard.events.push(event.clone());
        Ok(())
    }

    fn latest_hash(&self, workspace: &WorkspaceId) -> Result<Option<String>> {
        Ok(self
            .shards
            .get(workspace)
            .and_then(|shard| shard.tip().map(str::to_string)))
    }

    fn list_workspace(&self, workspace: &WorkspaceId) -> Result<Vec<Event>> {
        Ok(self
            .shards
            .get(workspace)
            .map(|shard| shard.events.clone())
            .unwrap_or_default())
    }

    fn list_task(&self, task: &TaskId) -> Result<Vec<Event>> {
        let mut matched: Vec<(WorkspaceId, Vec<Event>)> = self
            .shards
            .iter()
            .filter_map(|entry| {
                let events: Vec<Event> = entry
                    .value()
                    .events
                    .iter()
                    .filter(|e| e.task_id.as_ref() == Some(task))
                    .cloned()
                    .collect();
                (!events.is_empty()).then(|| (entry.key().clone(), events))
            })
            .collect();
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matched.into_iter().flat_map(|(_, events)| events).collect())
    }

    fn workspaces(&self) -> Result<Vec<WorkspaceId>> {
        let mut ids: Vec<WorkspaceId> = self
            .shards
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn len(&self, workspace: &WorkspaceId) -> Result<usize> {
        Ok(self.shards.get(workspace).map(|s| s.len()).unwrap_or(0))
    }
}

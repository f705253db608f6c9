//! Event log service
//!
//! Turns facts into correctly chained, durably stored events.
//!
//! ## Append serialization
//!
//! Appending is read-tip-then-write. Two concurrent writers on the same
//! workspace could both read the same tip and fork the chain, which
//! verification cannot detect. Every append therefore runs under that
//! workspace's writer lock:
//!
//! ```text
//! 1. lock workspace writer          (other workspaces are unaffected)
//! 2. read tip from the store
//! 3. seal fact onto tip             (hash computed here)
//! 4. store.append                   (store re-checks tip: Conflict if a
//!                                    writer outside this process raced us)
//! ```

use crate::summary::TaskHistory;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use taskledger_core::{
    verify_chain_integrity, ChainVerification, Clock, Error, Event, EventType, Fact, Result,
    TaskId, WorkspaceId,
};
use taskledger_storage::EventStore;
use tracing::{debug, warn};

/// Largest page `list_events` will return
pub const MAX_PAGE_LIMIT: usize = 500;

/// Filters for [`EventLogService::list_events`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Only events linked to this task
    pub task_id: Option<TaskId>,
    /// Only events of this type
    pub event_type: Option<EventType>,
    /// Only events with this origin (the `"automatic"` default applies)
    pub trigger_source: Option<String>,
    /// Only events created at or after this time
    pub created_after: Option<DateTime<Utc>>,
    /// Only events created strictly before this time
    pub created_before: Option<DateTime<Utc>>,
}

impl EventFilter {
    fn matches(&self, event: &Event) -> bool {
        self.task_id
            .as_ref()
            .map_or(true, |t| event.task_id.as_ref() == Some(t))
            && self.event_type.map_or(true, |t| event.event_type == t)
            && self
                .trigger_source
                .as_deref()
                .map_or(true, |s| event.trigger_source_or_default() == s)
            && self.created_after.map_or(true, |t| event.created_at >= t)
            && self.created_before.map_or(true, |t| event.created_at < t)
    }
}

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Events to skip
    pub offset: usize,
    /// Maximum events to return (clamped to [`MAX_PAGE_LIMIT`])
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// One page of events, in chain order
#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    /// Events on this page
    pub events: Vec<Event>,
    /// Events matching the filter across all pages
    pub total: usize,
    /// Offset this page starts at
    pub offset: usize,
    /// Effective limit
    pub limit: usize,
    /// Whether later pages exist
    pub has_more: bool,
}

/// Appends chained events and answers chain queries
pub struct EventLogService {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    writers: DashMap<WorkspaceId, Arc<Mutex<()>>>,
}

impl EventLogService {
    /// Create a service over a store
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            writers: DashMap::new(),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Time source used for `created_at`
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Hash of the most recent event in the workspace, `None` if it has none
    pub fn get_latest_event_hash(&self, workspace: &WorkspaceId) -> Result<Option<String>> {
        self.store.latest_hash(workspace)
    }

    /// Append the next event of a workspace chain
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: blank ids or non-object payload
    /// - `Conflict`: another process appended to the same store concurrently
    /// - storage errors from the backend
    pub fn create_hashed_event(
        &self,
        workspace: &WorkspaceId,
        task: Option<&TaskId>,
        event_type: EventType,
        trigger_source: Option<&str>,
        payload: Value,
    ) -> Result<Event> {
        self.append_fact(Fact {
            workspace_id: workspace.clone(),
            task_id: task.cloned(),
            event_type,
            trigger_source: trigger_source.map(str::to_string),
            payload,
        })
    }

    /// Append a fact as the next event of its workspace chain
    pub fn append_fact(&self, fact: Fact) -> Result<Event> {
        let workspace = fact.workspace_id.clone();
        self.append_with(&workspace, move || Ok(Some(fact)))?
            .ok_or_else(|| Error::Internal("unconditional append produced no event".into()))
    }

    /// Decide and append under the workspace writer lock
    ///
    /// `decide` runs while no other append to `workspace` can interleave; it
    /// returns the fact to append, or `None` to append nothing. This is how a
    /// caller makes "check history, then append" atomic.
    pub fn append_with<F>(&self, workspace: &WorkspaceId, decide: F) -> Result<Option<Event>>
    where
        F: FnOnce() -> Result<Option<Fact>>,
    {
        let writer = self.writer_lock(workspace);
        let _guard = writer.lock();

        let fact = match decide()? {
            Some(fact) => fact,
            None => return Ok(None),
        };
        if &fact.workspace_id != workspace {
            return Err(Error::InvalidInput(format!(
                "fact for workspace {} appended under {}",
                fact.workspace_id, workspace
            )));
        }

        let prev_hash = self.store.latest_hash(workspace)?;
        let event = Event::seal(fact, prev_hash, self.clock.now())?;
        self.store.append(&event)?;

        debug!(
            workspace = %event.workspace_id,
            event_id = %event.id,
            event_type = %event.event_type,
            genesis = event.is_genesis(),
            "event appended"
        );
        Ok(Some(event))
    }

    fn writer_lock(&self, workspace: &WorkspaceId) -> Arc<Mutex<()>> {
        // clone the Arc so the DashMap shard guard is released before locking
        self.writers.entry(workspace.clone()).or_default().clone()
    }

    /// Verify a workspace's whole chain
    pub fn verify_workspace(&self, workspace: &WorkspaceId) -> Result<ChainVerification> {
        let events = self.store.list_workspace(workspace)?;
        let verification = verify_chain_integrity(&events);
        for finding in &verification.errors {
            warn!(
                workspace = %workspace,
                event_id = %finding.event_id,
                index = finding.index,
                kind = %finding.kind,
                "chain integrity finding"
            );
        }
        Ok(verification)
    }

    /// List a workspace's events, filtered and paginated, in chain order
    pub fn list_events(
        &self,
        workspace: &WorkspaceId,
        filter: &EventFilter,
        page: Page,
    ) -> Result<EventPage> {
        let limit = page.limit.min(MAX_PAGE_LIMIT);
        let matching: Vec<Event> = self
            .store
            .list_workspace(workspace)?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        let total = matching.len();
        let events: Vec<Event> = matching.into_iter().skip(page.offset).take(limit).collect();
        let has_more = page.offset.saturating_add(events.len()) < total;

        Ok(EventPage {
            events,
            total,
            offset: page.offset,
            limit,
            has_more,
        })
    }

    /// Every event of a task plus its derived summary
    pub fn events_for_task(&self, task: &TaskId) -> Result<TaskHistory> {
        let events = self.store.list_task(task)?;
        Ok(TaskHistory::new(task.clone(), events))
    }

    /// Events of a task within one workspace, in chain order
    pub fn task_events_in(&self, workspace: &WorkspaceId, task: &TaskId) -> Result<Vec<Event>> {
        Ok(self
            .store
            .list_task(task)?
            .into_iter()
            .filter(|e| &e.workspace_id == workspace)
            .collect())
    }
}

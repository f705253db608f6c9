//! Event types for the tamper-evident log
//!
//! A [`Fact`] is what an external collaborator (webhook adapter, veto action,
//! the closure scheduler) hands to the log. Sealing a fact against the
//! current chain tip produces an [`Event`]: the fact plus identity, creation
//! time, `prev_hash` and its own `event_hash`.

use crate::chain::compute_event_hash;
use crate::error::{Error, Result};
use crate::types::{EventId, EventType, TaskId, WorkspaceId, DEFAULT_TRIGGER_SOURCE};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw delivery fact, not yet chained
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    /// Workspace the fact belongs to
    pub workspace_id: WorkspaceId,
    /// Task the fact is about, if any
    pub task_id: Option<TaskId>,
    /// Kind of fact
    pub event_type: EventType,
    /// Origin label (e.g. `github_webhook`); `None` hashes as `"automatic"`
    pub trigger_source: Option<String>,
    /// Structured description; must be a JSON object
    pub payload: Value,
}

impl Fact {
    /// Create a fact with an empty object payload
    pub fn new(workspace_id: impl Into<WorkspaceId>, event_type: EventType) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            task_id: None,
            event_type,
            trigger_source: None,
            payload: Value::Object(Map::new()),
        }
    }

    /// Link the fact to a task
    pub fn task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Set the origin label
    pub fn source(mut self, trigger_source: impl Into<String>) -> Self {
        self.trigger_source = Some(trigger_source.into());
        self
    }

    /// Set the payload
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Check the hashing input contract
    ///
    /// Rejects blank workspace or task ids and non-object payloads.
    pub fn validate(&self) -> Result<()> {
        if self.workspace_id.is_blank() {
            return Err(Error::invalid("workspace id must not be empty"));
        }
        if matches!(&self.task_id, Some(t) if t.is_blank()) {
            return Err(Error::invalid("task id must not be empty when present"));
        }
        if !self.payload.is_object() {
            return Err(Error::invalid(format!(
                "payload for {} must be a JSON object",
                self.event_type
            )));
        }
        Ok(())
    }
}

/// An immutable fact in a workspace's history
///
/// Invariant: `event_hash == compute_event_hash(self, self.prev_hash)`, and
/// within a workspace each event's `prev_hash` is the `event_hash` of the event
/// immediately before it (`None` for the genesis event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier, never reused
    pub id: EventId,
    /// Tenant partition key
    pub workspace_id: WorkspaceId,
    /// Linked task, if any
    pub task_id: Option<TaskId>,
    /// Kind of fact
    pub event_type: EventType,
    /// Origin label
    pub trigger_source: Option<String>,
    /// Structured description
    pub payload: Map<String, Value>,
    /// Hash of the preceding event in the workspace (`None` for genesis)
    pub prev_hash: Option<String>,
    /// Lowercase hex SHA-256 over the canonical encoding
    pub event_hash: String,
    /// Creation time, millisecond precision, set once
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Seal a fact onto a chain tip
    ///
    /// Validates the fact, truncates `created_at` to milliseconds (the
    /// precision of the canonical ISO-8601 form) and computes the event hash.
    pub fn seal(fact: Fact, prev_hash: Option<String>, created_at: DateTime<Utc>) -> Result<Self> {
        fact.validate()?;
        let payload = match fact.payload {
            Value::Object(map) => map,
            _ => return Err(Error::Internal("validated payload is not an object".into())),
        };

        let mut event = Event {
            id: EventId::new(),
            workspace_id: fact.workspace_id,
            task_id: fact.task_id,
            event_type: fact.event_type,
            trigger_source: fact.trigger_source,
            payload,
            prev_hash,
            event_hash: String::new(),
            created_at: created_at.trunc_subsecs(3),
        };
        event.event_hash = compute_event_hash(&event, event.prev_hash.as_deref());
        Ok(event)
    }

    /// Trigger source with the hashing default applied
    pub fn trigger_source_or_default(&self) -> &str {
        self.trigger_source
            .as_deref()
            .unwrap_or(DEFAULT_TRIGGER_SOURCE)
    }

    /// Recompute the hash from this event's own fields and stated `prev_hash`
    pub fn recompute_hash(&self) -> String {
        compute_event_hash(self, self.prev_hash.as_deref())
    }

    /// Whether this is the first event of its workspace
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }

    /// String-valued payload field, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

//! Identifier and enumeration types
//!
//! This module defines the small value types used throughout the system:
//! - [`WorkspaceId`]: tenant partition key; every chain is scoped to one
//! - [`TaskId`]: unit of work an event may be linked to
//! - [`EventId`]: unique, never reused event identifier
//! - [`JobId`]: opaque identifier issued by a job queue
//! - [`EventType`]: the closed set of delivery facts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Trigger source recorded when a fact does not name its origin.
pub const DEFAULT_TRIGGER_SOURCE: &str = "automatic";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier string
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is empty or whitespace only
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Tenant partition key
    ///
    /// All chain invariants are scoped per workspace: each workspace owns exactly
    /// one linear hash chain.
    WorkspaceId
);

string_id!(
    /// Identifier of a unit of work (ticket, issue)
    TaskId
);

string_id!(
    /// Opaque closure job identifier issued by a job queue
    JobId
);

impl JobId {
    /// Generate a fresh random job id
    pub fn generate() -> Self {
        JobId(Uuid::new_v4().to_string())
    }
}

/// Unique identifier for an event
///
/// Assigned once at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Create a new random EventId using UUID v4
    ///
    /// # Examples
    ///
    /// ```
    /// use taskledger_core::EventId;
    ///
    /// let a = EventId::new();
    /// let b = EventId::new();
    /// assert_ne!(a, b);
    /// ```
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        EventId(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery fact kinds
///
/// A closed enumeration: webhook adapters map their raw payloads onto one of
/// these before handing a fact to the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Task picked up and acknowledged by an assignee
    Handshake,
    /// Assignee declined the task
    HandshakeRejected,
    /// Pull request opened for the task
    PrOpened,
    /// Review approval on a pull request
    PrApproved,
    /// Pull request merged
    PrMerged,
    /// CI pipeline succeeded
    CiPassed,
    /// CI pipeline failed
    CiFailed,
    /// A named status check succeeded
    CheckPassed,
    /// A named status check failed
    CheckFailed,
    /// Task reported done by the tracker
    TaskCompleted,
    /// Explicit request to start the optimistic closure window
    ClosureProposed,
    /// Task finalized by the closure policy
    ClosureApproved,
    /// Pending closure vetoed by an authorized party
    ClosureVetoed,
}

impl EventType {
    /// All event types, in declaration order
    pub const ALL: [EventType; 13] = [
        EventType::Handshake,
        EventType::HandshakeRejected,
        EventType::PrOpened,
        EventType::PrApproved,
        EventType::PrMerged,
        EventType::CiPassed,
        EventType::CiFailed,
        EventType::CheckPassed,
        EventType::CheckFailed,
        EventType::TaskCompleted,
        EventType::ClosureProposed,
        EventType::ClosureApproved,
        EventType::ClosureVetoed,
    ];

    /// Wire name, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Handshake => "handshake",
            EventType::HandshakeRejected => "handshake_rejected",
            EventType::PrOpened => "pr_opened",
            EventType::PrApproved => "pr_approved",
            EventType::PrMerged => "pr_merged",
            EventType::CiPassed => "ci_passed",
            EventType::CiFailed => "ci_failed",
            EventType::CheckPassed => "check_passed",
            EventType::CheckFailed => "check_failed",
            EventType::TaskCompleted => "task_completed",
            EventType::ClosureProposed => "closure_proposed",
            EventType::ClosureApproved => "closure_approved",
            EventType::ClosureVetoed => "closure_vetoed",
        }
    }

    /// Whether recording this fact opens an optimistic closure window
    pub fn proposes_closure(&self) -> bool {
        matches!(self, EventType::TaskCompleted | EventType::ClosureProposed)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::Error::invalid(format!("unknown event type '{}'", s)))
    }
}

//! Derived task state
//!
//! Everything here is a pure reduction over a task's events in chain order.
//! Nothing is stored; re-reading the chain always yields the same answer.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use taskledger_core::{Event, EventType, TaskId};

/// Closure state of a task, decided by its last closure-related event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureState {
    /// No closure activity
    Open,
    /// Closure proposed, not yet decided
    Proposed,
    /// Last decision was `closure_approved`
    Approved,
    /// Last decision was `closure_vetoed`
    Vetoed,
}

impl ClosureState {
    /// Fold a task's events into its closure state
    ///
    /// A veto that loses the race against a running evaluation can leave both
    /// `closure_approved` and `closure_vetoed` in the chain. Chain position
    /// decides: the later event wins, whatever the timestamps say.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        events
            .into_iter()
            .fold(ClosureState::Open, |state, e| match e.event_type {
                EventType::TaskCompleted | EventType::ClosureProposed => ClosureState::Proposed,
                EventType::ClosureApproved => ClosureState::Approved,
                EventType::ClosureVetoed => ClosureState::Vetoed,
                _ => state,
            })
    }

    /// Whether the task is finalized
    pub fn is_closed(&self) -> bool {
        *self == ClosureState::Approved
    }
}

/// Counters derived from a task's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSummary {
    /// `pr_opened` events
    pub pr_count: usize,
    /// Distinct approvers
    pub approval_count: usize,
    /// Latest CI outcome is a pass
    pub ci_passed: bool,
    /// Closure state
    pub closure: ClosureState,
    /// Events considered
    pub event_count: usize,
}

impl TaskSummary {
    /// Reduce a task's events (chain order) to a summary
    pub fn from_events(events: &[Event]) -> Self {
        Self {
            pr_count: events
                .iter()
                .filter(|e| e.event_type == EventType::PrOpened)
                .count(),
            approval_count: distinct_approvers(events).len(),
            ci_passed: latest_ci_outcome(events) == Some(true),
            closure: ClosureState::from_events(events),
            event_count: events.len(),
        }
    }
}

/// A task's events with their summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskHistory {
    /// Task the history belongs to
    pub task_id: TaskId,
    /// Events, oldest first within each workspace
    pub events: Vec<Event>,
    /// Derived counters
    pub summary: TaskSummary,
}

impl TaskHistory {
    /// Build a history, computing the summary
    pub fn new(task_id: TaskId, events: Vec<Event>) -> Self {
        let summary = TaskSummary::from_events(&events);
        Self {
            task_id,
            events,
            summary,
        }
    }
}

/// Distinct approvers among `pr_approved` events
///
/// Approvers are identified by the payload's `reviewer` string. An approval
/// without one still counts once, keyed by its event id.
pub fn distinct_approvers(events: &[Event]) -> BTreeSet<String> {
    events
        .iter()
        .filter(|e| e.event_type == EventType::PrApproved)
        .map(|e| match e.payload_str("reviewer") {
            Some(reviewer) if !reviewer.is_empty() => format!("reviewer:{}", reviewer),
            _ => format!("event:{}", e.id),
        })
        .collect()
}

/// Latest CI outcome: `Some(true)` for pass, `Some(false)` for failure
pub fn latest_ci_outcome(events: &[Event]) -> Option<bool> {
    events.iter().rev().find_map(|e| match e.event_type {
        EventType::CiPassed => Some(true),
        EventType::CiFailed => Some(false),
        _ => None,
    })
}

/// Latest outcome per named check
///
/// Check events without a string `name` are ignored.
pub fn check_outcomes(events: &[Event]) -> BTreeMap<String, bool> {
    let mut outcomes = BTreeMap::new();
    for e in events {
        let passed = match e.event_type {
            EventType::CheckPassed => true,
            EventType::CheckFailed => false,
            _ => continue,
        };
        if let Some(name) = e.payload_str("name") {
            outcomes.insert(name.to_string(), passed);
        }
    }
    outcomes
}

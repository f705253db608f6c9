//! Hash chain construction and verification
//!
//! Pure functions, no I/O.
//!
//! ## Canonical encoding
//!
//! The hash input is a JSON object written field by field in this fixed order:
//!
//! ```text
//! { prevHash, eventType, triggerSource, payload, workspaceId, taskId, createdAt }
//! ```
//!
//! - `prevHash` is `"genesis"` for the first event of a workspace
//! - `triggerSource` is `"automatic"` when absent
//! - `taskId` is `null` when absent
//! - `createdAt` is ISO-8601 with millisecond precision (`2024-03-01T12:00:00.000Z`)
//! - payload objects are written with keys sorted, at every depth

use crate::event::Event;
use crate::types::EventId;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Value hashed in place of `prevHash` for the first event of a workspace.
pub const GENESIS_SENTINEL: &str = "genesis";

/// Compute the chained hash of an event
///
/// Uses the event's own fields and the supplied `prev_hash` (not
/// `event.prev_hash`), so callers can hash against any candidate predecessor.
/// Returns a 64-character lowercase hex SHA-256 digest.
pub fn compute_event_hash(event: &Event, prev_hash: Option<&str>) -> String {
    let canonical = canonical_encoding(event, prev_hash);
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

fn canonical_encoding(event: &Event, prev_hash: Option<&str>) -> String {
    let mut out = String::with_capacity(256);
    out.push('{');

    write_key(&mut out, "prevHash");
    write_str(&mut out, prev_hash.unwrap_or(GENESIS_SENTINEL));
    out.push(',');

    write_key(&mut out, "eventType");
    write_str(&mut out, event.event_type.as_str());
    out.push(',');

    write_key(&mut out, "triggerSource");
    write_str(&mut out, event.trigger_source_or_default());
    out.push(',');

    write_key(&mut out, "payload");
    out.push('{');
    write_entries(&mut out, &event.payload);
    out.push('}');
    out.push(',');

    write_key(&mut out, "workspaceId");
    write_str(&mut out, event.workspace_id.as_str());
    out.push(',');

    write_key(&mut out, "taskId");
    match &event.task_id {
        Some(task) => write_str(&mut out, task.as_str()),
        None => out.push_str("null"),
    }
    out.push(',');

    write_key(&mut out, "createdAt");
    write_str(
        &mut out,
        &event.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    out.push('}');
    out
}

fn write_key(out: &mut String, key: &str) {
    write_str(out, key);
    out.push(':');
}

fn write_str(out: &mut String, s: &str) {
    // serde_json's Display for a string value is its escaped JSON literal
    out.push_str(&Value::String(s.to_string()).to_string());
}

fn write_entries(out: &mut String, map: &serde_json::Map<String, Value>) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_key(out, key);
        write_value(out, &map[key]);
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push('{');
            write_entries(out, map);
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Kind of chain integrity finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainErrorKind {
    /// `prev_hash` does not equal the previous event's `event_hash`
    BrokenLink,
    /// Stored `event_hash` does not match the recomputed digest
    InvalidHash,
}

impl ChainErrorKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainErrorKind::BrokenLink => "broken_link",
            ChainErrorKind::InvalidHash => "invalid_hash",
        }
    }
}

impl std::fmt::Display for ChainErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One integrity finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainError {
    /// Event the finding is about
    pub event_id: EventId,
    /// Position of the event in the verified sequence
    pub index: usize,
    /// Finding kind
    pub kind: ChainErrorKind,
    /// Human-readable description
    pub message: String,
}

/// Chain verification result
///
/// Returned by [`verify_chain_integrity`]. Findings are data, not errors; the
/// caller decides on remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    /// True iff `errors` is empty
    pub valid: bool,
    /// Number of events walked
    pub verified_count: usize,
    /// All findings, in sequence order
    pub errors: Vec<ChainError>,
}

impl ChainVerification {
    /// Findings of one kind
    pub fn errors_of(&self, kind: ChainErrorKind) -> impl Iterator<Item = &ChainError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}

/// Verify an ordered sequence of events
///
/// Walks the events in the given order starting from an expected `prev_hash`
/// of `None`. For each event:
///
/// 1. a stated `prev_hash` different from the expected one is a `broken_link`
/// 2. the hash is recomputed against the event's *stated* `prev_hash`; a
///    mismatch is an `invalid_hash`
///
/// Both checks fire independently. Afterwards the expected `prev_hash`
/// advances to the event's own `event_hash` whether or not it had findings,
/// so one corrupted event does not cascade into every later event.
pub fn verify_chain_integrity(events: &[Event]) -> ChainVerification {
    let mut errors = Vec::new();
    let mut expected_prev: Option<&str> = None;

    for (index, event) in events.iter().enumerate() {
        if event.prev_hash.as_deref() != expected_prev {
            errors.push(ChainError {
                event_id: event.id,
                index,
                kind: ChainErrorKind::BrokenLink,
                message: format!(
                    "event {} links to {} but the previous event hash is {}",
                    event.id,
                    event.prev_hash.as_deref().unwrap_or(GENESIS_SENTINEL),
                    expected_prev.unwrap_or(GENESIS_SENTINEL),
                ),
            });
        }

        let recomputed = event.recompute_hash();
        if recomputed != event.event_hash {
            errors.push(ChainError {
                event_id: event.id,
                index,
                kind: ChainErrorKind::InvalidHash,
                message: format!(
                    "event {} stores hash {} but its content hashes to {}",
                    event.id, event.event_hash, recomputed
                ),
            });
        }

        expected_prev = Some(event.event_hash.as_str());
    }

    ChainVerification {
        valid: errors.is_empty(),
        verified_count: events.len(),
        errors,
    }
}

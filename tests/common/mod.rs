//! Shared helpers for taskledger integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use taskledger::{
    Clock, Event, EventStore, EventType, Fact, Ledger, ManualClock, PolicyTier, SchedulerConfig,
    TaskId, WorkspaceId,
};
use tempfile::TempDir;

/// A ledger with a manual clock and, when file-backed, its temp directory.
pub struct TestLedger {
    pub ledger: Ledger,
    pub clock: Arc<ManualClock>,
    dir: Option<TempDir>,
}

impl TestLedger {
    /// In-memory ledger, standard tier by default
    pub fn in_memory() -> Self {
        Self::in_memory_with(SchedulerConfig::default())
    }

    /// In-memory ledger with custom scheduler settings
    pub fn in_memory_with(scheduler: SchedulerConfig) -> Self {
        let clock = fixed_clock();
        let ledger = Ledger::builder()
            .in_memory()
            .default_tier(PolicyTier::Standard)
            .scheduler(scheduler)
            .clock(clock.clone())
            .open()
            .expect("in-memory ledger");
        Self {
            ledger,
            clock,
            dir: None,
        }
    }

    /// File-backed ledger in a fresh temp directory, strict durability
    pub fn on_disk() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let clock = fixed_clock();
        let ledger = open_at(&dir, clock.clone());
        Self {
            ledger,
            clock,
            dir: Some(dir),
        }
    }

    /// Close and reopen from the same directory
    pub fn reopen(self) -> Self {
        let dir = self.dir.expect("reopen needs a file-backed ledger");
        self.ledger.close().expect("close");
        drop(self.ledger);
        let ledger = open_at(&dir, self.clock.clone());
        Self {
            ledger,
            clock: self.clock,
            dir: Some(dir),
        }
    }

    /// Close the ledger, keeping its directory alive
    pub fn into_dir(self) -> TempDir {
        let dir = self.dir.expect("file-backed ledger");
        self.ledger.close().expect("close");
        drop(self.ledger);
        dir
    }

    /// Data directory of a file-backed ledger
    pub fn dir(&self) -> &std::path::Path {
        self.dir.as_ref().expect("file-backed ledger").path()
    }

    /// Append a task event; advances the clock one second afterwards
    pub fn record(&self, ws: &str, task: &str, event_type: EventType, payload: Value) -> Event {
        let event = self
            .ledger
            .record_fact(Fact::new(ws, event_type).task(task).payload(payload))
            .expect("record fact")
            .event;
        self.clock.advance(chrono::Duration::seconds(1));
        event
    }

    /// Record the standard-tier happy path: PR, one approval, green CI
    pub fn make_ready(&self, ws: &str, task: &str) {
        self.record(ws, task, EventType::Handshake, json!({}));
        self.record(ws, task, EventType::PrOpened, json!({"number": 7}));
        self.record(ws, task, EventType::PrApproved, json!({"reviewer": "ana"}));
        self.record(ws, task, EventType::CiPassed, json!({}));
    }

    /// Current time of the manual clock
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Events of a workspace in chain order
    pub fn chain(&self, ws: &str) -> Vec<Event> {
        self.ledger
            .events
            .store()
            .list_workspace(&WorkspaceId::from(ws))
            .expect("list workspace")
    }

    /// Current tip hash of a workspace
    pub fn tip(&self, ws: &str) -> Option<String> {
        self.ledger
            .events
            .get_latest_event_hash(&WorkspaceId::from(ws))
            .expect("latest hash")
    }
}

fn fixed_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()))
}

fn open_at(dir: &TempDir, clock: Arc<ManualClock>) -> Ledger {
    Ledger::builder()
        .path(dir.path())
        .strict()
        .default_tier(PolicyTier::Standard)
        .clock(clock)
        .open()
        .expect("file-backed ledger")
}

pub fn ws(id: &str) -> WorkspaceId {
    WorkspaceId::from(id)
}

pub fn task(id: &str) -> TaskId {
    TaskId::from(id)
}

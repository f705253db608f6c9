//! Append Concurrency Tests
//!
//! The chain must stay linear under concurrent appends:
//! - N racing writers on one empty workspace produce N linked events
//! - writers on different workspaces do not interfere
//! - a second service over the same store (another process, in effect) gets a
//!   retryable conflict instead of forking the chain

use crate::common::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use taskledger::{Error, EventType, Fact, Result, SystemClock};
use taskledger_engine::EventLogService;
use taskledger_storage::{EventStore, InMemoryEventStore};

/// Retry an operation on chain-tip conflicts
fn retry_on_conflict<F, T>(max_retries: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_err = None;
    for _ in 0..max_retries {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() => {
                last_err = Some(e);
                thread::yield_now();
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Internal("max retries exceeded on conflict".into())))
}

fn assert_linear(events: &[taskledger::Event], n: usize) {
    assert_eq!(events.len(), n);
    let prevs: HashSet<Option<&str>> = events.iter().map(|e| e.prev_hash.as_deref()).collect();
    assert_eq!(prevs.len(), n, "two events share a predecessor: the chain forked");
    assert_eq!(events.iter().filter(|e| e.prev_hash.is_none()).count(), 1);
    assert!(taskledger::verify_chain_integrity(events).valid);
}

// =============================================================================
// SAME WORKSPACE
// =============================================================================

/// Twenty writers released at once on an empty workspace
#[test]
fn test_concurrent_appends_do_not_fork() {
    let t = TestLedger::in_memory();
    let n = 20;
    let barrier = Barrier::new(n);

    thread::scope(|s| {
        for i in 0..n {
            let ledger = &t.ledger;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                ledger
                    .record_fact(
                        Fact::new("acme", EventType::PrOpened)
                            .task("T-1")
                            .payload(json!({ "writer": i })),
                    )
                    .unwrap();
            });
        }
    });

    let events = t.chain("acme");
    assert_linear(&events, n);

    let writers: HashSet<i64> = events.iter().filter_map(|e| e.payload["writer"].as_i64()).collect();
    assert_eq!(writers.len(), n);
}

#[test]
fn test_concurrent_appends_do_not_fork_on_disk() {
    let t = TestLedger::on_disk();
    let n = 20;
    let barrier = Barrier::new(n);

    thread::scope(|s| {
        for i in 0..n {
            let ledger = &t.ledger;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                ledger
                    .record_fact(Fact::new("acme", EventType::CiPassed).payload(json!({ "run": i })))
                    .unwrap();
            });
        }
    });

    let t = t.reopen();
    assert_linear(&t.chain("acme"), n);
}

// =============================================================================
// MANY WORKSPACES
// =============================================================================

#[test]
fn test_workspaces_append_independently() {
    let t = TestLedger::in_memory();
    let workspaces = ["a", "b", "c", "d"];
    let per_workspace = 15;

    thread::scope(|s| {
        for w in workspaces {
            for _ in 0..3 {
                let ledger = &t.ledger;
                s.spawn(move || {
                    for i in 0..per_workspace / 3 {
                        ledger
                            .record_fact(Fact::new(w, EventType::PrOpened).payload(json!({ "i": i })))
                            .unwrap();
                    }
                });
            }
        }
    });

    for w in workspaces {
        assert_linear(&t.chain(w), per_workspace);
    }
}

// =============================================================================
// SHARED STORE, SEPARATE WRITERS
// =============================================================================

/// Services that do not share writer locks are stopped by the store's tip check
#[test]
fn test_separate_services_surface_conflicts_not_forks() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let services: Vec<EventLogService> = (0..4)
        .map(|_| EventLogService::new(store.clone(), Arc::new(SystemClock)))
        .collect();
    let per_service = 10;
    let barrier = Barrier::new(services.len());

    thread::scope(|s| {
        for (k, service) in services.iter().enumerate() {
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for i in 0..per_service {
                    retry_on_conflict(1_000, || {
                        service.append_fact(
                            Fact::new("acme", EventType::CheckPassed)
                                .payload(json!({ "name": format!("s{}-{}", k, i) })),
                        )
                    })
                    .unwrap();
                }
            });
        }
    });

    let events = store.list_workspace(&ws("acme")).unwrap();
    assert_linear(&events, services.len() * per_service);
}

#[test]
fn test_stale_append_is_a_retryable_conflict() {
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let service = EventLogService::new(store.clone(), Arc::new(SystemClock));
    service
        .append_fact(Fact::new("acme", EventType::Handshake))
        .unwrap();

    let stale = taskledger::Event::seal(
        Fact::new("acme", EventType::PrOpened),
        None,
        chrono::Utc::now(),
    )
    .unwrap();
    let err = store.append(&stale).unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
    assert_eq!(store.len(&ws("acme")).unwrap(), 1);
}

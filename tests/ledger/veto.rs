//! Veto Tests
//!
//! - a veto before the job fires cancels it and is recorded at the chain tip
//! - a veto that loses the race is still recorded, and the later event wins

use crate::common::*;
use chrono::Duration;
use serde_json::json;
use taskledger::{ClosureState, EventType, JobStatus, VetoRequest};

fn propose(t: &TestLedger, ws_id: &str, task_id: &str) -> taskledger::JobId {
    t.ledger
        .record_fact(taskledger::Fact::new(ws_id, EventType::TaskCompleted).task(task_id))
        .unwrap()
        .closure_job
        .expect("closure job")
        .id
}

#[test]
fn test_veto_before_fire_cancels_and_records() {
    let t = TestLedger::in_memory();
    t.make_ready("acme", "T-1");
    let job = propose(&t, "acme", "T-1");

    t.clock.advance(Duration::hours(1));
    let tip = t.tip("acme");
    let outcome = t
        .ledger
        .scheduler
        .veto_closure(
            &job,
            &ws("acme"),
            &task("T-1"),
            VetoRequest {
                reason: Some("release freeze".into()),
                vetoed_by: Some("cto".into()),
            },
        )
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.event.event_type, EventType::ClosureVetoed);
    assert_eq!(outcome.event.prev_hash, tip);
    assert_eq!(
        serde_json::Value::Object(outcome.event.payload.clone()),
        json!({
            "jobId": job.as_str(),
            "cancelled": true,
            "reason": "release freeze",
            "vetoedBy": "cto",
        })
    );

    // the job never runs, even long after its due time
    t.clock.advance(Duration::hours(72));
    let report = t.ledger.scheduler.process_pending_jobs().unwrap();
    assert_eq!(report.processed + report.failed, 0);
    assert_eq!(
        t.ledger.scheduler.queue().get(&job).unwrap().unwrap().status,
        JobStatus::Vetoed
    );

    let chain = t.chain("acme");
    assert!(chain.iter().all(|e| e.event_type != EventType::ClosureApproved));
    assert!(t.ledger.verify_workspace(&ws("acme")).unwrap().valid);

    let history = t.ledger.events.events_for_task(&task("T-1")).unwrap();
    assert_eq!(history.summary.closure, ClosureState::Vetoed);
}

#[test]
fn test_cancel_twice_is_not_an_error() {
    let t = TestLedger::in_memory();
    let job = propose(&t, "acme", "T-1");
    assert!(t.ledger.scheduler.cancel_closure_job(&job).unwrap());
    assert!(!t.ledger.scheduler.cancel_closure_job(&job).unwrap());
}

#[test]
fn test_cancel_unknown_job_returns_false() {
    let t = TestLedger::in_memory();
    assert!(!t
        .ledger
        .scheduler
        .cancel_closure_job(&taskledger::JobId::generate())
        .unwrap());
}

/// The job fired first: both decisions are in the chain, the veto is last
#[test]
fn test_late_veto_loses_race_but_is_authoritative() {
    let t = TestLedger::in_memory();
    t.make_ready("acme", "T-1");
    let job = propose(&t, "acme", "T-1");

    t.clock.advance(Duration::hours(48));
    assert_eq!(t.ledger.scheduler.process_pending_jobs().unwrap().finalized, 1);

    let outcome = t
        .ledger
        .scheduler
        .veto_closure(&job, &ws("acme"), &task("T-1"), VetoRequest::default())
        .unwrap();
    assert!(!outcome.cancelled);

    let types: Vec<EventType> = t.chain("acme").iter().map(|e| e.event_type).collect();
    assert_eq!(&types[types.len() - 2..], &[EventType::ClosureApproved, EventType::ClosureVetoed]);

    let history = t.ledger.events.events_for_task(&task("T-1")).unwrap();
    assert_eq!(history.summary.closure, ClosureState::Vetoed);
}

/// A vetoed proposal stays dead; only a fresh proposal can close the task
#[test]
fn test_new_proposal_after_veto() {
    let t = TestLedger::in_memory();
    t.make_ready("acme", "T-1");
    let job = propose(&t, "acme", "T-1");
    t.ledger
        .scheduler
        .veto_closure(&job, &ws("acme"), &task("T-1"), VetoRequest::default())
        .unwrap();

    let eval = t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap();
    assert!(!eval.checks.not_vetoed);
    assert!(!eval.eligible);

    t.record("acme", "T-1", EventType::ClosureProposed, json!({}));
    t.clock.advance(Duration::hours(48));
    let report = t.ledger.scheduler.process_pending_jobs().unwrap();
    assert_eq!(report.finalized, 1);
}

//! Optimistic Closure Tests
//!
//! - the standard-policy closure scenario
//! - closure scheduling from recorded facts
//! - batch processing through the scheduler

use crate::common::*;
use chrono::Duration;
use serde_json::json;
use taskledger::{
    ClosureState, EventType, FinalizeOutcome, JobStatus, Policy, PolicyTier, SchedulerConfig,
};

// =============================================================================
// EVALUATION
// =============================================================================

/// Standard policy: one approval and green CI
#[test]
fn test_standard_closure_scenario() {
    let t = TestLedger::in_memory();
    t.record("acme", "T-1", EventType::Handshake, json!({}));
    t.record("acme", "T-1", EventType::PrOpened, json!({}));
    t.record("acme", "T-1", EventType::CiPassed, json!({}));

    let eval = t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap();
    assert!(!eval.eligible);
    assert!(!eval.checks.approvals_met);
    assert!(eval.checks.ci_passed);
    assert_eq!(eval.checks.required_approvals, 1);

    t.record("acme", "T-1", EventType::PrApproved, json!({"reviewer": "ana"}));
    let eval = t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap();
    assert!(eval.eligible);
    assert!(eval.checks.approvals_met);

    let prior_tip = t.tip("acme");
    let event = match t.ledger.engine.evaluate_and_finalize(&task("T-1"), &ws("acme")).unwrap() {
        FinalizeOutcome::Finalized(event) => event,
        other => panic!("expected finalization, got {:?}", other),
    };
    assert_eq!(event.event_type, EventType::ClosureApproved);
    assert_eq!(event.prev_hash, prior_tip);
    assert!(t.ledger.verify_workspace(&ws("acme")).unwrap().valid);

    let history = t.ledger.events.events_for_task(&task("T-1")).unwrap();
    assert_eq!(history.summary.closure, ClosureState::Approved);
    assert_eq!(history.summary.approval_count, 1);
    assert_eq!(history.summary.pr_count, 1);
    assert!(history.summary.ci_passed);
}

#[test]
fn test_failed_ci_after_pass_blocks_closure() {
    let t = TestLedger::in_memory();
    t.make_ready("acme", "T-1");
    t.record("acme", "T-1", EventType::CiFailed, json!({}));

    let eval = t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap();
    assert!(!eval.eligible);
    assert_eq!(eval.checks.failing(), vec!["ci_passed"]);
}

#[test]
fn test_override_policy_takes_precedence() {
    let t = TestLedger::in_memory();
    t.make_ready("acme", "T-1");
    t.ledger
        .policies
        .set_override(
            &ws("acme"),
            Policy {
                required_approvals: 2,
                ..PolicyTier::Standard.preset()
            },
        )
        .unwrap();

    let eval = t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap();
    assert!(!eval.eligible);
    assert_eq!((eval.checks.approvals, eval.checks.required_approvals), (1, 2));

    // the same reviewer approving again does not count twice
    t.record("acme", "T-1", EventType::PrApproved, json!({"reviewer": "ana"}));
    assert!(!t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap().eligible);

    t.record("acme", "T-1", EventType::PrApproved, json!({"reviewer": "bo"}));
    assert!(t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap().eligible);
}

#[test]
fn test_agile_tier_needs_nothing() {
    let t = TestLedger::in_memory();
    t.ledger.policies.assign_tier(&ws("acme"), PolicyTier::Agile);
    t.record("acme", "T-1", EventType::Handshake, json!({}));

    let eval = t.ledger.engine.evaluate_closure(&task("T-1"), &ws("acme")).unwrap();
    assert!(eval.eligible);
    assert!(!eval.checks.ci_required);
}

// =============================================================================
// SCHEDULING
// =============================================================================

/// The event is committed even when its closure check cannot be scheduled
#[test]
fn test_unschedulable_delay_still_records_the_fact() {
    let t = TestLedger::in_memory();
    t.ledger
        .policies
        .set_override(
            &ws("acme"),
            Policy {
                auto_close_delay_hours: u32::MAX,
                ..PolicyTier::Standard.preset()
            },
        )
        .unwrap();

    let outcome = t
        .ledger
        .record_fact(taskledger::Fact::new("acme", EventType::TaskCompleted).task("T-1"))
        .unwrap();
    assert!(outcome.closure_job.is_none());
    assert_eq!(t.chain("acme"), vec![outcome.event]);
    assert!(t.ledger.scheduler.queue().fetch_due(10).unwrap().is_empty());
}

#[test]
fn test_task_completed_schedules_closure_after_policy_delay() {
    let t = TestLedger::in_memory();
    t.make_ready("acme", "T-1");
    let before = t.clock_now();

    let outcome = t
        .ledger
        .record_fact(taskledger::Fact::new("acme", EventType::TaskCompleted).task("T-1"))
        .unwrap();
    let job = outcome.closure_job.expect("closure job");
    assert_eq!(job.status, JobStatus::Scheduled);
    assert_eq!(job.scheduled_for, before + Duration::hours(48));

    // not yet due
    let report = t.ledger.scheduler.process_pending_jobs().unwrap();
    assert_eq!(report.processed, 0);

    t.clock.advance(Duration::hours(48));
    let report = t.ledger.scheduler.process_pending_jobs().unwrap();
    assert_eq!((report.processed, report.failed, report.finalized), (1, 0, 1));

    let last = t.chain("acme").pop().unwrap();
    assert_eq!(last.event_type, EventType::ClosureApproved);
    assert_eq!(last.trigger_source.as_deref(), Some("policy_engine"));
}

#[test]
fn test_non_closing_events_schedule_nothing() {
    let t = TestLedger::in_memory();
    let outcome = t
        .ledger
        .record_fact(taskledger::Fact::new("acme", EventType::PrOpened).task("T-1"))
        .unwrap();
    assert!(outcome.closure_job.is_none());

    // closure proposed without a task has nothing to close
    let outcome = t
        .ledger
        .record_fact(taskledger::Fact::new("acme", EventType::ClosureProposed))
        .unwrap();
    assert!(outcome.closure_job.is_none());
}

#[test]
fn test_no_policy_schedules_nothing() {
    let ledger = taskledger::Ledger::in_memory().unwrap();
    let outcome = ledger
        .record_fact(taskledger::Fact::new("acme", EventType::TaskCompleted).task("T-1"))
        .unwrap();
    assert!(outcome.closure_job.is_none());
}

#[test]
fn test_ineligible_task_is_dropped_then_reproposed() {
    let t = TestLedger::in_memory();
    t.record("acme", "T-1", EventType::PrOpened, json!({}));
    t.record("acme", "T-1", EventType::TaskCompleted, json!({}));

    t.clock.advance(Duration::hours(48));
    let report = t.ledger.scheduler.process_pending_jobs().unwrap();
    assert_eq!((report.processed, report.not_ready, report.finalized), (1, 1, 0));

    // nothing left to run
    t.clock.advance(Duration::hours(48));
    assert_eq!(t.ledger.scheduler.process_pending_jobs().unwrap().processed, 0);

    // a fresh cycle proposes closure again
    t.record("acme", "T-1", EventType::PrApproved, json!({"reviewer": "ana"}));
    t.record("acme", "T-1", EventType::CiPassed, json!({}));
    t.record("acme", "T-1", EventType::ClosureProposed, json!({}));
    t.clock.advance(Duration::hours(48));
    assert_eq!(t.ledger.scheduler.process_pending_jobs().unwrap().finalized, 1);
}

#[test]
fn test_recheck_reschedules_ineligible_task() {
    let t = TestLedger::in_memory_with(SchedulerConfig {
        recheck_ineligible_after_hours: Some(12),
        ..SchedulerConfig::default()
    });
    t.record("acme", "T-1", EventType::TaskCompleted, json!({}));
    t.clock.advance(Duration::hours(48));
    assert_eq!(t.ledger.scheduler.process_pending_jobs().unwrap().not_ready, 1);

    t.make_ready("acme", "T-1");
    t.clock.advance(Duration::hours(12));
    assert_eq!(t.ledger.scheduler.process_pending_jobs().unwrap().finalized, 1);
}

#[test]
fn test_batch_size_bounds_one_run() {
    let t = TestLedger::in_memory_with(SchedulerConfig {
        batch_size: 2,
        ..SchedulerConfig::default()
    });
    for task in ["T-1", "T-2", "T-3"] {
        t.make_ready("acme", task);
        t.record("acme", task, EventType::TaskCompleted, json!({}));
    }
    t.clock.advance(Duration::hours(48));

    assert_eq!(t.ledger.scheduler.process_pending_jobs().unwrap().processed, 2);
    assert_eq!(t.ledger.scheduler.process_pending_jobs().unwrap().processed, 1);
    assert!(t.ledger.verify_workspace(&ws("acme")).unwrap().valid);
}

//! Chain Integrity Tests
//!
//! - chains built through the service always verify
//! - payload and link tampering are reported at the right index
//! - tampering with the log file behind the ledger's back is caught

use crate::common::*;
use chrono::Timelike;
use serde_json::json;
use taskledger::{verify_chain_integrity, ChainErrorKind, EventType, GENESIS_SENTINEL};
use taskledger_storage::format::{decode_record, encode_record};
use taskledger_storage::LOG_FILE_NAME;

fn build_chain(t: &TestLedger, ws: &str, n: usize) {
    let types = [
        EventType::PrOpened,
        EventType::CiFailed,
        EventType::CheckPassed,
        EventType::CiPassed,
        EventType::PrMerged,
    ];
    for i in 0..n {
        t.record(ws, "T-1", types[i % types.len()], json!({ "seq": i, "meta": { "b": 1, "a": [i] } }));
    }
}

// =============================================================================
// VALIDITY
// =============================================================================

#[test]
fn test_chain_built_through_service_verifies() {
    let t = TestLedger::in_memory();
    build_chain(&t, "acme", 25);

    let v = t.ledger.verify_workspace(&ws("acme")).unwrap();
    assert!(v.valid);
    assert_eq!(v.verified_count, 25);
    assert!(v.errors.is_empty());
}

#[test]
fn test_genesis_and_links() {
    let t = TestLedger::in_memory();
    build_chain(&t, "acme", 3);
    let chain = t.chain("acme");

    assert_eq!(chain[0].prev_hash, None);
    assert_eq!(chain[1].prev_hash.as_deref(), Some(chain[0].event_hash.as_str()));
    assert_eq!(chain[2].prev_hash.as_deref(), Some(chain[1].event_hash.as_str()));
    for e in &chain {
        assert_eq!(e.event_hash.len(), 64);
        assert!(e.event_hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(e.recompute_hash(), e.event_hash);
        assert_eq!(e.created_at.nanosecond() % 1_000_000, 0);
    }
}

#[test]
fn test_workspaces_have_independent_chains() {
    let t = TestLedger::in_memory();
    for i in 0..6 {
        let w = if i % 2 == 0 { "acme" } else { "globex" };
        t.record(w, "T-1", EventType::PrOpened, json!({ "i": i }));
    }

    let acme = t.chain("acme");
    let globex = t.chain("globex");
    assert_eq!(acme[0].prev_hash, None);
    assert_eq!(globex[0].prev_hash, None);

    let all = t.ledger.verify_all().unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|(_, v)| v.valid && v.verified_count == 3));
}

#[test]
fn test_empty_workspace_verifies() {
    let t = TestLedger::in_memory();
    let v = t.ledger.verify_workspace(&ws("nobody")).unwrap();
    assert!(v.valid);
    assert_eq!(v.verified_count, 0);
    assert_eq!(t.tip("nobody"), None);
}

// =============================================================================
// TAMPER DETECTION
// =============================================================================

#[test]
fn test_payload_tamper_reports_one_invalid_hash() {
    let t = TestLedger::in_memory();
    build_chain(&t, "acme", 8);
    let mut events = t.chain("acme");
    events[3].payload.insert("seq".into(), json!(999));

    let v = verify_chain_integrity(&events);
    assert!(!v.valid);
    assert_eq!(v.errors.len(), 1);
    assert_eq!(v.errors[0].kind, ChainErrorKind::InvalidHash);
    assert_eq!(v.errors[0].index, 3);
    assert_eq!(v.errors[0].event_id, events[3].id);
}

#[test]
fn test_prev_hash_tamper_reports_broken_link_at_that_index_only() {
    let t = TestLedger::in_memory();
    build_chain(&t, "acme", 8);
    let mut events = t.chain("acme");
    events[4].prev_hash = Some("0".repeat(64));

    let v = verify_chain_integrity(&events);
    let broken: Vec<_> = v.errors_of(ChainErrorKind::BrokenLink).collect();
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].index, 4);
    assert!(v.errors.iter().all(|e| e.index == 4));
}

#[test]
fn test_explicit_genesis_sentinel_is_rejected_as_link() {
    let t = TestLedger::in_memory();
    build_chain(&t, "acme", 2);
    let mut events = t.chain("acme");
    events[0].prev_hash = Some(GENESIS_SENTINEL.to_string());

    // the sentinel hashes like a missing prev hash, but the stored link differs
    let v = verify_chain_integrity(&events);
    assert_eq!(v.errors_of(ChainErrorKind::BrokenLink).count(), 1);
    assert_eq!(v.errors_of(ChainErrorKind::InvalidHash).count(), 0);
}

#[test]
fn test_tampered_log_file_is_detected_after_reopen() {
    let t = TestLedger::on_disk();
    build_chain(&t, "acme", 5);
    let path = t.dir().join(LOG_FILE_NAME);
    let t = {
        t.ledger.close().unwrap();
        let text = std::fs::read(&path).unwrap();
        let mut out = Vec::new();
        for (i, line) in text.split(|b| *b == b'\n').filter(|l| !l.is_empty()).enumerate() {
            let mut event = decode_record(line).unwrap();
            if i == 2 {
                // rewrite history with a fresh, valid checksum
                event.payload.insert("seq".into(), json!("forged"));
            }
            out.extend(encode_record(&event).unwrap());
        }
        std::fs::write(&path, out).unwrap();
        t.reopen()
    };

    let v = t.ledger.verify_workspace(&ws("acme")).unwrap();
    assert!(!v.valid);
    assert_eq!(v.errors.len(), 1);
    assert_eq!(v.errors[0].index, 2);
    assert_eq!(v.errors[0].kind, ChainErrorKind::InvalidHash);
}

//! Property Tests
//!
//! Arbitrary fact sequences always produce a valid chain, and tampering with
//! any one stored payload is reported at exactly that index.

use proptest::prelude::*;
use serde_json::json;
use taskledger::{verify_chain_integrity, ChainErrorKind, EventStore, EventType, Fact, Ledger};

fn event_type() -> impl Strategy<Value = EventType> {
    prop::sample::select(EventType::ALL.to_vec())
}

fn fact() -> impl Strategy<Value = (EventType, Option<String>, String, i64)> {
    (
        event_type(),
        prop::option::of("[a-z]{1,6}"),
        "[a-zA-Z0-9 ]{0,12}",
        any::<i64>(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn appended_chains_verify(facts in prop::collection::vec(fact(), 1..24)) {
        let ledger = Ledger::in_memory().unwrap();
        for (event_type, source, text, n) in &facts {
            let mut f = Fact::new("ws", *event_type)
                .task("T-1")
                .payload(json!({ "text": text, "n": n }));
            if let Some(source) = source {
                f = f.source(source.clone());
            }
            ledger.events.append_fact(f).unwrap();
        }

        let v = ledger.verify_workspace(&"ws".into()).unwrap();
        prop_assert!(v.valid);
        prop_assert_eq!(v.verified_count, facts.len());
    }

    #[test]
    fn payload_tamper_is_pinpointed(
        facts in prop::collection::vec(fact(), 1..16),
        pick in any::<prop::sample::Index>(),
    ) {
        let ledger = Ledger::in_memory().unwrap();
        for (event_type, _, text, n) in &facts {
            ledger
                .events
                .append_fact(Fact::new("ws", *event_type).payload(json!({ "text": text, "n": n })))
                .unwrap();
        }

        let mut events = ledger.events.store().list_workspace(&"ws".into()).unwrap();
        let victim = pick.index(events.len());
        events[victim].payload.insert("tampered".into(), json!(true));

        let v = verify_chain_integrity(&events);
        prop_assert_eq!(v.errors.len(), 1);
        prop_assert_eq!(v.errors[0].index, victim);
        prop_assert_eq!(v.errors[0].kind, ChainErrorKind::InvalidHash);
    }
}

use super::*;
use serde::Deserialize;
use serde_json::json;

#[derive(Default)]
struct Tally {
    total: i64,
    seen: Vec<String>,
}

#[derive(Deserialize)]
struct Add {
    amount: i64,
}

fn replayer() -> Replayer<Tally> {
    let mut replayer = Replayer::new();
    replayer.add_replay_handler("add", |tally: &mut Tally, data: &Value| {
        let Add { amount } = decode_payload("add", data)?;
        tally.total += amount;
        tally.seen.push("add".into());
        Ok(())
    });
    replayer.add_replay_handler("fail", |_: &mut Tally, _: &Value| {
        Err(ReplayError::MissingResource("brush `nope`".into()))
    });
    replayer
}

fn event(kind: &str, data: Value) -> RecordedEvent {
    RecordedEvent::new(kind, 0, data)
}

#[test]
fn dispatches_in_order_and_counts() {
    let mut tally = Tally::default();
    let summary = replayer().replay(&mut tally, &[event("add", json!({"amount": 2})), event("add", json!({"amount": 5}))]);
    assert_eq!(summary, ReplaySummary { applied: 2, skipped: 0 });
    assert_eq!(tally.total, 7);
}

#[test]
fn unknown_type_is_skipped_and_replay_continues() {
    let mut tally = Tally::default();
    let events = [event("add", json!({"amount": 1})), event("mystery", Value::Null), event("add", json!({"amount": 1}))];
    let summary = replayer().replay(&mut tally, &events);
    assert_eq!(summary, ReplaySummary { applied: 2, skipped: 1 });
    assert_eq!(tally.seen.len(), 2);
}

#[test]
fn bad_payload_and_handler_errors_are_skipped() {
    let mut tally = Tally::default();
    let events = [event("add", json!({"amount": "lots"})), event("fail", Value::Null)];
    let summary = replayer().replay(&mut tally, &events);
    assert_eq!(summary, ReplaySummary { applied: 0, skipped: 2 });
    assert_eq!(tally.total, 0);
}

#[test]
fn dispatch_reports_error_kind() {
    let mut tally = Tally::default();
    let err = replayer().dispatch(&mut tally, &event("nope", Value::Null)).expect_err("unknown");
    assert!(matches!(err, ReplayError::UnknownType(kind) if kind == "nope"));
    let err = replayer().dispatch(&mut tally, &event("add", Value::Null)).expect_err("payload");
    assert!(err.to_string().contains("`add`"));
}

#[test]
fn later_registration_replaces_handler() {
    let mut replayer = replayer();
    replayer.add_replay_handler("add", |tally: &mut Tally, _: &Value| {
        tally.total = -1;
        Ok(())
    });
    let mut tally = Tally::default();
    replayer.replay(&mut tally, &[event("add", json!({"amount": 3}))]);
    assert_eq!(tally.total, -1);
    assert_eq!(replayer.kinds(), ["add", "fail"]);
    assert!(replayer.has_handler("fail"));
}

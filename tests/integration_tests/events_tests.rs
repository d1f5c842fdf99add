use super::support::{lost, numbered};
use bson::doc;
use nexus_cursor::memory::StreamOp;
use nexus_cursor::utils::events;
use nexus_cursor::{RetryPolicy, telemetry};

#[test]
fn retry_cycle_emits_events_in_order() {
    let _sink = events::capture();
    let col = numbered(1);
    col.faults().fail_next(StreamOp::Advance, 1, lost("blip"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(1));
    cursor.to_vec().unwrap();

    let lines = events::drain();
    let names: Vec<String> = lines
        .iter()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["event"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["attempt_failed", "recreate", "exhausted"]);
    let recreate: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
    assert_eq!(recreate["ns"], "memory.people");
    assert_eq!(recreate["count"], 1);
}

#[test]
fn exhausted_retries_are_reported() {
    let _sink = events::capture();
    let col = numbered(1);
    col.faults().fail_always(StreamOp::Advance, lost("down"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(2));
    let before = telemetry::snapshot();
    assert!(cursor.get_next().is_err());
    let after = telemetry::snapshot();

    assert_eq!(events::count("attempt_failed"), 3);
    assert_eq!(events::count("recreate"), 2);
    assert_eq!(events::count("retries_exhausted"), 1);
    assert!(after.recreates_total >= before.recreates_total + 2);
    assert!(after.retries_exhausted_total > before.retries_exhausted_total);
    assert!(telemetry::metrics_text().contains("nexus_cursor_recreates_total"));
}

use super::support::{advances, ids, lost, numbered};
use bson::{Bson, doc};
use nexus_cursor::memory::StreamOp;
use nexus_cursor::{CursorError, CursorState, RetryPolicy};

#[test]
fn exhausted_retries_surface_the_first_failure() {
    let col = numbered(3);
    col.faults().fail_next(StreamOp::Advance, 1, lost("first"));
    col.faults().fail_always(StreamOp::Advance, CursorError::CursorNotFound("later".into()));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(3));

    let err = cursor.get_next().unwrap_err();
    assert_eq!(err, lost("first"));
    // bound 3: one attempt plus three retries, each retry on a fresh stream
    assert_eq!(advances(&col), 4);
    assert_eq!(col.journal().streams_opened(), 4);
    assert_eq!(cursor.recreate_count(), 3);
}

#[test]
fn zero_bound_behaves_like_a_plain_cursor() {
    let col = numbered(3);
    col.faults().fail_next(StreamOp::Advance, 1, lost("once"));
    let mut cursor = col.find(doc! {}).unwrap();
    assert_eq!(cursor.retry_bound(), 0);

    assert_eq!(cursor.get_next().unwrap_err(), lost("once"));
    assert_eq!(col.journal().streams_opened(), 1);
    assert_eq!(cursor.recreate_count(), 0);
    // the same stream keeps working once the fault is gone
    assert_eq!(cursor.get_next().unwrap().unwrap().id(), Some(&Bson::Int32(0)));
}

#[test]
fn transient_failure_recovers_within_bound() {
    let col = numbered(4);
    col.faults().fail_next(StreamOp::Advance, 2, lost("flaky"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(2));

    let first = cursor.get_next().unwrap().unwrap();
    assert_eq!(first.id(), Some(&Bson::Int32(0)));
    assert_eq!(cursor.recreate_count(), 2);
    assert_eq!(advances(&col), 3);
}

#[test]
fn permanent_failures_are_never_retried() {
    let col = numbered(3);
    col.faults().fail_always(StreamOp::Advance, CursorError::Unauthorized("no read role".into()));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(5));

    let err = cursor.get_next().unwrap_err();
    assert!(matches!(err, CursorError::Unauthorized(_)));
    assert!(!err.is_transient());
    assert_eq!(advances(&col), 1);
    assert_eq!(col.journal().streams_opened(), 1);
}

#[test]
fn malformed_query_is_permanent() {
    let col = numbered(3);
    let mut cursor = col.find(doc! {"n": {"$bogus": 1}}).unwrap().with_retry_policy(RetryPolicy::new(4));
    assert!(matches!(cursor.get_next(), Err(CursorError::MalformedQuery(_))));
    assert!(matches!(cursor.count(false), Err(CursorError::MalformedQuery(_))));
    assert_eq!(cursor.recreate_count(), 0);
}

#[test]
fn failing_recreate_consumes_an_attempt() {
    let col = numbered(2);
    col.faults().fail_next(StreamOp::Advance, 1, lost("advance"));
    col.faults().fail_next(StreamOp::Open, 1, lost("open"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(2));

    // attempt 0 fails on advance, attempt 1 fails while reopening, attempt 2 succeeds
    let rec = cursor.get_next().unwrap().unwrap();
    assert_eq!(rec.id(), Some(&Bson::Int32(0)));
    assert_eq!(cursor.recreate_count(), 1);
}

#[test]
fn recreate_failures_still_report_the_first_error() {
    let col = numbered(2);
    col.faults().fail_next(StreamOp::Advance, 1, lost("advance"));
    col.faults().fail_always(StreamOp::Open, lost("open"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(2));
    assert_eq!(cursor.get_next().unwrap_err(), lost("advance"));
    assert!(cursor.is_dead());
}

#[test]
fn dropped_source_stops_recovery() {
    let col = numbered(2);
    let faults = col.faults().clone();
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(3));
    drop(col);
    faults.fail_next(StreamOp::Advance, 1, lost("gone"));
    assert_eq!(cursor.get_next().unwrap_err(), CursorError::SourceDropped);
}

#[test]
fn count_and_explain_are_guarded() {
    let col = numbered(5);
    col.faults().fail_next(StreamOp::Count, 1, CursorError::CursorFailure { code: 43, message: "killed".into() });
    col.faults().fail_next(StreamOp::Explain, 1, lost("explain"));
    let mut cursor = col.find(doc! {"group": 1}).unwrap().with_retry_policy(RetryPolicy::new(1));

    assert_eq!(cursor.count(false).unwrap(), 2);
    let plan = cursor.explain().unwrap();
    assert_eq!(plan.get_i64("nReturned").unwrap(), 2);
    assert_eq!(cursor.recreate_count(), 2);
}

#[test]
fn materialization_restarts_from_the_beginning() {
    let col = numbered(5);
    col.faults().fail_after(StreamOp::Advance, 3, lost("mid-way"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(1));

    let all = cursor.to_vec().unwrap();
    assert_eq!(ids(&all), (0..5).map(Bson::Int32).collect::<Vec<_>>());
    assert_eq!(cursor.recreate_count(), 1);
}

#[test]
fn recreated_stream_yields_from_its_start() {
    let col = numbered(4);
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(1));
    assert_eq!(cursor.get_next().unwrap().unwrap().id(), Some(&Bson::Int32(0)));
    assert_eq!(cursor.get_next().unwrap().unwrap().id(), Some(&Bson::Int32(1)));

    col.faults().fail_next(StreamOp::Advance, 1, lost("drop"));
    // no fast-forward: already-seen records come back after a recreate
    assert_eq!(cursor.get_next().unwrap().unwrap().id(), Some(&Bson::Int32(0)));
}

#[test]
fn custom_classifier_controls_retry() {
    let col = numbered(2);
    col.faults().fail_next(StreamOp::Advance, 1, CursorError::Unauthorized("token expired".into()));
    let policy = RetryPolicy::new(1).with_classifier(|e| matches!(e, CursorError::Unauthorized(_)));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(policy);
    assert!(cursor.get_next().unwrap().is_some());
    assert_eq!(cursor.recreate_count(), 1);
}

#[test]
fn transient_failure_without_retries_invalidates_the_cursor() {
    let col = numbered(3);
    col.faults().fail_next(StreamOp::Advance, 1, lost("once"));
    let mut cursor = col.find(doc! {}).unwrap();
    assert_eq!(cursor.state(), CursorState::Configuring);

    assert_eq!(cursor.get_next().unwrap_err(), lost("once"));
    assert_eq!(cursor.state(), CursorState::Invalidated);
    assert_eq!(cursor.info().get_str("state").unwrap(), "Invalidated");

    assert_eq!(cursor.get_next().unwrap().unwrap().id(), Some(&Bson::Int32(0)));
    assert_eq!(cursor.state(), CursorState::Iterating);
}

#[test]
fn exhausted_retries_leave_the_cursor_invalidated() {
    let col = numbered(3);
    col.faults().fail_next(StreamOp::Advance, 3, lost("down"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(2));
    assert_eq!(cursor.get_next().unwrap_err(), lost("down"));
    assert_eq!(cursor.state(), CursorState::Invalidated);

    cursor.recreate().unwrap();
    assert_eq!(cursor.state(), CursorState::Configuring);
    assert_eq!(cursor.get_next().unwrap().unwrap().id(), Some(&Bson::Int32(0)));
}

#[test]
fn failed_count_before_reading_recovers_to_configuring() {
    let col = numbered(3);
    col.faults().fail_next(StreamOp::Count, 1, lost("count"));
    let mut cursor = col.find(doc! {}).unwrap();
    assert!(cursor.count(false).is_err());
    assert_eq!(cursor.state(), CursorState::Invalidated);
    // setters are still accepted while invalidated
    cursor.limit(2).unwrap();

    assert_eq!(cursor.count(true).unwrap(), 2);
    assert_eq!(cursor.state(), CursorState::Configuring);
}

#[test]
fn permanent_failure_does_not_invalidate() {
    let col = numbered(3);
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(2));
    cursor.skip(-1).unwrap();
    assert!(matches!(cursor.get_next(), Err(CursorError::MalformedQuery(_))));
    assert_eq!(cursor.state(), CursorState::Configuring);
}

use super::support::{lost, numbered};
use bson::{Bson, doc};
use nexus_cursor::memory::{MemoryCollection, StreamOp};
use nexus_cursor::{CursorError, CursorState, RetryPolicy, SortSpec};

#[test]
fn empty_stream_yields_none_and_restores_state() {
    let col = MemoryCollection::new("empty");
    let mut cursor = col.find(doc! {}).unwrap();
    cursor.set_use_identifier_keys(true);

    assert!(cursor.get_single_result().unwrap().is_none());
    assert_eq!(cursor.snapshot().limit_setting(), None);
    assert!(cursor.use_identifier_keys());
    assert_eq!(cursor.state(), CursorState::Configuring);
}

#[test]
fn single_element_is_returned() {
    let col = numbered(1);
    let mut cursor = col.find(doc! {}).unwrap();
    let rec = cursor.get_single_result().unwrap().unwrap();
    assert_eq!(rec.id(), Some(&Bson::Int32(0)));
}

#[test]
fn many_elements_yield_the_first_in_query_order() {
    let col = numbered(5);
    let mut cursor = col.find(doc! {}).unwrap();
    cursor.sort([SortSpec::desc("n")]).unwrap().limit(4).unwrap();
    cursor.set_use_identifier_keys(false);

    let rec = cursor.get_single_result().unwrap().unwrap();
    assert_eq!(rec.id(), Some(&Bson::Int32(4)));
    assert_eq!(cursor.snapshot().limit_setting(), Some(4));
    assert!(!cursor.use_identifier_keys());
    // the stream still honors the caller's limit afterwards
    assert_eq!(cursor.to_vec().unwrap().len(), 4);
}

#[test]
fn works_after_iteration_started() {
    let col = numbered(3);
    let mut cursor = col.find(doc! {}).unwrap();
    cursor.get_next().unwrap();
    cursor.get_next().unwrap();
    let rec = cursor.get_single_result().unwrap().unwrap();
    assert_eq!(rec.id(), Some(&Bson::Int32(0)));
    assert_eq!(cursor.snapshot().limit_setting(), None);
}

#[test]
fn failure_restores_limit_and_key_mode() {
    let col = numbered(3);
    col.faults().fail_always(StreamOp::Advance, lost("down"));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(2));
    cursor.limit(2).unwrap();

    assert_eq!(cursor.get_single_result().unwrap_err(), lost("down"));
    assert_eq!(cursor.snapshot().limit_setting(), Some(2));
    assert!(cursor.use_identifier_keys());

    col.faults().clear();
    assert_eq!(cursor.to_vec().unwrap().len(), 2);
}

#[test]
fn retried_single_result_replays_limit_one() {
    let col = numbered(3);
    col.faults().fail_next(StreamOp::Advance, 1, CursorError::CursorNotFound("reaped".into()));
    let mut cursor = col.find(doc! {}).unwrap().with_retry_policy(RetryPolicy::new(1));

    let rec = cursor.get_single_result().unwrap().unwrap();
    assert_eq!(rec.id(), Some(&Bson::Int32(0)));
    let replayed = col.journal().applied_names(1);
    assert!(replayed.iter().any(|n| n == "limit"));
    assert_eq!(cursor.snapshot().limit_setting(), None);
}

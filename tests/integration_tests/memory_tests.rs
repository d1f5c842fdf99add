use super::support::numbered;
use bson::{Bson, doc};
use nexus_cursor::cursor::{CursorOption, StreamHandle, StreamSource};
use nexus_cursor::memory::MemoryCollection;
use nexus_cursor::{CursorError, SortSpec};

#[test]
fn stream_refuses_options_once_the_query_ran() {
    let col = numbered(3);
    let mut stream = col.open_stream(&doc! {}, &doc! {}).unwrap();
    stream.apply(&CursorOption::Limit(2)).unwrap();
    assert!(stream.advance().unwrap().is_some());
    assert!(matches!(stream.apply(&CursorOption::Skip(1)), Err(CursorError::InvalidOperation(_))));

    stream.rewind();
    stream.apply(&CursorOption::Skip(1)).unwrap();
    assert_eq!(stream.advance().unwrap().unwrap().id(), Some(&Bson::Int32(1)));
    assert_eq!(stream.position(), 1);
}

#[test]
fn stream_reports_exhaustion_after_last_element() {
    let col = numbered(1);
    let mut stream = col.open_stream(&doc! {}, &doc! {}).unwrap();
    assert!(!stream.is_exhausted());
    assert!(stream.has_next().unwrap());
    stream.advance().unwrap();
    assert!(stream.is_exhausted());
    assert!(stream.peek().is_some());
    assert!(stream.advance().unwrap().is_none());
    assert!(stream.peek().is_none());
}

#[test]
fn filters_cover_common_operators() {
    let col = MemoryCollection::new("ops");
    col.insert_many([
        doc! {"_id": 1, "age": 17, "tags": "a", "addr": {"city": "Oslo"}},
        doc! {"_id": 2, "age": 30, "tags": "b"},
        doc! {"_id": 3, "age": 45, "addr": {"city": "Bergen"}},
    ]);
    let count = |filter| col.find(filter).unwrap().count(false).unwrap();

    assert_eq!(count(doc! {"age": {"$gt": 18}}), 2);
    assert_eq!(count(doc! {"addr.city": "Oslo"}), 1);
    assert_eq!(count(doc! {"tags": {"$exists": false}}), 1);
    assert_eq!(count(doc! {"_id": {"$in": [1, 3]}}), 2);
    assert_eq!(count(doc! {"_id": {"$nin": [1, 3]}}), 1);
    assert_eq!(count(doc! {"$or": [{"age": {"$lt": 18}}, {"age": {"$gte": 45}}]}), 2);
    assert_eq!(count(doc! {"$and": [{"age": {"$gt": 18}}, {"tags": "b"}]}), 1);
}

#[test]
fn sort_handles_nested_fields_and_ties() {
    let col = MemoryCollection::new("sorting");
    col.insert_many([
        doc! {"_id": 1, "p": {"rank": 2}, "name": "b"},
        doc! {"_id": 2, "p": {"rank": 1}, "name": "z"},
        doc! {"_id": 3, "p": {"rank": 2}, "name": "a"},
    ]);
    let mut cursor = col.find(doc! {}).unwrap();
    cursor.sort([SortSpec::asc("p.rank"), SortSpec::asc("name")]).unwrap();
    let ids: Vec<Bson> = cursor.to_vec().unwrap().iter().map(|r| r.id().cloned().unwrap()).collect();
    assert_eq!(ids, vec![Bson::Int32(2), Bson::Int32(3), Bson::Int32(1)]);
}

#[test]
fn stream_info_reflects_applied_options() {
    let col = numbered(2);
    let mut stream = col.open_stream(&doc! {}, &doc! {}).unwrap();
    stream.apply(&CursorOption::BatchSize(10)).unwrap();
    stream.apply(&CursorOption::Tailable(true)).unwrap();
    stream.apply(&CursorOption::Extra("comment".into(), Bson::String("x".into()))).unwrap();
    let info = stream.info();
    assert_eq!(info.get_i32("batchSize").unwrap(), 10);
    let settings = info.get_document("settings").unwrap();
    assert!(settings.get_bool("tailable").unwrap());
    assert_eq!(settings.get_str("comment").unwrap(), "x");
    assert!(!info.get_bool("started").unwrap());
}

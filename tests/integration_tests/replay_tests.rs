use super::support::{lost, numbered};
use bson::{Bson, doc};
use nexus_cursor::cursor::{Capabilities, CursorOption, Hint};
use nexus_cursor::memory::{MemoryCollection, StreamCall, StreamOp};
use nexus_cursor::{ReadTargetKind, RetryPolicy, SortSpec};

fn configured(col: &std::sync::Arc<MemoryCollection>) -> nexus_cursor::ResilientCursor {
    let mut cursor = col.find(doc! {"n": {"$gte": 1}}).unwrap().with_retry_policy(RetryPolicy::new(3));
    cursor
        .timeout(900)
        .unwrap()
        .sort([SortSpec::desc("n")])
        .unwrap()
        .add_option("comment", "nightly")
        .unwrap()
        .skip(1)
        .unwrap()
        .limit(3)
        .unwrap()
        .hint("n_1")
        .unwrap()
        .batch_size(2)
        .unwrap()
        .set_read_target(ReadTargetKind::Nearest, vec![doc! {"dc": "east"}])
        .unwrap()
        .secondary_ok(true)
        .unwrap()
        .no_cursor_timeout(true)
        .unwrap()
        .max_time_ms(5_000)
        .unwrap();
    cursor
}

#[test]
fn recreate_replays_every_option_before_the_retried_call() {
    let col = numbered(8);
    let mut cursor = configured(&col);
    col.journal().clear();
    col.faults().fail_next(StreamOp::Advance, 1, lost("reset by peer"));

    let first = cursor.get_next().unwrap().unwrap();
    assert_eq!(first.id(), Some(&Bson::Int32(6)));
    assert_eq!(cursor.recreate_count(), 1);

    let names = col.journal().applied_names(1);
    assert_eq!(
        names,
        vec![
            "hint",
            "noCursorTimeout",
            "comment",
            "batchSize",
            "limit",
            "skip",
            "maxTimeMS",
            "secondaryOk",
            "readPreference",
            "sort",
            "timeout",
        ]
    );
    assert_eq!(col.journal().applied(1), cursor.snapshot().replay());

    // every replayed option lands between the reopen and the retried advance
    let calls = col.journal().calls();
    let open = calls.iter().position(|c| *c == StreamCall::Open { stream: 1 }).unwrap();
    let advance = calls.iter().position(|c| *c == StreamCall::Advance { stream: 1 }).unwrap();
    let applies = calls
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, StreamCall::Apply { stream: 1, .. }))
        .map(|(i, _)| i)
        .collect::<Vec<_>>();
    assert_eq!(applies.len(), names.len());
    assert!(applies.iter().all(|i| *i > open && *i < advance));
}

#[test]
fn replay_is_identical_across_recreates() {
    let col = numbered(8);
    let mut cursor = configured(&col);
    col.faults().fail_next(StreamOp::Advance, 2, lost("flap"));
    cursor.get_next().unwrap();
    cursor.recreate().unwrap();

    let journal = col.journal();
    assert_eq!(journal.streams_opened(), 4);
    assert_eq!(journal.applied(1), journal.applied(2));
    assert_eq!(journal.applied(2), journal.applied(3));
}

#[test]
fn secondary_flag_after_structured_target_replays_the_override() {
    let col = numbered(2);
    let mut cursor = col.find(doc! {}).unwrap();
    cursor.set_read_target(ReadTargetKind::Nearest, vec![doc! {"dc": "east"}]).unwrap();
    cursor.secondary_ok(false).unwrap();
    cursor.recreate().unwrap();

    let replayed = col.journal().applied(1);
    assert_eq!(replayed[0], CursorOption::SecondaryOk(false));
    match &replayed[1] {
        CursorOption::ReadTarget(t) => assert_eq!(t.kind, ReadTargetKind::Primary),
        other => panic!("expected read target, got {other:?}"),
    }
    assert!(!cursor.is_secondary_ok());
}

#[test]
fn secondary_flag_reaches_the_live_stream_before_any_recreate() {
    let col = numbered(2);
    let mut cursor = col.find(doc! {}).unwrap();
    cursor.set_read_target(ReadTargetKind::Nearest, vec![doc! {"dc": "east"}]).unwrap();
    cursor.secondary_ok(false).unwrap();

    let stored = cursor.snapshot().read_target().unwrap().to_document();
    assert_eq!(stored.get_str("mode").unwrap(), "primary");
    let info = cursor.info();
    let settings = info.get_document("stream").unwrap().get_document("settings").unwrap();
    assert_eq!(settings.get_document("readPreference").unwrap(), &stored);
    assert!(!settings.get_bool("secondaryOk").unwrap());
    assert_eq!(col.journal().streams_opened(), 1);
}

#[test]
fn unsupported_capabilities_degrade_on_every_apply() {
    let caps = Capabilities { structured_read_target: false, max_time: false };
    let col = MemoryCollection::with_capabilities("legacy", caps);
    col.insert(doc! {"_id": 1});
    let mut cursor = col.find(doc! {}).unwrap();
    cursor
        .set_read_target(ReadTargetKind::SecondaryPreferred, vec![])
        .unwrap()
        .max_time_ms(100)
        .unwrap();
    assert_eq!(col.journal().applied(0), vec![CursorOption::SecondaryOk(true)]);

    cursor.recreate().unwrap();
    assert_eq!(col.journal().applied(1), vec![CursorOption::SecondaryOk(true)]);
    // still recorded locally
    assert_eq!(cursor.snapshot().max_time_ms(), Some(100));
    assert_eq!(cursor.capabilities(), caps);
}

#[test]
fn projection_set_later_reopens_with_it() {
    let col = numbered(2);
    let mut cursor = col.find(doc! {}).unwrap();
    cursor.fields(doc! {"name": 1, "_id": 0}).unwrap().hint_keys(doc! {"name": 1}).unwrap();
    cursor.recreate().unwrap();

    assert_eq!(col.journal().applied(1), vec![CursorOption::Hint(Hint::Keys(doc! {"name": 1}))]);
    assert_eq!(cursor.get_next().unwrap().unwrap().document(), doc! {"name": "user-0"});
}

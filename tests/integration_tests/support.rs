use bson::{Bson, doc};
use nexus_cursor::CursorError;
use nexus_cursor::memory::{MemoryCollection, StreamCall};
use std::sync::Arc;

/// Collection with `n` documents `{_id: i, n: i, name: "user-i", group: i % 3}`.
pub fn numbered(n: i32) -> Arc<MemoryCollection> {
    let col = MemoryCollection::new("people");
    for i in 0..n {
        col.insert(doc! {"_id": i, "n": i, "name": format!("user-{i}"), "group": i % 3});
    }
    col
}

pub fn lost(tag: &str) -> CursorError {
    CursorError::ConnectionLost(tag.to_string())
}

pub fn advances(col: &MemoryCollection) -> usize {
    col.journal().calls().iter().filter(|c| matches!(c, StreamCall::Advance { .. })).count()
}

pub fn ids(records: &[nexus_cursor::Record]) -> Vec<Bson> {
    records.iter().map(|r| r.id().cloned().unwrap_or(Bson::Null)).collect()
}

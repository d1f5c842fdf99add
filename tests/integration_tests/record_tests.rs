use bson::{Bson, doc};
use nexus_cursor::cursor::RESERVED_FILE_FIELD;
use nexus_cursor::memory::MemoryCollection;
use nexus_cursor::{CursorError, Record, StoredFile};

#[test]
fn plain_and_file_records_share_one_shape() {
    let col = MemoryCollection::new("mixed");
    col.insert(doc! {"_id": "doc-1", "kind": "report"});
    col.put_file("report.pdf", vec![1, 2, 3, 4], doc! {"_id": "file-1", "kind": "report"});

    let mut cursor = col.find(doc! {"kind": "report"}).unwrap();
    let records = cursor.to_vec().unwrap();
    assert_eq!(records.len(), 2);

    let plain = &records[0];
    assert!(!plain.is_file());
    assert_eq!(plain.document(), doc! {"_id": "doc-1", "kind": "report"});

    let file = &records[1];
    assert!(file.is_file());
    assert_eq!(file.id(), Some(&Bson::String("file-1".into())));
    let shaped = file.document();
    let descriptor = shaped.get_document(RESERVED_FILE_FIELD).unwrap();
    assert!(descriptor.get_bool("stored").unwrap());
    assert_eq!(descriptor.get_i64("length").unwrap(), 4);
    assert_eq!(shaped.get_str("filename").unwrap(), "report.pdf");
}

#[test]
fn file_content_can_be_written_out() {
    let col = MemoryCollection::new("fs");
    col.put_file("hello.txt", b"hello, world".to_vec(), doc! {});
    let mut cursor = col.find(doc! {"filename": "hello.txt"}).unwrap();
    let rec = cursor.get_single_result().unwrap().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("hello.txt");
    let written = rec.file().unwrap().write_to(&out).unwrap();
    assert_eq!(written, 12);
    assert_eq!(std::fs::read(&out).unwrap(), b"hello, world");
}

#[test]
fn writing_an_empty_file_is_a_misuse() {
    let dir = tempfile::tempdir().unwrap();
    let err = StoredFile::empty().write_to(&dir.path().join("x")).unwrap_err();
    assert!(matches!(err, CursorError::InvalidOperation(_)));
    assert!(!err.is_transient());
    assert!(!dir.path().join("x").exists());
}

#[test]
fn in_memory_files_wrap_bytes() {
    let rec = Record::File { metadata: doc! {"_id": 9}, file: StoredFile::from_bytes(vec![7; 3]) };
    assert_eq!(rec.file().unwrap().bytes().unwrap(), vec![7, 7, 7]);
    let shaped = rec.into_document();
    assert!(!shaped.get_document(RESERVED_FILE_FIELD).unwrap().get_bool("stored").unwrap());
}

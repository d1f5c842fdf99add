use bson::{Bson, Document};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::faults::{CallJournal, FaultPlan, StreamCall, StreamOp};
use super::stream::MemoryStream;
use crate::cursor::{
    Capabilities, ID_FIELD, LargeObject, ReadTarget, ReadTargetTranslator, ResilientCursor, StreamHandle,
    StreamSource,
};
use crate::errors::Result;

/// A stored file: its metadata record and content.
#[derive(Debug)]
pub struct MemoryFile {
    metadata: Document,
    data: Vec<u8>,
}

impl LargeObject for MemoryFile {
    fn metadata(&self) -> &Document {
        &self.metadata
    }

    fn read_all(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Entry {
    Doc(Document),
    File(Arc<MemoryFile>),
}

impl Entry {
    /// The document filters and sorts see: the record itself, or a file's metadata.
    pub(crate) fn document(&self) -> &Document {
        match self {
            Self::Doc(d) => d,
            Self::File(f) => &f.metadata,
        }
    }
}

fn new_id() -> Bson {
    Bson::String(uuid::Uuid::new_v4().to_string())
}

/// In-process collection that serves cursors through the memory transport.
///
/// Documents and files share one ordered store; insertion order is natural order.
pub struct MemoryCollection {
    name: String,
    entries: Arc<RwLock<Vec<Entry>>>,
    read_target: RwLock<ReadTarget>,
    capabilities: Capabilities,
    faults: FaultPlan,
    journal: CallJournal,
    next_stream: AtomicUsize,
}

impl std::fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl MemoryCollection {
    #[must_use]
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_capabilities(name, Capabilities::default())
    }

    #[must_use]
    pub fn with_capabilities(name: &str, capabilities: Capabilities) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            entries: Arc::new(RwLock::new(Vec::new())),
            read_target: RwLock::new(ReadTarget::primary()),
            capabilities,
            faults: FaultPlan::default(),
            journal: CallJournal::default(),
            next_stream: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a document, assigning a UUID `_id` when it has none. Returns the `_id`.
    pub fn insert(&self, mut doc: Document) -> Bson {
        let id = match doc.get(ID_FIELD) {
            Some(id) => id.clone(),
            None => {
                let id = new_id();
                doc.insert(ID_FIELD, id.clone());
                id
            }
        };
        self.entries.write().push(Entry::Doc(doc));
        id
    }

    pub fn insert_many<I>(&self, docs: I) -> Vec<Bson>
    where
        I: IntoIterator<Item = Document>,
    {
        docs.into_iter().map(|d| self.insert(d)).collect()
    }

    /// Store a file. Its record gets `_id`, `filename`, `length` and `uploadDate`
    /// on top of the caller's metadata.
    pub fn put_file(&self, filename: &str, data: Vec<u8>, metadata: Document) -> Bson {
        let id = metadata.get(ID_FIELD).cloned().unwrap_or_else(new_id);
        let mut record = Document::new();
        record.insert(ID_FIELD, id.clone());
        record.insert("filename", filename);
        record.insert("length", i64::try_from(data.len()).unwrap_or(i64::MAX));
        record.insert("uploadDate", bson::DateTime::from_millis(chrono::Utc::now().timestamp_millis()));
        for (k, v) in metadata {
            if k != ID_FIELD {
                record.insert(k, v);
            }
        }
        log::debug!("{}: stored file '{filename}' ({} bytes)", self.name, data.len());
        self.entries.write().push(Entry::File(Arc::new(MemoryFile { metadata: record, data })));
        id
    }

    /// Read target that cursors opened here inherit.
    pub fn set_read_target(&self, target: ReadTarget) {
        *self.read_target.write() = target;
    }

    /// Legacy switch for the collection-level read target.
    pub fn set_secondary_ok(&self, allow: bool) {
        let mut target = self.read_target.write();
        let next = ReadTargetTranslator::set_legacy(&target, allow);
        *target = next;
    }

    #[must_use]
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    #[must_use]
    pub fn journal(&self) -> &CallJournal {
        &self.journal
    }

    /// Open a cursor over documents matching `filter`.
    pub fn find(self: &Arc<Self>, filter: Document) -> Result<ResilientCursor> {
        self.find_with_projection(filter, Document::new())
    }

    pub fn find_with_projection(self: &Arc<Self>, filter: Document, projection: Document) -> Result<ResilientCursor> {
        let source: Arc<dyn StreamSource> = self.clone();
        ResilientCursor::open(&source, filter, projection)
    }
}

impl StreamSource for MemoryCollection {
    fn namespace(&self) -> String {
        format!("memory.{}", self.name)
    }

    fn open_stream(&self, filter: &Document, projection: &Document) -> Result<Box<dyn StreamHandle>> {
        self.faults.check(StreamOp::Open)?;
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        self.journal.record(StreamCall::Open { stream: id });
        Ok(Box::new(MemoryStream::new(
            id,
            self.namespace(),
            Arc::clone(&self.entries),
            self.faults.clone(),
            self.journal.clone(),
            filter.clone(),
            projection.clone(),
        )))
    }

    fn read_target(&self) -> ReadTarget {
        self.read_target.read().clone()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

use crate::errors::{CursorError, Result};
use bson::{Bson, Document, doc};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Field under which a file record exposes its wrapped file descriptor.
pub const RESERVED_FILE_FIELD: &str = "file";
/// Identifier field used for identifier-keyed positions.
pub const ID_FIELD: &str = "_id";

/// A large object stored server-side (e.g. a chunked file) that a transport can return.
pub trait LargeObject: Send + Sync + fmt::Debug {
    /// The file's record: `_id`, `filename`, `length`, user metadata.
    fn metadata(&self) -> &Document;
    /// Fetch the full content.
    fn read_all(&self) -> Result<Vec<u8>>;
}

/// An element exactly as a transport hands it over.
#[derive(Debug, Clone)]
pub enum RawElement {
    Document(Document),
    File(Arc<dyn LargeObject>),
}

impl RawElement {
    #[must_use]
    pub fn id(&self) -> Option<&Bson> {
        match self {
            Self::Document(d) => d.get(ID_FIELD),
            Self::File(f) => f.metadata().get(ID_FIELD),
        }
    }
}

#[derive(Debug, Clone)]
enum FileSource {
    Stored(Arc<dyn LargeObject>),
    Bytes(Vec<u8>),
    Empty,
}

/// File value handed to callers in place of a raw large-object handle.
#[derive(Debug, Clone)]
pub struct StoredFile {
    source: FileSource,
}

impl StoredFile {
    #[must_use]
    pub fn from_handle(handle: Arc<dyn LargeObject>) -> Self {
        Self { source: FileSource::Stored(handle) }
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { source: FileSource::Bytes(bytes) }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self { source: FileSource::Empty }
    }

    #[must_use]
    pub fn has_content(&self) -> bool {
        !matches!(self.source, FileSource::Empty)
    }

    /// Length as advertised by the store, or the in-memory length.
    #[must_use]
    pub fn len_hint(&self) -> Option<u64> {
        match &self.source {
            FileSource::Stored(h) => match h.metadata().get("length") {
                Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
                Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
                _ => None,
            },
            FileSource::Bytes(b) => Some(b.len() as u64),
            FileSource::Empty => None,
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>> {
        match &self.source {
            FileSource::Stored(h) => h.read_all(),
            FileSource::Bytes(b) => Ok(b.clone()),
            FileSource::Empty => {
                Err(CursorError::InvalidOperation("file has no content to read".into()))
            }
        }
    }

    /// Write the content to `path`, returning the number of bytes written.
    pub fn write_to(&self, path: &Path) -> Result<u64> {
        if !self.has_content() {
            return Err(CursorError::InvalidOperation("nothing to write: file has no content".into()));
        }
        let bytes = self.bytes()?;
        std::fs::write(path, &bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Summary stored under [`RESERVED_FILE_FIELD`] in the uniform record shape.
    #[must_use]
    pub fn descriptor(&self) -> Document {
        let mut d = doc! {
            "stored": matches!(self.source, FileSource::Stored(_)),
            "hasContent": self.has_content(),
        };
        if let Some(len) = self.len_hint() {
            d.insert("length", i64::try_from(len).unwrap_or(i64::MAX));
        }
        d
    }
}

/// A record yielded by the cursor.
///
/// Resolved once, where the transport result is received; callers use the same
/// accessors for both shapes.
#[derive(Debug, Clone)]
pub enum Record {
    Plain(Document),
    File { metadata: Document, file: StoredFile },
}

impl Record {
    #[must_use]
    pub fn from_raw(raw: RawElement) -> Self {
        match raw {
            RawElement::Document(d) => Self::Plain(d),
            RawElement::File(handle) => Self::File {
                metadata: handle.metadata().clone(),
                file: StoredFile::from_handle(handle),
            },
        }
    }

    /// Uniform document shape: file records are their metadata plus a `file` field.
    #[must_use]
    pub fn document(&self) -> Document {
        match self {
            Self::Plain(d) => d.clone(),
            Self::File { metadata, file } => {
                let mut d = metadata.clone();
                d.insert(RESERVED_FILE_FIELD, file.descriptor());
                d
            }
        }
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        match self {
            Self::Plain(d) => d,
            other => other.document(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bson> {
        match self {
            Self::Plain(d) => d.get(key),
            Self::File { metadata, .. } => metadata.get(key),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<&Bson> {
        self.get(ID_FIELD)
    }

    #[must_use]
    pub fn file(&self) -> Option<&StoredFile> {
        match self {
            Self::File { file, .. } => Some(file),
            Self::Plain(_) => None,
        }
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }
}

//! Boundary to the wire/transport layer.
//!
//! The cursor never talks to a server directly: it asks a [`StreamSource`] (the
//! owning collection) for a [`StreamHandle`] and drives that handle.

use crate::cursor::options::CursorOption;
use crate::cursor::read_target::ReadTarget;
use crate::cursor::record::RawElement;
use crate::errors::Result;
use bson::Document;

/// What the server/driver behind a source can do, resolved once by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Accepts structured read targets; otherwise they degrade to the legacy flag.
    pub structured_read_target: bool,
    /// Accepts `maxTimeMS`; otherwise the option is recorded but not sent.
    pub max_time: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { structured_read_target: true, max_time: true }
    }
}

/// A live server-side cursor.
///
/// `position` is the number of elements advanced past so far; `peek` returns the
/// element the last `advance` produced.
pub trait StreamHandle: Send {
    fn advance(&mut self) -> Result<Option<RawElement>>;
    fn has_next(&mut self) -> Result<bool>;
    fn peek(&self) -> Option<RawElement>;
    fn is_exhausted(&self) -> bool;
    fn position(&self) -> usize;
    /// Back to before the first element; the next pull re-runs the query.
    fn rewind(&mut self);
    fn count(&mut self, found_only: bool) -> Result<u64>;
    fn explain(&mut self) -> Result<Document>;
    fn info(&self) -> Document;
    /// Single entry point for every option setter.
    fn apply(&mut self, option: &CursorOption) -> Result<()>;
}

/// Something that can open streams: the owning collection.
pub trait StreamSource: Send + Sync {
    fn namespace(&self) -> String;
    fn open_stream(&self, filter: &Document, projection: &Document) -> Result<Box<dyn StreamHandle>>;

    /// Read target cursors inherit when they set none of their own.
    fn read_target(&self) -> ReadTarget {
        ReadTarget::primary()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }
}

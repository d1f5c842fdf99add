//! Resilient client-side query cursor.
//!
//! A [`ResilientCursor`] drives a server-side stream opened from a
//! [`StreamSource`]. Every option set on the cursor is recorded so that, when a
//! transient failure kills the stream, a new one can be opened and configured
//! identically before the failed operation is retried under a bounded
//! [`RetryPolicy`].
//!
//! The [`memory`] module provides an in-process transport with fault injection.

pub mod config;
pub mod cursor;
pub mod errors;
pub mod memory;
pub mod telemetry;
pub mod utils;

pub use config::CursorConfig;
pub use cursor::{
    ConfigurationSnapshot, CursorOption, CursorState, Order, ReadTarget, ReadTargetKind, ReadTargetTranslator, Record,
    RecordKey, Records, ResilientCursor, RetryPolicy, SortSpec, StoredFile, StreamHandle, StreamSource,
};
pub use errors::{CursorError, Result};

/// Initialize logging from `NEXUS_CURSOR_*` environment variables.
///
/// Only the first call installs a logger; later ones report the failure on stderr.
pub fn init() {
    if let Err(e) = utils::logger::configure_from_env() {
        eprintln!("nexus_cursor: logging not initialized: {e}");
    }
}

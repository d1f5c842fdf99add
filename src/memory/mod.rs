//! In-memory reference transport.
//!
//! Implements [`StreamSource`](crate::cursor::StreamSource) and
//! [`StreamHandle`](crate::cursor::StreamHandle) over a vector of BSON documents
//! and files, with filter evaluation, sort, skip, limit, projection, a call
//! journal and scripted fault injection. Used by the tests and the demo binary.

mod collection;
pub mod eval;
mod faults;
pub mod filter;
mod stream;

pub use collection::{MemoryCollection, MemoryFile};
pub use faults::{CallJournal, FaultPlan, StreamCall, StreamOp};
pub use filter::{CmpOp, Filter, parse_filter};
pub use stream::MemoryStream;

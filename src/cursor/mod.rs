// Submodules for separation of concerns
mod options;
mod read_target;
mod record;
mod resilient;
mod retry;
mod transport;

pub use options::{ConfigurationSnapshot, CursorOption, Hint, Order, SortSpec};
pub use read_target::{ReadTarget, ReadTargetKind, ReadTargetTranslator};
pub use record::{ID_FIELD, LargeObject, RESERVED_FILE_FIELD, RawElement, Record, StoredFile};
pub use resilient::{CursorState, RecordKey, Records, ResilientCursor};
pub use retry::{Classifier, Recreate, RetryPolicy};
pub use transport::{Capabilities, StreamHandle, StreamSource};

use crate::config::CursorConfig;
use crate::cursor::options::{ConfigurationSnapshot, CursorOption, Hint, SortSpec};
use crate::cursor::read_target::{ReadTarget, ReadTargetKind, ReadTargetTranslator};
use crate::cursor::record::{RawElement, Record};
use crate::cursor::retry::{Recreate, RetryPolicy};
use crate::cursor::transport::{Capabilities, StreamHandle, StreamSource};
use crate::errors::{CursorError, Result};
use crate::telemetry;
use bson::{Bson, Document, doc};
use std::fmt;
use std::sync::{Arc, Weak};

/// Where a cursor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Nothing read since creation or the last reset; options may change.
    Configuring,
    Iterating,
    /// The stream reported its end.
    Exhausted,
    /// A guarded operation failed transiently, or a recreate is in progress.
    /// The next successful read or recreate leaves this state.
    Invalidated,
}

/// Key of the current element.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKey {
    Id(Bson),
    Ordinal(usize),
}

/// A forward-only query cursor that survives transient failures.
///
/// Options are set through chainable setters (`cursor.limit(10)?.skip(5)?`);
/// each one is applied to the live stream and recorded in a
/// [`ConfigurationSnapshot`]. Operations that reach the server run under the
/// cursor's [`RetryPolicy`]: on a transient failure the stream is discarded, a
/// new one is opened from the owning source and the snapshot is replayed onto
/// it before the next attempt.
///
/// A recreated stream starts from the beginning. Records consumed before the
/// failure are yielded again unless the caller advanced `skip` itself.
pub struct ResilientCursor {
    source: Weak<dyn StreamSource>,
    namespace: String,
    handle: Option<Box<dyn StreamHandle>>,
    snapshot: ConfigurationSnapshot,
    retry: RetryPolicy,
    capabilities: Capabilities,
    use_identifier_keys: bool,
    state: CursorState,
    recreates: u64,
}

impl fmt::Debug for ResilientCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientCursor")
            .field("namespace", &self.namespace)
            .field("state", &self.state)
            .field("retry", &self.retry)
            .field("use_identifier_keys", &self.use_identifier_keys)
            .field("recreates", &self.recreates)
            .finish_non_exhaustive()
    }
}

/// Push one option to a live stream, honoring the source's capabilities.
fn apply_option(handle: &mut dyn StreamHandle, option: &CursorOption, caps: Capabilities) -> Result<()> {
    match option {
        CursorOption::ReadTarget(target) if !caps.structured_read_target => {
            let legacy = ReadTargetTranslator::to_legacy_boolean(target);
            log::debug!("structured read target unsupported, sending secondaryOk={legacy}");
            handle.apply(&CursorOption::SecondaryOk(legacy))
        }
        CursorOption::MaxTimeMs(ms) if !caps.max_time => {
            log::debug!("maxTimeMS={ms} recorded but not sent: unsupported by source");
            Ok(())
        }
        other => handle.apply(other),
    }
}

impl ResilientCursor {
    /// Open a cursor on `source` for `filter` and `projection`.
    ///
    /// Only a weak reference to the source is kept; it is upgraded for the
    /// duration of each recreate.
    pub fn open(source: &Arc<dyn StreamSource>, filter: Document, projection: Document) -> Result<Self> {
        let handle = source.open_stream(&filter, &projection)?;
        Ok(Self {
            source: Arc::downgrade(source),
            namespace: source.namespace(),
            handle: Some(handle),
            snapshot: ConfigurationSnapshot::new(filter, projection),
            retry: RetryPolicy::default(),
            capabilities: source.capabilities(),
            use_identifier_keys: true,
            state: CursorState::Configuring,
            recreates: 0,
        })
    }

    /// Take retry bound and key mode from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &CursorConfig) -> Self {
        self.retry = config.retry_policy();
        self.use_identifier_keys = config.use_identifier_keys;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    // ---- accessors -------------------------------------------------------

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
    #[must_use]
    pub fn state(&self) -> CursorState {
        self.state
    }
    #[must_use]
    pub fn snapshot(&self) -> &ConfigurationSnapshot {
        &self.snapshot
    }
    #[must_use]
    pub fn filter(&self) -> &Document {
        self.snapshot.filter()
    }
    #[must_use]
    pub fn projection(&self) -> &Document {
        self.snapshot.projection()
    }
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
    #[must_use]
    pub fn retry_bound(&self) -> u32 {
        self.retry.bound()
    }
    pub fn set_retry_bound(&mut self, bound: u32) -> &mut Self {
        self.retry.set_bound(bound);
        self
    }
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
    /// Number of times the stream has been rebuilt.
    #[must_use]
    pub fn recreate_count(&self) -> u64 {
        self.recreates
    }
    #[must_use]
    pub fn use_identifier_keys(&self) -> bool {
        self.use_identifier_keys
    }
    pub fn set_use_identifier_keys(&mut self, enabled: bool) -> &mut Self {
        self.use_identifier_keys = enabled;
        self
    }

    /// Effective read target: own structured target, else own legacy flag applied
    /// to the source's target, else the source's target.
    #[must_use]
    pub fn read_target(&self) -> ReadTarget {
        let inherited = self.source.upgrade().map(|s| s.read_target()).unwrap_or_default();
        ReadTargetTranslator::resolve(self.snapshot.secondary_ok(), self.snapshot.read_target(), &inherited)
    }

    /// Legacy view of [`Self::read_target`].
    #[must_use]
    pub fn is_secondary_ok(&self) -> bool {
        ReadTargetTranslator::to_legacy_boolean(&self.read_target())
    }

    // ---- configuration -----------------------------------------------------

    fn configure(&mut self, option: CursorOption) -> Result<&mut Self> {
        if matches!(self.state, CursorState::Iterating | CursorState::Exhausted) {
            return Err(CursorError::AlreadyIterating(option.name().to_string()));
        }
        self.configure_unchecked(option)?;
        Ok(self)
    }

    fn configure_unchecked(&mut self, option: CursorOption) -> Result<()> {
        // The legacy flag rewrites a stored structured target; the live stream must see it too.
        let derived = match &option {
            CursorOption::SecondaryOk(allow) => self
                .snapshot
                .read_target()
                .map(|t| CursorOption::ReadTarget(ReadTargetTranslator::set_legacy(t, *allow))),
            _ => None,
        };
        if let Some(handle) = self.handle.as_mut() {
            apply_option(handle.as_mut(), &option, self.capabilities)?;
            if let Some(derived) = &derived {
                apply_option(handle.as_mut(), derived, self.capabilities)?;
            }
        }
        log::debug!("{}: set {} = {:?}", self.namespace, option.name(), option);
        self.snapshot.set(option);
        Ok(())
    }

    /// Set any option by its value.
    pub fn set_option(&mut self, option: CursorOption) -> Result<&mut Self> {
        self.configure(option)
    }

    /// Pass a server option this layer has no dedicated setter for.
    pub fn add_option(&mut self, name: &str, value: impl Into<Bson>) -> Result<&mut Self> {
        self.configure(CursorOption::parse(name, &value.into())?)
    }

    pub fn fields(&mut self, projection: Document) -> Result<&mut Self> {
        self.configure(CursorOption::Projection(projection))
    }

    pub fn hint(&mut self, index: impl Into<String>) -> Result<&mut Self> {
        self.configure(CursorOption::Hint(Hint::Name(index.into())))
    }

    pub fn hint_keys(&mut self, keys: Document) -> Result<&mut Self> {
        self.configure(CursorOption::Hint(Hint::Keys(keys)))
    }

    pub fn return_key_only(&mut self, enabled: bool) -> Result<&mut Self> {
        self.configure(CursorOption::ReturnKeyOnly(enabled))
    }

    pub fn allow_partial_results(&mut self, enabled: bool) -> Result<&mut Self> {
        self.configure(CursorOption::AllowPartialResults(enabled))
    }

    /// Ask the server never to time out the cursor while idle.
    pub fn no_cursor_timeout(&mut self, enabled: bool) -> Result<&mut Self> {
        self.configure(CursorOption::NoCursorTimeout(enabled))
    }

    pub fn batch_size(&mut self, n: i32) -> Result<&mut Self> {
        self.configure(CursorOption::BatchSize(n))
    }

    pub fn limit(&mut self, n: i64) -> Result<&mut Self> {
        self.configure(CursorOption::Limit(n))
    }

    pub fn skip(&mut self, n: i64) -> Result<&mut Self> {
        self.configure(CursorOption::Skip(n))
    }

    pub fn max_time_ms(&mut self, ms: i64) -> Result<&mut Self> {
        self.configure(CursorOption::MaxTimeMs(ms))
    }

    /// Legacy "allow secondary reads" switch.
    pub fn secondary_ok(&mut self, allow: bool) -> Result<&mut Self> {
        self.configure(CursorOption::SecondaryOk(allow))
    }

    pub fn set_read_target(&mut self, kind: ReadTargetKind, tag_sets: Vec<Document>) -> Result<&mut Self> {
        let target = ReadTarget::new(kind, tag_sets)?;
        self.configure(CursorOption::ReadTarget(target))
    }

    pub fn snapshot_mode(&mut self, enabled: bool) -> Result<&mut Self> {
        self.configure(CursorOption::Snapshot(enabled))
    }

    pub fn sort(&mut self, specs: impl IntoIterator<Item = SortSpec>) -> Result<&mut Self> {
        self.configure(CursorOption::Sort(specs.into_iter().collect()))
    }

    pub fn tailable(&mut self, enabled: bool) -> Result<&mut Self> {
        self.configure(CursorOption::Tailable(enabled))
    }

    /// Client-side timeout in milliseconds, passed to the transport.
    pub fn timeout(&mut self, ms: i64) -> Result<&mut Self> {
        self.configure(CursorOption::Timeout(ms))
    }

    // ---- lifecycle -----------------------------------------------------------

    /// Back to the pre-iteration position. Configuration is kept.
    pub fn reset(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            handle.rewind();
        }
        if self.state != CursorState::Invalidated {
            self.state = CursorState::Configuring;
        }
    }

    /// Reset and return the first record.
    pub fn rewind(&mut self) -> Result<Option<Record>> {
        self.reset();
        self.get_next()
    }

    /// Discard the stream, open a new one and replay every option onto it.
    pub fn recreate(&mut self) -> Result<()> {
        self.handle = None;
        self.state = CursorState::Invalidated;
        let source = self.source.upgrade().ok_or(CursorError::SourceDropped)?;
        let mut handle = source.open_stream(self.snapshot.filter(), self.snapshot.projection())?;
        drop(source);
        let caps = self.capabilities;
        self.snapshot.for_each(|option| {
            log::debug!("replay {} onto new stream", option.name());
            apply_option(handle.as_mut(), option, caps)
        })?;
        self.handle = Some(handle);
        self.state = CursorState::Configuring;
        self.recreates += 1;
        telemetry::record_recreate();
        crate::cursor_event!("recreate", "ns" => &self.namespace, "count" => self.recreates);
        log::warn!("{}: stream recreated ({} so far)", self.namespace, self.recreates);
        Ok(())
    }

    fn live_handle(&mut self) -> Result<&mut Box<dyn StreamHandle>> {
        self.handle
            .as_mut()
            .ok_or_else(|| CursorError::CursorNotFound(format!("{}: stream invalidated", self.namespace)))
    }

    fn guarded<T, F>(&mut self, operation: F) -> Result<T>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let policy = self.retry.clone();
        let result = policy.execute(self, true, operation);
        match &result {
            Err(e) if policy.is_retryable(e) => self.state = CursorState::Invalidated,
            Ok(_) if self.state == CursorState::Invalidated => {
                let started = self.handle.as_ref().is_some_and(|h| h.position() > 0);
                self.state = if started { CursorState::Iterating } else { CursorState::Configuring };
            }
            _ => {}
        }
        result
    }

    fn key_for(&self, raw: &RawElement, ordinal: usize) -> RecordKey {
        if self.use_identifier_keys
            && let Some(id) = raw.id()
        {
            return RecordKey::Id(id.clone());
        }
        RecordKey::Ordinal(ordinal)
    }

    fn pull(&mut self) -> Result<Option<Record>> {
        match self.live_handle()?.advance()? {
            Some(raw) => {
                self.state = CursorState::Iterating;
                telemetry::record_records(1);
                Ok(Some(Record::from_raw(raw)))
            }
            None => {
                self.mark_exhausted();
                Ok(None)
            }
        }
    }

    fn mark_exhausted(&mut self) {
        if self.state != CursorState::Exhausted {
            self.state = CursorState::Exhausted;
            crate::cursor_event!("exhausted", "ns" => &self.namespace);
        }
    }

    /// Consume the whole stream from its start.
    fn drain_from_start(&mut self) -> Result<Vec<(RecordKey, Record)>> {
        self.live_handle()?.rewind();
        self.state = CursorState::Configuring;
        let mut out = Vec::new();
        while let Some(raw) = self.live_handle()?.advance()? {
            self.state = CursorState::Iterating;
            let key = self.key_for(&raw, out.len());
            out.push((key, Record::from_raw(raw)));
        }
        self.mark_exhausted();
        telemetry::record_records(out.len());
        Ok(out)
    }

    // ---- guarded reads -------------------------------------------------------

    pub fn has_next(&mut self) -> Result<bool> {
        self.guarded(|c| {
            let more = c.live_handle()?.has_next()?;
            if more {
                c.state = CursorState::Iterating;
            } else {
                c.mark_exhausted();
            }
            Ok(more)
        })
    }

    /// Advance and return the new current record; `None` at the end.
    pub fn get_next(&mut self) -> Result<Option<Record>> {
        self.guarded(Self::pull)
    }

    /// Advance without returning the record; read it with [`Self::current`].
    pub fn advance(&mut self) -> Result<()> {
        self.guarded(|c| c.pull().map(|_| ()))
    }

    /// Number of matching records. With `found_only`, skip and limit apply.
    pub fn count(&mut self, found_only: bool) -> Result<u64> {
        self.guarded(|c| c.live_handle()?.count(found_only))
    }

    pub fn explain(&mut self) -> Result<Document> {
        self.guarded(|c| c.live_handle()?.explain())
    }

    /// Every record, in server order.
    ///
    /// Consumption restarts from the beginning and is retried as one unit: a
    /// failure part-way through reruns the whole read on a recreated stream.
    pub fn to_vec(&mut self) -> Result<Vec<Record>> {
        let original = self.use_identifier_keys;
        self.use_identifier_keys = false;
        let result = self.guarded(Self::drain_from_start);
        self.use_identifier_keys = original;
        Ok(result?.into_iter().map(|(_, record)| record).collect())
    }

    /// Every record with its key. `None` keeps the cursor's key mode.
    pub fn to_array(&mut self, use_identifier_keys: Option<bool>) -> Result<Vec<(RecordKey, Record)>> {
        let original = self.use_identifier_keys;
        self.use_identifier_keys = use_identifier_keys.unwrap_or(original);
        let result = self.guarded(Self::drain_from_start);
        self.use_identifier_keys = original;
        result
    }

    /// First record of the query, or `None` when nothing matches.
    ///
    /// Runs with limit 1 and ordinal keys, then puts both back; the limit and
    /// key mode seen from outside are unchanged on every path.
    pub fn get_single_result(&mut self) -> Result<Option<Record>> {
        let original_limit = self.snapshot.limit_setting();
        let original_keys = self.use_identifier_keys;

        self.reset();
        let outcome = match self.configure_unchecked(CursorOption::Limit(1)) {
            Ok(()) => {
                self.use_identifier_keys = false;
                self.to_vec()
            }
            Err(e) => Err(e),
        };

        self.reset();
        let restored = self.restore_limit(original_limit);
        self.use_identifier_keys = original_keys;

        let records = outcome?;
        restored?;
        Ok(records.into_iter().next())
    }

    fn restore_limit(&mut self, original: Option<i64>) -> Result<()> {
        let value = original.unwrap_or(0);
        match original {
            Some(n) => self.snapshot.set(CursorOption::Limit(n)),
            None => self.snapshot.clear_limit(),
        }
        match self.handle.as_mut() {
            Some(handle) => apply_option(handle.as_mut(), &CursorOption::Limit(value), self.capabilities),
            None => Ok(()),
        }
    }

    // ---- local reads ---------------------------------------------------------

    /// The record the last advance produced.
    #[must_use]
    pub fn current(&self) -> Option<Record> {
        self.handle.as_ref().and_then(|h| h.peek()).map(Record::from_raw)
    }

    /// Key of the current record.
    #[must_use]
    pub fn key(&self) -> Option<RecordKey> {
        let handle = self.handle.as_ref()?;
        let current = handle.peek()?;
        Some(self.key_for(&current, handle.position().saturating_sub(1)))
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.current().is_some()
    }

    /// True when the stream is exhausted or has been discarded.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_exhausted())
    }

    /// Cursor and stream details, without contacting the server.
    #[must_use]
    pub fn info(&self) -> Document {
        let mut d = doc! {
            "ns": self.namespace.clone(),
            "state": format!("{:?}", self.state),
            "retries": i64::from(self.retry.bound()),
            "recreates": i64::try_from(self.recreates).unwrap_or(i64::MAX),
            "useIdentifierKeys": self.use_identifier_keys,
            "readPreference": self.read_target().to_document(),
            "options": self.snapshot.to_document(),
        };
        if let Some(handle) = self.handle.as_ref() {
            d.insert("stream", handle.info());
        }
        d
    }
}

impl Recreate for ResilientCursor {
    fn recreate(&mut self) -> Result<()> {
        ResilientCursor::recreate(self)
    }
}

/// Borrowing iterator over the remaining records, from [`ResilientCursor::records`].
///
/// Each pull is a guarded [`ResilientCursor::get_next`]. The end of the stream
/// or the first error ends the iteration; the cursor itself stays usable.
#[derive(Debug)]
pub struct Records<'a> {
    cursor: &'a mut ResilientCursor,
    done: bool,
}

impl ResilientCursor {
    /// Iterate the remaining records without giving up the cursor.
    pub fn records(&mut self) -> Records<'_> {
        Records { cursor: self, done: false }
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.cursor.get_next().transpose();
        self.done = !matches!(item, Some(Ok(_)));
        item
    }
}

impl std::iter::FusedIterator for Records<'_> {}

impl<'a> IntoIterator for &'a mut ResilientCursor {
    type Item = Result<Record>;
    type IntoIter = Records<'a>;

    fn into_iter(self) -> Records<'a> {
        self.records()
    }
}

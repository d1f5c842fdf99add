use bson::{Bson, Document, doc};
use parking_lot::RwLock;
use std::sync::Arc;

use super::collection::Entry;
use super::eval::{apply_projection, compare_docs, eval_filter, get_path};
use super::faults::{CallJournal, FaultPlan, StreamCall, StreamOp};
use super::filter::parse_filter;
use crate::cursor::{CursorOption, Hint, ID_FIELD, RawElement, SortSpec, StreamHandle};
use crate::errors::{CursorError, Result};

/// Server-side cursor over a [`MemoryCollection`](super::MemoryCollection).
///
/// The query runs on the first `advance`/`has_next`, so options applied before
/// that shape the result. Once results exist, `apply` is refused until `rewind`.
pub struct MemoryStream {
    id: usize,
    namespace: String,
    entries: Arc<RwLock<Vec<Entry>>>,
    faults: FaultPlan,
    journal: CallJournal,
    filter: Document,
    projection: Document,
    hint: Option<Hint>,
    return_key: bool,
    limit: i64,
    skip: i64,
    batch_size: Option<i32>,
    sort: Vec<SortSpec>,
    settings: Document,
    results: Option<Vec<RawElement>>,
    examined: usize,
    pos: usize,
    current: Option<RawElement>,
}

impl MemoryStream {
    pub(crate) fn new(
        id: usize,
        namespace: String,
        entries: Arc<RwLock<Vec<Entry>>>,
        faults: FaultPlan,
        journal: CallJournal,
        filter: Document,
        projection: Document,
    ) -> Self {
        Self {
            id,
            namespace,
            entries,
            faults,
            journal,
            filter,
            projection,
            hint: None,
            return_key: false,
            limit: 0,
            skip: 0,
            batch_size: None,
            sort: Vec::new(),
            settings: Document::new(),
            results: None,
            examined: 0,
            pos: 0,
            current: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    fn started(&self) -> bool {
        self.results.is_some()
    }

    /// Matching entries in sort order, plus how many entries were examined.
    fn matching(&self) -> Result<(Vec<Entry>, usize)> {
        let filter = parse_filter(&self.filter)?;
        let entries = self.entries.read();
        let mut hits: Vec<Entry> = entries.iter().filter(|e| eval_filter(e.document(), &filter)).cloned().collect();
        if !self.sort.is_empty() {
            hits.sort_by(|a, b| compare_docs(a.document(), b.document(), &self.sort));
        }
        Ok((hits, entries.len()))
    }

    fn window(&self, total: usize) -> Result<(usize, usize)> {
        let skip = usize::try_from(self.skip)
            .map_err(|_| CursorError::MalformedQuery(format!("skip must not be negative: {}", self.skip)))?;
        let start = skip.min(total);
        let end = match usize::try_from(self.limit.unsigned_abs()) {
            Ok(0) => total,
            Ok(n) => start.saturating_add(n).min(total),
            Err(_) => total,
        };
        Ok((start, end))
    }

    fn shape(&self, entry: &Entry) -> RawElement {
        match entry {
            Entry::File(f) => RawElement::File(f.clone()),
            Entry::Doc(d) if self.return_key => RawElement::Document(self.key_of(d)),
            Entry::Doc(d) => RawElement::Document(apply_projection(d, &self.projection)),
        }
    }

    /// Index key of a document: the hinted key fields, else `_id`.
    fn key_of(&self, d: &Document) -> Document {
        let mut out = Document::new();
        let fields: Vec<&str> = match &self.hint {
            Some(Hint::Keys(keys)) => keys.keys().map(String::as_str).collect(),
            _ => vec![ID_FIELD],
        };
        for field in fields {
            if let Some(v) = get_path(d, field) {
                out.insert(field, v.clone());
            }
        }
        out
    }

    fn materialize(&mut self) -> Result<()> {
        if self.started() {
            return Ok(());
        }
        let (hits, examined) = self.matching()?;
        let (start, end) = self.window(hits.len())?;
        let results: Vec<RawElement> = hits[start..end].iter().map(|e| self.shape(e)).collect();
        log::debug!("{} stream {}: {} of {examined} entries selected", self.namespace, self.id, results.len());
        self.examined = examined;
        self.results = Some(results);
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.results.as_ref().map_or(0, |r| r.len().saturating_sub(self.pos))
    }
}

impl StreamHandle for MemoryStream {
    fn advance(&mut self) -> Result<Option<RawElement>> {
        self.journal.record(StreamCall::Advance { stream: self.id });
        self.faults.check(StreamOp::Advance)?;
        self.materialize()?;
        let next = self.results.as_ref().and_then(|r| r.get(self.pos)).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        self.current.clone_from(&next);
        Ok(next)
    }

    fn has_next(&mut self) -> Result<bool> {
        self.journal.record(StreamCall::HasNext { stream: self.id });
        self.faults.check(StreamOp::HasNext)?;
        self.materialize()?;
        Ok(self.remaining() > 0)
    }

    fn peek(&self) -> Option<RawElement> {
        self.current.clone()
    }

    fn is_exhausted(&self) -> bool {
        self.started() && self.remaining() == 0
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn rewind(&mut self) {
        self.journal.record(StreamCall::Rewind { stream: self.id });
        self.results = None;
        self.examined = 0;
        self.pos = 0;
        self.current = None;
    }

    fn count(&mut self, found_only: bool) -> Result<u64> {
        self.journal.record(StreamCall::Count { stream: self.id });
        self.faults.check(StreamOp::Count)?;
        let (hits, _) = self.matching()?;
        let n = if found_only {
            let (start, end) = self.window(hits.len())?;
            end - start
        } else {
            hits.len()
        };
        Ok(n as u64)
    }

    fn explain(&mut self) -> Result<Document> {
        self.journal.record(StreamCall::Explain { stream: self.id });
        self.faults.check(StreamOp::Explain)?;
        let (hits, examined) = self.matching()?;
        let (start, end) = self.window(hits.len())?;
        let stage = if self.hint.is_some() { "IXSCAN" } else { "COLLSCAN" };
        let mut plan = doc! {
            "stage": stage,
            "filter": self.filter.clone(),
            "sort": SortSpec::to_document(&self.sort),
            "skip": self.skip,
            "limit": self.limit,
        };
        if let Some(h) = &self.hint {
            plan.insert("hint", h.to_bson());
        }
        Ok(doc! {
            "namespace": self.namespace.clone(),
            "stream": i64::try_from(self.id).unwrap_or(i64::MAX),
            "winningPlan": plan,
            "nReturned": i64::try_from(end - start).unwrap_or(i64::MAX),
            "totalDocsExamined": i64::try_from(examined).unwrap_or(i64::MAX),
        })
    }

    fn info(&self) -> Document {
        let mut d = doc! {
            "stream": i64::try_from(self.id).unwrap_or(i64::MAX),
            "started": self.started(),
            "position": i64::try_from(self.pos).unwrap_or(i64::MAX),
            "exhausted": self.is_exhausted(),
            "limit": self.limit,
            "skip": self.skip,
            "settings": self.settings.clone(),
        };
        if let Some(n) = self.batch_size {
            d.insert("batchSize", n);
        }
        d
    }

    fn apply(&mut self, option: &CursorOption) -> Result<()> {
        if self.started() {
            return Err(CursorError::InvalidOperation(format!(
                "cannot apply {} to stream {} after the query ran",
                option.name(),
                self.id
            )));
        }
        self.journal.record(StreamCall::Apply { stream: self.id, option: option.clone() });
        match option {
            CursorOption::Projection(p) => self.projection = p.clone(),
            CursorOption::Hint(h) => self.hint = Some(h.clone()),
            CursorOption::ReturnKeyOnly(b) => self.return_key = *b,
            CursorOption::BatchSize(n) => self.batch_size = Some(*n),
            CursorOption::Limit(n) => self.limit = *n,
            CursorOption::Skip(n) => self.skip = *n,
            CursorOption::Sort(s) => self.sort = s.clone(),
            CursorOption::ReadTarget(t) => {
                self.settings.insert("readPreference", t.to_document());
            }
            CursorOption::Extra(name, value) => {
                self.settings.insert(name.clone(), value.clone());
            }
            CursorOption::AllowPartialResults(b)
            | CursorOption::NoCursorTimeout(b)
            | CursorOption::SecondaryOk(b)
            | CursorOption::Snapshot(b)
            | CursorOption::Tailable(b) => {
                self.settings.insert(option.name(), *b);
            }
            CursorOption::MaxTimeMs(n) | CursorOption::Timeout(n) => {
                self.settings.insert(option.name(), Bson::Int64(*n));
            }
        }
        Ok(())
    }
}

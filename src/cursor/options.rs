use crate::cursor::read_target::{ReadTarget, ReadTargetKind, ReadTargetTranslator};
use crate::errors::{CursorError, Result};
use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    /// Wire direction: 1 or -1.
    #[must_use]
    pub fn direction(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

impl FromStr for Order {
    type Err = CursorError;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" | "1" => Ok(Self::Asc),
            "desc" | "descending" | "-1" => Ok(Self::Desc),
            other => Err(CursorError::MalformedQuery(format!("unknown sort direction '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Asc }
    }
    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: Order::Desc }
    }

    /// Parse `"field:asc,other:desc"`; a bare field sorts ascending.
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once(':') {
                Some((field, dir)) => Ok(Self { field: field.trim().to_string(), order: dir.parse()? }),
                None => Ok(Self::asc(part)),
            })
            .collect()
    }

    #[must_use]
    pub fn to_document(specs: &[Self]) -> Document {
        let mut d = Document::new();
        for s in specs {
            d.insert(s.field.clone(), s.order.direction());
        }
        d
    }
}

/// Index hint: either an index name or its key pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    Name(String),
    Keys(Document),
}

impl Hint {
    #[must_use]
    pub fn to_bson(&self) -> Bson {
        match self {
            Self::Name(n) => Bson::String(n.clone()),
            Self::Keys(k) => Bson::Document(k.clone()),
        }
    }
}

/// One cursor option with its value.
///
/// This is the unit both the live-handle setter and the replay step work with:
/// a [`StreamHandle`](crate::cursor::StreamHandle) receives exactly these values
/// through its single `apply` entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorOption {
    /// Part of the base query; not replayed through `apply` (it opens the stream).
    Projection(Document),
    Hint(Hint),
    ReturnKeyOnly(bool),
    AllowPartialResults(bool),
    NoCursorTimeout(bool),
    Extra(String, Bson),
    BatchSize(i32),
    Limit(i64),
    Skip(i64),
    MaxTimeMs(i64),
    SecondaryOk(bool),
    ReadTarget(ReadTarget),
    Snapshot(bool),
    Sort(Vec<SortSpec>),
    Tailable(bool),
    Timeout(i64),
}

impl CursorOption {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Projection(_) => "projection",
            Self::Hint(_) => "hint",
            Self::ReturnKeyOnly(_) => "returnKey",
            Self::AllowPartialResults(_) => "allowPartialResults",
            Self::NoCursorTimeout(_) => "noCursorTimeout",
            Self::Extra(name, _) => name,
            Self::BatchSize(_) => "batchSize",
            Self::Limit(_) => "limit",
            Self::Skip(_) => "skip",
            Self::MaxTimeMs(_) => "maxTimeMS",
            Self::SecondaryOk(_) => "secondaryOk",
            Self::ReadTarget(_) => "readPreference",
            Self::Snapshot(_) => "snapshot",
            Self::Sort(_) => "sort",
            Self::Tailable(_) => "tailable",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Build an option from a loosely typed `(name, value)` pair.
    ///
    /// Integers and booleans are coerced from any numeric, boolean or string
    /// representation. Out-of-range numbers are kept as given. Unknown names
    /// become [`CursorOption::Extra`].
    pub fn parse(name: &str, value: &Bson) -> Result<Self> {
        Ok(match name {
            "projection" | "fields" => Self::Projection(as_document(name, value)?),
            "hint" => match value {
                Bson::Document(d) => Self::Hint(Hint::Keys(d.clone())),
                other => Self::Hint(Hint::Name(as_string(other))),
            },
            "returnKey" | "returnKeyOnly" => Self::ReturnKeyOnly(as_bool(value)),
            "allowPartialResults" | "partial" => Self::AllowPartialResults(as_bool(value)),
            "noCursorTimeout" | "immortal" => Self::NoCursorTimeout(as_bool(value)),
            "batchSize" => Self::BatchSize(i32::try_from(as_i64(name, value)?).map_err(|_| {
                CursorError::MalformedQuery(format!("batchSize out of range: {value}"))
            })?),
            "limit" => Self::Limit(as_i64(name, value)?),
            "skip" => Self::Skip(as_i64(name, value)?),
            "maxTimeMS" => Self::MaxTimeMs(as_i64(name, value)?),
            "secondaryOk" | "slaveOkay" => Self::SecondaryOk(as_bool(value)),
            "readPreference" => Self::ReadTarget(parse_read_target(value)?),
            "snapshot" => Self::Snapshot(as_bool(value)),
            "sort" => Self::Sort(parse_sort(value)?),
            "tailable" => Self::Tailable(as_bool(value)),
            "timeout" => Self::Timeout(as_i64(name, value)?),
            other => Self::Extra(other.to_string(), value.clone()),
        })
    }
}

fn as_string(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_bool(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        Bson::String(s) => !matches!(s.to_ascii_lowercase().as_str(), "" | "0" | "false" | "no"),
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_i64(name: &str, value: &Bson) -> Result<i64> {
    match value {
        Bson::Int32(i) => Ok(i64::from(*i)),
        Bson::Int64(i) => Ok(*i),
        Bson::Double(f) if f.is_finite() => Ok(f.trunc() as i64),
        Bson::Boolean(b) => Ok(i64::from(*b)),
        Bson::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| CursorError::MalformedQuery(format!("{name} expects an integer, got '{s}'"))),
        other => Err(CursorError::MalformedQuery(format!("{name} expects an integer, got {other}"))),
    }
}

fn as_document(name: &str, value: &Bson) -> Result<Document> {
    match value {
        Bson::Document(d) => Ok(d.clone()),
        other => Err(CursorError::MalformedQuery(format!("{name} expects a document, got {other}"))),
    }
}

fn parse_sort(value: &Bson) -> Result<Vec<SortSpec>> {
    match value {
        Bson::Document(d) => d
            .iter()
            .map(|(field, dir)| {
                let order = match dir {
                    Bson::String(s) => s.parse()?,
                    other => {
                        if as_i64("sort", other)? < 0 {
                            Order::Desc
                        } else {
                            Order::Asc
                        }
                    }
                };
                Ok(SortSpec { field: field.clone(), order })
            })
            .collect(),
        Bson::String(s) => SortSpec::parse_list(s),
        other => Err(CursorError::MalformedQuery(format!("sort expects a document, got {other}"))),
    }
}

fn parse_read_target(value: &Bson) -> Result<ReadTarget> {
    match value {
        Bson::String(mode) => Ok(ReadTarget::of(mode.parse::<ReadTargetKind>()?)),
        Bson::Document(d) => {
            let kind = d
                .get_str("mode")
                .map_err(|_| CursorError::InvalidReadTarget("missing 'mode'".into()))?
                .parse::<ReadTargetKind>()?;
            let tag_sets = match d.get("tags") {
                Some(Bson::Array(tags)) => tags
                    .iter()
                    .map(|t| match t {
                        Bson::Document(td) => Ok(td.clone()),
                        other => Err(CursorError::InvalidReadTarget(format!("tag set {other}"))),
                    })
                    .collect::<Result<Vec<_>>>()?,
                Some(other) => {
                    return Err(CursorError::InvalidReadTarget(format!("tags must be an array, got {other}")));
                }
                None => Vec::new(),
            };
            ReadTarget::new(kind, tag_sets)
        }
        other => Err(CursorError::InvalidReadTarget(format!("unsupported value {other}"))),
    }
}

/// Every option ever set on a cursor, in a form that can be replayed.
///
/// The filter and projection are the base of the query and open a new stream;
/// all other options are emitted by [`ConfigurationSnapshot::replay`] in a fixed
/// order: hint, boolean flags (returnKey, allowPartialResults, noCursorTimeout),
/// extra options in insertion order, batch size, limit, skip, maxTimeMS, legacy
/// secondary flag, structured read target, snapshot, sort, tailable, timeout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationSnapshot {
    filter: Document,
    projection: Document,
    hint: Option<Hint>,
    return_key_only: Option<bool>,
    allow_partial_results: Option<bool>,
    no_cursor_timeout: Option<bool>,
    extra: Vec<(String, Bson)>,
    batch_size: Option<i32>,
    limit: Option<i64>,
    skip: Option<i64>,
    max_time_ms: Option<i64>,
    secondary_ok: Option<bool>,
    read_target: Option<ReadTarget>,
    snapshot: Option<bool>,
    sort: Option<Vec<SortSpec>>,
    tailable: Option<bool>,
    timeout_ms: Option<i64>,
}

impl ConfigurationSnapshot {
    #[must_use]
    pub fn new(filter: Document, projection: Document) -> Self {
        Self { filter, projection, ..Self::default() }
    }

    /// Store one option. Re-setting an extra option keeps its original position.
    ///
    /// Setting the legacy secondary flag also re-derives a stored structured read
    /// target through [`ReadTargetTranslator::set_legacy`], so a later replay
    /// cannot resurrect a target the caller has since overridden.
    pub fn set(&mut self, option: CursorOption) {
        match option {
            CursorOption::Projection(p) => self.projection = p,
            CursorOption::Hint(h) => self.hint = Some(h),
            CursorOption::ReturnKeyOnly(b) => self.return_key_only = Some(b),
            CursorOption::AllowPartialResults(b) => self.allow_partial_results = Some(b),
            CursorOption::NoCursorTimeout(b) => self.no_cursor_timeout = Some(b),
            CursorOption::Extra(name, value) => {
                match self.extra.iter_mut().find(|(n, _)| *n == name) {
                    Some(slot) => slot.1 = value,
                    None => self.extra.push((name, value)),
                }
            }
            CursorOption::BatchSize(n) => self.batch_size = Some(n),
            CursorOption::Limit(n) => self.limit = Some(n),
            CursorOption::Skip(n) => self.skip = Some(n),
            CursorOption::MaxTimeMs(n) => self.max_time_ms = Some(n),
            CursorOption::SecondaryOk(allow) => {
                self.secondary_ok = Some(allow);
                if let Some(target) = self.read_target.as_mut() {
                    *target = ReadTargetTranslator::set_legacy(target, allow);
                }
            }
            CursorOption::ReadTarget(t) => self.read_target = Some(t),
            CursorOption::Snapshot(b) => self.snapshot = Some(b),
            CursorOption::Sort(s) => self.sort = Some(s),
            CursorOption::Tailable(b) => self.tailable = Some(b),
            CursorOption::Timeout(n) => self.timeout_ms = Some(n),
        }
    }

    /// Forget the limit so it is no longer replayed.
    pub fn clear_limit(&mut self) {
        self.limit = None;
    }

    /// Options in replay order (filter and projection excluded).
    #[must_use]
    pub fn replay(&self) -> Vec<CursorOption> {
        let mut out = Vec::new();
        if let Some(h) = &self.hint {
            out.push(CursorOption::Hint(h.clone()));
        }
        if let Some(b) = self.return_key_only {
            out.push(CursorOption::ReturnKeyOnly(b));
        }
        if let Some(b) = self.allow_partial_results {
            out.push(CursorOption::AllowPartialResults(b));
        }
        if let Some(b) = self.no_cursor_timeout {
            out.push(CursorOption::NoCursorTimeout(b));
        }
        out.extend(self.extra.iter().map(|(n, v)| CursorOption::Extra(n.clone(), v.clone())));
        if let Some(n) = self.batch_size {
            out.push(CursorOption::BatchSize(n));
        }
        if let Some(n) = self.limit {
            out.push(CursorOption::Limit(n));
        }
        if let Some(n) = self.skip {
            out.push(CursorOption::Skip(n));
        }
        if let Some(n) = self.max_time_ms {
            out.push(CursorOption::MaxTimeMs(n));
        }
        if let Some(b) = self.secondary_ok {
            out.push(CursorOption::SecondaryOk(b));
        }
        if let Some(t) = &self.read_target {
            out.push(CursorOption::ReadTarget(t.clone()));
        }
        if let Some(b) = self.snapshot {
            out.push(CursorOption::Snapshot(b));
        }
        if let Some(s) = &self.sort {
            out.push(CursorOption::Sort(s.clone()));
        }
        if let Some(b) = self.tailable {
            out.push(CursorOption::Tailable(b));
        }
        if let Some(n) = self.timeout_ms {
            out.push(CursorOption::Timeout(n));
        }
        out
    }

    /// Feed every option, in replay order, to `apply`; stops at the first error.
    pub fn for_each<F>(&self, mut apply: F) -> Result<()>
    where
        F: FnMut(&CursorOption) -> Result<()>,
    {
        self.replay().iter().try_for_each(|option| apply(option))
    }

    #[must_use]
    pub fn filter(&self) -> &Document {
        &self.filter
    }
    #[must_use]
    pub fn projection(&self) -> &Document {
        &self.projection
    }
    #[must_use]
    pub fn hint(&self) -> Option<&Hint> {
        self.hint.as_ref()
    }
    /// Effective limit; 0 means unbounded.
    #[must_use]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(0)
    }
    /// The limit exactly as configured (`None` when never set).
    #[must_use]
    pub fn limit_setting(&self) -> Option<i64> {
        self.limit
    }
    #[must_use]
    pub fn skip(&self) -> i64 {
        self.skip.unwrap_or(0)
    }
    #[must_use]
    pub fn batch_size(&self) -> Option<i32> {
        self.batch_size
    }
    #[must_use]
    pub fn max_time_ms(&self) -> Option<i64> {
        self.max_time_ms
    }
    #[must_use]
    pub fn sort(&self) -> &[SortSpec] {
        self.sort.as_deref().unwrap_or(&[])
    }
    #[must_use]
    pub fn secondary_ok(&self) -> Option<bool> {
        self.secondary_ok
    }
    #[must_use]
    pub fn read_target(&self) -> Option<&ReadTarget> {
        self.read_target.as_ref()
    }
    #[must_use]
    pub fn return_key_only(&self) -> bool {
        self.return_key_only.unwrap_or(false)
    }
    #[must_use]
    pub fn allow_partial_results(&self) -> bool {
        self.allow_partial_results.unwrap_or(false)
    }
    #[must_use]
    pub fn no_cursor_timeout(&self) -> bool {
        self.no_cursor_timeout.unwrap_or(false)
    }
    #[must_use]
    pub fn snapshot_mode(&self) -> bool {
        self.snapshot.unwrap_or(false)
    }
    #[must_use]
    pub fn tailable(&self) -> bool {
        self.tailable.unwrap_or(false)
    }
    #[must_use]
    pub fn timeout_ms(&self) -> Option<i64> {
        self.timeout_ms
    }
    #[must_use]
    pub fn extra_options(&self) -> &[(String, Bson)] {
        &self.extra
    }

    /// Options as a document, for `info()` style reporting.
    #[must_use]
    pub fn to_document(&self) -> Document {
        let mut d = doc! { "filter": self.filter.clone(), "projection": self.projection.clone() };
        for option in self.replay() {
            let value = match &option {
                CursorOption::Projection(p) => Bson::Document(p.clone()),
                CursorOption::Hint(h) => h.to_bson(),
                CursorOption::ReturnKeyOnly(b)
                | CursorOption::AllowPartialResults(b)
                | CursorOption::NoCursorTimeout(b)
                | CursorOption::SecondaryOk(b)
                | CursorOption::Snapshot(b)
                | CursorOption::Tailable(b) => Bson::Boolean(*b),
                CursorOption::Extra(_, v) => v.clone(),
                CursorOption::BatchSize(n) => Bson::Int32(*n),
                CursorOption::Limit(n)
                | CursorOption::Skip(n)
                | CursorOption::MaxTimeMs(n)
                | CursorOption::Timeout(n) => Bson::Int64(*n),
                CursorOption::ReadTarget(t) => Bson::Document(t.to_document()),
                CursorOption::Sort(s) => Bson::Document(SortSpec::to_document(s)),
            };
            d.insert(option.name().to_string(), value);
        }
        d
    }
}

use bson::{Bson, Document};
use std::cmp::Ordering;

use super::filter::{CmpOp, Filter, MAX_IN_SET, MAX_PATH_DEPTH, MAX_SORT_FIELDS};
use crate::cursor::{ID_FIELD, Order, SortSpec};

pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Filter::In { path, values } => get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Nin { path, values } => !get_path(doc, path).is_some_and(|v| is_in_set(v, values)),
        Filter::Cmp { path, op: CmpOp::Ne, value } => {
            !get_path(doc, path).is_some_and(|v| compare_bson(v, value) == Ordering::Equal)
        }
        Filter::Cmp { path, op, value } => get_path(doc, path).is_some_and(|v| {
            let c = compare_bson(v, value);
            match op {
                CmpOp::Eq => c == Ordering::Equal,
                CmpOp::Gt => c == Ordering::Greater,
                CmpOp::Gte => c != Ordering::Less,
                CmpOp::Lt => c == Ordering::Less,
                CmpOp::Lte => c != Ordering::Greater,
                CmpOp::Ne => c != Ordering::Equal,
            }
        }),
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            if let Some(Bson::String(s)) = get_path(doc, path) {
                let mut re = regex::RegexBuilder::new(pattern);
                re.case_insensitive(*case_insensitive);
                re.build().is_ok_and(|r| r.is_match(s))
            } else {
                false
            }
        }
    }
}

pub fn compare_docs(a: &Document, b: &Document, sort: &[SortSpec]) -> Ordering {
    for s in sort.iter().take(MAX_SORT_FIELDS) {
        let ord = match (get_path(a, &s.field), get_path(b, &s.field)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

fn is_in_set(v: &Bson, set: &[Bson]) -> bool {
    set.iter().take(MAX_IN_SET).any(|x| compare_bson(v, x) == Ordering::Equal)
}

/// Resolve a dotted path through nested documents.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return None;
    }
    let mut parts = path.split('.');
    let mut cur = doc.get(parts.next()?)?;
    for (depth, part) in parts.enumerate() {
        if depth + 1 >= MAX_PATH_DEPTH {
            return None;
        }
        match cur {
            Bson::Document(d) => cur = d.get(part)?,
            _ => return None,
        }
    }
    Some(cur)
}

/// Total order over BSON values: numbers compare across types, otherwise by type rank.
pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    use bson::Bson as T;
    fn as_f64_num(x: &T) -> Option<f64> {
        match x {
            T::Int32(i) => Some(f64::from(*i)),
            #[allow(clippy::cast_precision_loss)]
            T::Int64(i) => Some(*i as f64),
            T::Double(f) => Some(*f),
            T::Decimal128(d) => d.to_string().parse::<f64>().ok(),
            _ => None,
        }
    }
    if let (Some(x), Some(y)) = (as_f64_num(a), as_f64_num(b)) {
        return x.total_cmp(&y);
    }
    match (a, b) {
        (T::String(x), T::String(y)) => x.cmp(y),
        (T::Boolean(x), T::Boolean(y)) => x.cmp(y),
        (T::ObjectId(x), T::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (T::DateTime(x), T::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (T::Array(_), T::Array(_)) | (T::Document(_), T::Document(_)) => {
            if a == b { Ordering::Equal } else { a.to_string().cmp(&b.to_string()) }
        }
        _ if type_rank(a) == type_rank(b) && a == b => Ordering::Equal,
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 2,
        T::String(_) | T::Symbol(_) => 3,
        T::Document(_) => 4,
        T::Array(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::Boolean(_) => 8,
        T::DateTime(_) => 9,
        T::Timestamp(_) => 10,
        T::RegularExpression(_) => 11,
        T::DbPointer(_) => 12,
        T::JavaScriptCode(_) => 13,
        T::JavaScriptCodeWithScope(_) => 14,
        T::MaxKey => 255,
    }
}

fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Int32(i) => *i != 0,
        Bson::Int64(i) => *i != 0,
        Bson::Double(f) => *f != 0.0,
        _ => true,
    }
}

/// Apply an inclusion or exclusion projection.
///
/// `_id` is kept unless excluded explicitly. Any other truthy field makes it an
/// inclusion projection; otherwise listed fields are removed.
pub fn apply_projection(doc: &Document, projection: &Document) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }
    let keep_id = projection.get(ID_FIELD).is_none_or(truthy);
    let inclusion = projection.iter().any(|(k, v)| k != ID_FIELD && truthy(v));
    let mut out = Document::new();
    if inclusion {
        if keep_id && let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD, id.clone());
        }
        for (field, flag) in projection {
            if field != ID_FIELD
                && truthy(flag)
                && let Some(v) = doc.get(field)
            {
                out.insert(field.clone(), v.clone());
            }
        }
    } else {
        for (k, v) in doc {
            let excluded = if k == ID_FIELD { !keep_id } else { projection.contains_key(k) };
            if !excluded {
                out.insert(k.clone(), v.clone());
            }
        }
    }
    out
}

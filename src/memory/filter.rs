use crate::errors::{CursorError, Result};
use bson::{Bson, Document};

// Safety limits to prevent resource abuse
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;
pub(crate) const MAX_SORT_FIELDS: usize = 8;
const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Parsed query predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, pattern: String, case_insensitive: bool },
}

fn malformed(msg: impl Into<String>) -> CursorError {
    CursorError::MalformedQuery(msg.into())
}

/// Parse a query document: `{field: value}`, `{field: {$op: value}}`, `$and`/`$or`/`$nor`.
///
/// Unknown operators are rejected rather than ignored.
pub fn parse_filter(doc: &Document) -> Result<Filter> {
    parse_at(doc, 0)
}

fn parse_at(doc: &Document, depth: usize) -> Result<Filter> {
    if depth > MAX_NESTING {
        return Err(malformed("filter nested too deeply"));
    }
    let mut clauses = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        if let Some(op) = key.strip_prefix('$') {
            let branches = match value {
                Bson::Array(items) if !items.is_empty() => items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(d) => parse_at(d, depth + 1),
                        other => Err(malformed(format!("${op} entries must be documents, got {other}"))),
                    })
                    .collect::<Result<Vec<_>>>()?,
                other => return Err(malformed(format!("${op} needs a non-empty array, got {other}"))),
            };
            clauses.push(match op {
                "and" => Filter::And(branches),
                "or" => Filter::Or(branches),
                "nor" => Filter::Nor(branches),
                _ => return Err(malformed(format!("unknown top-level operator ${op}"))),
            });
        } else {
            clauses.push(parse_field(key, value, depth)?);
        }
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn is_operator_doc(d: &Document) -> bool {
    d.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn parse_field(path: &str, value: &Bson, depth: usize) -> Result<Filter> {
    if path.is_empty() || path.split('.').count() > MAX_PATH_DEPTH {
        return Err(malformed(format!("invalid field path '{path}'")));
    }
    let ops = match value {
        Bson::Document(d) if is_operator_doc(d) => d,
        other => return Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: other.clone() }),
    };
    #[cfg(feature = "regex")]
    let case_insensitive = matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
    let mut clauses = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        let path = path.to_string();
        let clause = match op.as_str() {
            "$eq" => Filter::Cmp { path, op: CmpOp::Eq, value: arg.clone() },
            "$ne" => Filter::Cmp { path, op: CmpOp::Ne, value: arg.clone() },
            "$gt" => Filter::Cmp { path, op: CmpOp::Gt, value: arg.clone() },
            "$gte" => Filter::Cmp { path, op: CmpOp::Gte, value: arg.clone() },
            "$lt" => Filter::Cmp { path, op: CmpOp::Lt, value: arg.clone() },
            "$lte" => Filter::Cmp { path, op: CmpOp::Lte, value: arg.clone() },
            "$in" | "$nin" => {
                let Bson::Array(values) = arg else {
                    return Err(malformed(format!("{op} needs an array")));
                };
                if values.len() > MAX_IN_SET {
                    return Err(malformed(format!("{op} set too large: {}", values.len())));
                }
                if op == "$in" {
                    Filter::In { path, values: values.clone() }
                } else {
                    Filter::Nin { path, values: values.clone() }
                }
            }
            "$exists" => Filter::Exists { path, exists: !matches!(arg, Bson::Boolean(false) | Bson::Int32(0)) },
            "$not" => match arg {
                Bson::Document(inner) if is_operator_doc(inner) => {
                    Filter::Not(Box::new(parse_field(&path, arg, depth + 1)?))
                }
                other => return Err(malformed(format!("$not needs an operator document, got {other}"))),
            },
            #[cfg(feature = "regex")]
            "$regex" => match arg {
                Bson::String(pattern) => Filter::Regex { path, pattern: pattern.clone(), case_insensitive },
                Bson::RegularExpression(re) => Filter::Regex {
                    path,
                    pattern: re.pattern.as_str().to_string(),
                    case_insensitive: re.options.as_str().contains('i'),
                },
                other => return Err(malformed(format!("$regex needs a string, got {other}"))),
            },
            #[cfg(feature = "regex")]
            "$options" => continue,
            other => return Err(malformed(format!("unknown operator {other} on '{path}'"))),
        };
        clauses.push(clause);
    }
    Ok(if clauses.len() == 1 { clauses.remove(0) } else { Filter::And(clauses) })
}

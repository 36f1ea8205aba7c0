//! Filter evaluation for in-memory documents.
//!
//! Filters use the same document syntax the server accepts: implicit equality
//! (`{ "name": "x" }`), comparison operators (`$eq $ne $gt $gte $lt $lte`),
//! set membership (`$in $nin`), `$exists`, `$not`, the logical combinators
//! `$and $or $nor`, and dotted paths into embedded documents.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use daba_core::error::{DabaError, DabaResult};

/// Type-erased, comparable representation of BSON values.
///
/// Integers compare exactly with each other; against a double they compare by
/// numeric value, so `1`, `1i64` and `1.0` are all equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values with no useful ordering (binary, regex, ...), compared structurally.
    Opaque(&'a Bson),
}

impl<'a> Comparable<'a> {
    /// Position in the server's cross-type sort order.
    fn type_rank(&self) -> u8 {
        match self {
            Comparable::Null => 1,
            Comparable::Int(_) | Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Map(_) => 4,
            Comparable::Array(_) => 5,
            Comparable::Opaque(_) => 6,
            Comparable::ObjectId(_) => 7,
            Comparable::Bool(_) => 8,
            Comparable::DateTime(_) => 9,
        }
    }

    /// Total ordering used by `$sort`: by type first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.type_rank()
            .cmp(&other.type_rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Int(i64::from(*value)),
            Bson::Int64(value) => Comparable::Int(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Int(a), Comparable::Int(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::Int(a), Comparable::Number(b))
            | (Comparable::Number(b), Comparable::Int(a)) => {
                compare_int_double(*a, *b) == Some(Ordering::Equal)
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Int(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Int(a), Comparable::Number(b)) => compare_int_double(*a, *b),
            (Comparable::Number(a), Comparable::Int(b)) => {
                compare_int_double(*b, *a).map(Ordering::reverse)
            }
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders an integer against a double without rounding the integer.
fn compare_int_double(int: i64, double: f64) -> Option<Ordering> {
    // i64::MAX as f64 is 2^63, one past the largest i64
    if double.fract() == 0.0 && double >= i64::MIN as f64 && double < i64::MAX as f64 {
        return Some(int.cmp(&(double as i64)));
    }

    (int as f64).partial_cmp(&double)
}

/// Whether two BSON values are equal under numeric normalization.
pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Resolves a dotted path such as `address.city` or `tags.0`.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Evaluates filter documents against stored documents.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Whether the document satisfies every clause of `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`DabaError::Operation`] for unknown operators or malformed operands.
    pub fn matches(&self, filter: &Document) -> DabaResult<bool> {
        for (key, condition) in filter {
            let satisfied = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for clause in clauses(key, condition)? {
                        if !self.matches(clause)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => {
                    let mut any = false;
                    for clause in clauses(key, condition)? {
                        if self.matches(clause)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$nor" => {
                    let mut none = true;
                    for clause in clauses(key, condition)? {
                        if self.matches(clause)? {
                            none = false;
                            break;
                        }
                    }
                    none
                }
                op if op.starts_with('$') => {
                    return Err(DabaError::Operation(format!("unknown top level operator: {op}")));
                }
                path => field_matches(lookup(self.document, path), condition)?,
            };

            if !satisfied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Keeps the documents matching `filter`, in their original order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> DabaResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).matches(filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }
}

fn clauses<'f>(operator: &str, value: &'f Bson) -> DabaResult<Vec<&'f Document>> {
    let invalid = || DabaError::Operation(format!("{operator} argument must be a non-empty array of documents"));

    match value {
        Bson::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| item.as_document().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

fn is_operator_document(condition: &Document) -> bool {
    condition
        .keys()
        .next()
        .is_some_and(|key| key.starts_with('$'))
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> DabaResult<bool> {
    match condition {
        Bson::Document(operators) if is_operator_document(operators) => {
            for (operator, operand) in operators {
                if !apply_operator(value, operator, operand)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(equals(value, condition)),
    }
}

fn apply_operator(value: Option<&Bson>, operator: &str, operand: &Bson) -> DabaResult<bool> {
    match operator {
        "$eq" => Ok(equals(value, operand)),
        "$ne" => Ok(!equals(value, operand)),
        "$gt" => Ok(compares(value, operand, |o| o == Ordering::Greater)),
        "$gte" => Ok(compares(value, operand, |o| o != Ordering::Less)),
        "$lt" => Ok(compares(value, operand, |o| o == Ordering::Less)),
        "$lte" => Ok(compares(value, operand, |o| o != Ordering::Greater)),
        "$in" | "$nin" => {
            let Bson::Array(candidates) = operand else {
                return Err(DabaError::Operation(format!("{operator} needs an array")));
            };
            let found = candidates.iter().any(|candidate| equals(value, candidate));
            Ok(if operator == "$in" { found } else { !found })
        }
        "$exists" => Ok(value.is_some() == truthy(operand)),
        "$not" => match operand {
            Bson::Document(_) => Ok(!field_matches(value, operand)?),
            _ => Err(DabaError::Operation("$not needs a document".to_string())),
        },
        other => Err(DabaError::Operation(format!("unknown operator: {other}"))),
    }
}

/// Equality as the server applies it: a missing field equals `null`, and an
/// array field matches if it equals the target or any element does.
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None => matches!(target, Bson::Null),
        Some(Bson::Array(items)) => {
            values_equal(&Bson::Array(items.clone()), target)
                || items.iter().any(|item| values_equal(item, target))
        }
        Some(value) => values_equal(value, target),
    }
}

/// Range comparison; only values of the same type are ever ordered.
fn compares(value: Option<&Bson>, target: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let target = Comparable::from(target);
    let check = |candidate: &Bson| {
        Comparable::from(candidate)
            .partial_cmp(&target)
            .is_some_and(&accept)
    };

    match value {
        None => false,
        Some(Bson::Array(items)) => items.iter().any(check),
        Some(value) => check(value),
    }
}

pub(crate) fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(flag) => *flag,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

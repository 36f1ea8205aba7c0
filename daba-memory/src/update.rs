//! Update operators applied to stored documents.
//!
//! Supports `$set`, `$inc` and `$unset`, each keyed by (possibly dotted)
//! field paths. Replacement documents and other operators are rejected.

use bson::{Bson, Document};

use daba_core::error::{DabaError, DabaResult};

use crate::evaluator::{lookup, values_equal};

const SUPPORTED: [&str; 3] = ["$set", "$inc", "$unset"];

/// Checks that `update` is a non-empty operator document this store can apply.
pub(crate) fn validate(update: &Document) -> DabaResult<()> {
    if update.is_empty() {
        return Err(DabaError::Operation("update document must not be empty".to_string()));
    }

    for (operator, fields) in update {
        if !operator.starts_with('$') {
            return Err(DabaError::Operation(format!(
                "update document requires atomic operators, found field '{operator}'"
            )));
        }
        if !SUPPORTED.contains(&operator.as_str()) {
            return Err(DabaError::Operation(format!("unsupported update operator: {operator}")));
        }

        let Bson::Document(fields) = fields else {
            return Err(DabaError::Operation(format!("{operator} needs a document of fields")));
        };

        if operator == "$inc" {
            if let Some((path, _)) = fields.iter().find(|(_, value)| !is_number(value)) {
                return Err(DabaError::Operation(format!("cannot increment '{path}' by a non-numeric value")));
            }
        }
    }

    Ok(())
}

/// Applies a validated `update` to `document`, returning whether anything changed.
///
/// An existing `_id` cannot change. A document without one, such as an upsert
/// seed, may have it assigned.
pub(crate) fn apply(document: &mut Document, update: &Document) -> DabaResult<bool> {
    let before = document.clone();
    let id_locked = before.contains_key("_id");

    for (operator, fields) in update {
        let Bson::Document(fields) = fields else {
            continue;
        };

        for (path, value) in fields {
            let next = match operator.as_str() {
                "$set" => Some(value.clone()),
                "$inc" => Some(add(lookup(document, path), value, path)?),
                _ => None,
            };

            if id_locked && (path == "_id" || path.starts_with("_id.")) {
                let unchanged = match (&next, lookup(document, path)) {
                    (Some(next), Some(current)) => values_equal(next, current),
                    _ => false,
                };
                if !unchanged {
                    return Err(DabaError::Operation(
                        "performing an update on the path '_id' would modify the immutable field '_id'".to_string(),
                    ));
                }
            }

            match next {
                Some(next) => set_path(document, path, next)?,
                None => unset_path(document, path),
            }
        }
    }

    Ok(*document != before)
}

/// The document an upsert starts from: the filter's equality conditions.
pub(crate) fn upsert_seed(filter: &Document) -> DabaResult<Document> {
    let mut seed = Document::new();

    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }

        let value = match condition {
            Bson::Document(operators) if operators.keys().next().is_some_and(|k| k.starts_with('$')) => {
                match operators.get("$eq") {
                    Some(value) => value.clone(),
                    None => continue,
                }
            }
            value => value.clone(),
        };

        set_path(&mut seed, key, value)?;
    }

    Ok(seed)
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn add(current: Option<&Bson>, by: &Bson, path: &str) -> DabaResult<Bson> {
    let overflow = || DabaError::Operation(format!("integer overflow incrementing '{path}'"));

    match (current, by) {
        (None, by) => Ok(by.clone()),
        (Some(Bson::Int32(a)), Bson::Int32(b)) => Ok(a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or(Bson::Int64(i64::from(*a) + i64::from(*b)))),
        (Some(Bson::Int32(a)), Bson::Int64(b)) => i64::from(*a).checked_add(*b).map(Bson::Int64).ok_or_else(overflow),
        (Some(Bson::Int64(a)), Bson::Int32(b)) => a.checked_add(i64::from(*b)).map(Bson::Int64).ok_or_else(overflow),
        (Some(Bson::Int64(a)), Bson::Int64(b)) => a.checked_add(*b).map(Bson::Int64).ok_or_else(overflow),
        (Some(current), by) if is_number(current) => Ok(Bson::Double(as_f64(current) + as_f64(by))),
        (Some(current), _) => Err(DabaError::Operation(format!(
            "cannot apply $inc to '{path}' of non-numeric type {:?}",
            current.element_type()
        ))),
    }
}

fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(n) => f64::from(*n),
        Bson::Int64(n) => *n as f64,
        Bson::Double(n) => *n,
        _ => 0.0,
    }
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> DabaResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            if !document.contains_key(head) {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                _ => Err(DabaError::Operation(format!(
                    "cannot create field '{rest}' in element '{head}': it is not a document"
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

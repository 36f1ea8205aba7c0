//! Aggregation stages, sorting and projection over in-memory documents.

use bson::{Bson, Document};

use daba_core::error::{DabaError, DabaResult};

use crate::evaluator::{Comparable, DocumentEvaluator, lookup, truthy};

/// Runs `pipeline` over `documents`.
///
/// Supported stages: `$match`, `$sort`, `$skip`, `$limit`, `$project`, `$count`.
pub(crate) fn run(mut documents: Vec<Document>, pipeline: &[Document]) -> DabaResult<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(DabaError::Operation(
                "a pipeline stage must contain exactly one field".to_string(),
            ));
        };

        documents = match name.as_str() {
            "$match" => DocumentEvaluator::filter_documents(&documents, stage_document(name, spec)?)?,
            "$sort" => {
                sort_documents(&mut documents, stage_document(name, spec)?)?;
                documents
            }
            "$skip" => documents
                .into_iter()
                .skip(stage_count(name, spec)?)
                .collect(),
            "$limit" => match stage_count(name, spec)? {
                0 => return Err(DabaError::Operation("the $limit stage must be positive".to_string())),
                n => documents.into_iter().take(n).collect(),
            },
            "$project" => {
                let projection = stage_document(name, spec)?;
                documents
                    .iter()
                    .map(|document| project(document, projection))
                    .collect::<DabaResult<_>>()?
            }
            "$count" => {
                let Bson::String(field) = spec else {
                    return Err(DabaError::Operation("the $count stage needs a field name".to_string()));
                };
                match documents.len() {
                    0 => Vec::new(),
                    n => {
                        let mut counted = Document::new();
                        counted.insert(field.as_str(), n as i64);
                        vec![counted]
                    }
                }
            }
            other => return Err(DabaError::Operation(format!("unsupported pipeline stage: {other}"))),
        };
    }

    Ok(documents)
}

/// Stable sort by a `{ field: 1 | -1, ... }` specification.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) -> DabaResult<()> {
    let mut keys = Vec::with_capacity(spec.len());
    for (field, direction) in spec {
        let ascending = match direction {
            Bson::Int32(1) | Bson::Int64(1) => true,
            Bson::Int32(-1) | Bson::Int64(-1) => false,
            Bson::Double(d) if *d == 1.0 => true,
            Bson::Double(d) if *d == -1.0 => false,
            _ => {
                return Err(DabaError::Operation(format!(
                    "sort direction for '{field}' must be 1 or -1"
                )));
            }
        };
        keys.push((field.as_str(), ascending));
    }

    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(field, ascending)| {
                let left = lookup(a, field).unwrap_or(&Bson::Null);
                let right = lookup(b, field).unwrap_or(&Bson::Null);
                let ordering = Comparable::from(left).sort_cmp(&Comparable::from(right));
                if *ascending { ordering } else { ordering.reverse() }
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(())
}

/// Applies an inclusion or exclusion projection to top-level fields.
///
/// `_id` is kept unless explicitly excluded. Mixing inclusions and
/// exclusions of other fields is an error.
pub(crate) fn project(document: &Document, projection: &Document) -> DabaResult<Document> {
    let mut include = None;
    for (field, flag) in projection.iter().filter(|(field, _)| field.as_str() != "_id") {
        let wanted = truthy(flag);
        match include {
            Some(mode) if mode != wanted => {
                return Err(DabaError::Operation(format!(
                    "cannot mix inclusion and exclusion in projection (field '{field}')"
                )));
            }
            _ => include = Some(wanted),
        }
    }
    let keep_id = projection.get("_id").is_none_or(truthy);

    let projected = document
        .iter()
        .filter(|(field, _)| match field.as_str() {
            "_id" => keep_id,
            field => match include {
                Some(true) => projection.get(field).is_some_and(truthy),
                Some(false) => projection.get(field).is_none(),
                None => true,
            },
        })
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();

    Ok(projected)
}

fn stage_document<'s>(name: &str, spec: &'s Bson) -> DabaResult<&'s Document> {
    spec.as_document()
        .ok_or_else(|| DabaError::Operation(format!("the {name} stage needs a document")))
}

fn stage_count(name: &str, spec: &Bson) -> DabaResult<usize> {
    let count = match spec {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(n) if n.fract() == 0.0 => *n as i64,
        _ => -1,
    };

    usize::try_from(count)
        .map_err(|_| DabaError::Operation(format!("the {name} stage needs a non-negative integer")))
}

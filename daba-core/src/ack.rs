//! Acknowledgements returned by write verbs.
//!
//! These mirror what the server reports for each write so that callers can
//! inspect generated ids and matched/modified counts without depending on a
//! particular driver.

use std::collections::HashMap;

use bson::Bson;
use serde::{Deserialize, Serialize};

/// Acknowledgement of a single-document insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertAck {
    /// The `_id` of the inserted document, generated by the server if the document had none.
    pub inserted_id: Bson,
}

/// Acknowledgement of a multi-document insert.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InsertManyAck {
    /// The `_id` of each inserted document, keyed by its position in the input.
    pub inserted_ids: HashMap<usize, Bson>,
}

impl InsertManyAck {
    /// The inserted ids in input order.
    pub fn ids_in_order(&self) -> Vec<&Bson> {
        let mut ids = self.inserted_ids.iter().collect::<Vec<_>>();
        ids.sort_by_key(|(position, _)| **position);
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

/// Acknowledgement of an update.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateAck {
    /// Number of documents that matched the filter.
    pub matched_count: u64,
    /// Number of documents actually changed.
    pub modified_count: u64,
    /// The `_id` of the document inserted by an upsert, if one was.
    pub upserted_id: Option<Bson>,
}

/// Acknowledgement of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteAck {
    /// Number of documents removed.
    pub deleted_count: u64,
}

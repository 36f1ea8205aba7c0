//! Index creation on a bound collection.
//!
//! Index creation is a passthrough: the key specification and a structured
//! [`IndexOptions`] record are handed to the backend, and the server decides
//! whether the index already exists. Re-issuing an identical definition is
//! harmless and returns the same index name.
//!
//! # Example
//!
//! ```ignore
//! use daba::prelude::*;
//!
//! let users = registry.collection("users");
//!
//! // { username: 1 }, unique
//! let name = users.create_index("username", IndexOptions::unique()).await?;
//! assert_eq!(name, "username_1");
//!
//! // { first_name: 1, last_name: -1 }
//! users
//!     .create_index(
//!         vec![("first_name", IndexDirection::Ascending), ("last_name", IndexDirection::Descending)],
//!         IndexOptions::default(),
//!     )
//!     .await?;
//! ```

use std::time::Duration;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    backend::Connector,
    collection::Collection,
    error::DabaResult,
    operation::{Operation, Reply},
};

/// Sort order of one indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexDirection {
    /// `1`
    Ascending,
    /// `-1`
    Descending,
}

impl IndexDirection {
    /// The numeric form used in key documents and index names.
    pub fn as_i32(self) -> i32 {
        match self {
            IndexDirection::Ascending => 1,
            IndexDirection::Descending => -1,
        }
    }
}

/// The fields an index covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKeys {
    /// A single ascending field.
    Single(String),
    /// An ordered list of fields for a compound index.
    Compound(Vec<(String, IndexDirection)>),
}

impl IndexKeys {
    /// The fields and their directions, in index order.
    pub fn fields(&self) -> Vec<(&str, IndexDirection)> {
        match self {
            IndexKeys::Single(field) => vec![(field.as_str(), IndexDirection::Ascending)],
            IndexKeys::Compound(fields) => fields
                .iter()
                .map(|(field, direction)| (field.as_str(), *direction))
                .collect(),
        }
    }

    /// The key document sent to the server, e.g. `{ "first_name": 1, "last_name": -1 }`.
    pub fn to_document(&self) -> Document {
        self.fields()
            .into_iter()
            .map(|(field, direction)| (field.to_string(), Bson::Int32(direction.as_i32())))
            .collect()
    }

    /// The name the server assigns when none is given: `field_dir` pairs joined by `_`.
    pub fn default_name(&self) -> String {
        self.fields()
            .into_iter()
            .map(|(field, direction)| format!("{field}_{}", direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl From<&str> for IndexKeys {
    fn from(field: &str) -> Self {
        IndexKeys::Single(field.to_string())
    }
}

impl From<String> for IndexKeys {
    fn from(field: String) -> Self {
        IndexKeys::Single(field)
    }
}

impl From<Vec<(&str, IndexDirection)>> for IndexKeys {
    fn from(fields: Vec<(&str, IndexDirection)>) -> Self {
        IndexKeys::Compound(
            fields
                .into_iter()
                .map(|(field, direction)| (field.to_string(), direction))
                .collect(),
        )
    }
}

impl From<Vec<(String, IndexDirection)>> for IndexKeys {
    fn from(fields: Vec<(String, IndexDirection)>) -> Self {
        IndexKeys::Compound(fields)
    }
}

/// Every index option this layer forwards to the server.
///
/// Unset options are left to the server's defaults. `unique` defaults to `false`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexOptions {
    /// Reject documents that duplicate an existing key.
    pub unique: bool,
    /// Explicit index name; the server derives one from the keys otherwise.
    pub name: Option<String>,
    /// Only index documents that contain the indexed fields.
    pub sparse: Option<bool>,
    /// Expire documents this long after the indexed date field (TTL index).
    pub expire_after: Option<Duration>,
    /// Only index documents matching this filter.
    pub partial_filter_expression: Option<Document>,
    /// Keep the index maintained but invisible to the query planner.
    pub hidden: Option<bool>,
}

impl IndexOptions {
    /// Options for a unique index.
    pub fn unique() -> Self {
        Self { unique: true, ..Self::default() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = Some(sparse);
        self
    }

    pub fn with_expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = Some(expire_after);
        self
    }

    pub fn with_partial_filter_expression(mut self, filter: Document) -> Self {
        self.partial_filter_expression = Some(filter);
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    /// The name the index will be created under for `keys`.
    pub fn resolved_name(&self, keys: &IndexKeys) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| keys.default_name())
    }
}

impl<'r, C: Connector> Collection<'r, C> {
    /// Creates an index on this collection and returns its name.
    ///
    /// # Arguments
    ///
    /// * `keys` - A field name, or an ordered list of `(field, direction)` pairs
    /// * `options` - Index options; [`IndexOptions::default()`] creates a non-unique index
    ///
    /// # Errors
    ///
    /// Returns the backend's error, after logging it, if the index cannot be
    /// created (e.g. existing documents violate a unique constraint).
    pub async fn create_index(
        &self,
        keys: impl Into<IndexKeys>,
        options: IndexOptions,
    ) -> DabaResult<String> {
        self.executor()
            .run(Operation::CreateIndex { keys: keys.into(), options }, Reply::into_index_name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn single_field_keys() {
        let keys = IndexKeys::from("username");

        assert_eq!(keys.to_document(), doc! { "username": 1 });
        assert_eq!(keys.default_name(), "username_1");
    }

    #[test]
    fn compound_keys_keep_order_and_direction() {
        let keys = IndexKeys::from(vec![
            ("first_name", IndexDirection::Ascending),
            ("last_name", IndexDirection::Descending),
        ]);

        assert_eq!(keys.to_document(), doc! { "first_name": 1, "last_name": -1 });
        assert_eq!(keys.default_name(), "first_name_1_last_name_-1");
    }

    #[test]
    fn options_default_to_non_unique() {
        let options = IndexOptions::default();

        assert!(!options.unique);
        assert_eq!(options.resolved_name(&"email".into()), "email_1");
        assert_eq!(
            IndexOptions::unique().with_name("by_email").resolved_name(&"email".into()),
            "by_email"
        );
    }
}

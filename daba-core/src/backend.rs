//! Connection pool abstraction for the document database.
//!
//! This module defines the traits that sit between the verb surface and a
//! concrete database driver. A [`Backend`] is one live connection pool: it
//! exposes exactly the primitives the verbs need, each addressed by a
//! [`Namespace`]. A [`Connector`] opens backends from [`PoolSettings`], which
//! lets the [`ClientRegistry`](crate::registry::ClientRegistry) replace the
//! active pool at runtime.
//!
//! # Traits
//!
//! - [`Backend`]: The primitive operations of a pooled connection
//! - [`Connector`]: Factory that opens a [`Backend`] for a connection string
//!
//! # Examples
//!
//! ```ignore
//! use daba::backend::{Backend, Connector, Namespace, PoolSettings};
//! use bson::doc;
//!
//! let pool = connector.connect(&PoolSettings::new("mongodb://localhost:27017", 100)).await?;
//! let users = Namespace::new("app", "users");
//!
//! pool.insert_one(&users, doc! { "name": "Alice" }).await?;
//! assert_eq!(pool.count_documents(&users, doc! {}).await?, 1);
//! ```

use std::fmt;

use async_trait::async_trait;
use bson::Document;

use crate::{
    ack::{DeleteAck, InsertAck, InsertManyAck, UpdateAck},
    error::DabaResult,
    index::{IndexKeys, IndexOptions},
    operation::Limiter,
    stream::DocumentStream,
};

/// A `(database, collection)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { database: database.into(), collection: collection.into() }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// What a [`Connector`] needs to open a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Connection string of the database server.
    pub connection_url: String,
    /// Upper bound on pooled connections.
    pub max_pool_size: u32,
}

impl PoolSettings {
    pub fn new(connection_url: impl Into<String>, max_pool_size: u32) -> Self {
        Self { connection_url: connection_url.into(), max_pool_size }
    }

    /// The connection string with any `user:password@` part masked, for logging.
    pub fn redacted_url(&self) -> String {
        redact_url(&self.connection_url)
    }
}

/// Masks the credentials of a connection string.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());

    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => url.to_string(),
    }
}

/// The primitive operations of one pooled connection to a document database.
///
/// Implementers wrap a driver client. Every method is a single request/response
/// against the server; implementations must not retry, and must not add their
/// own timeouts on top of the driver's.
///
/// # Thread Safety
///
/// A backend is shared by every caller of the registry at once, so it must be
/// `Send + Sync` and handle concurrent calls itself (drivers do this through
/// their own connection pool).
///
/// # Error Handling
///
/// Methods return [`DabaResult<T>`](crate::error::DabaResult). Implementers
/// should map network, DNS and authentication failures to
/// [`DabaError::Connection`](crate::error::DabaError::Connection), server-side
/// rejections to [`DabaError::Operation`](crate::error::DabaError::Operation),
/// and any call after [`close`](Backend::close) to
/// [`DabaError::PoolClosed`](crate::error::DabaError::PoolClosed).
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Streams the documents matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `namespace` - The collection to read
    /// * `filter` - The query predicate; an empty document matches everything
    /// * `limiter` - Optional projection and document cap
    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        limiter: Limiter,
    ) -> DabaResult<DocumentStream>;

    /// Runs an aggregation pipeline and streams its output.
    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Vec<Document>,
    ) -> DabaResult<DocumentStream>;

    /// Inserts one document, assigning an `_id` if it has none.
    async fn insert_one(&self, namespace: &Namespace, document: Document) -> DabaResult<InsertAck>;

    /// Inserts several documents in order.
    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> DabaResult<InsertManyAck>;

    /// Applies `update` to the first document matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `update` - A modifier document such as `{ "$set": { .. } }`
    /// * `upsert` - Insert a new document when nothing matches
    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck>;

    /// Applies `update` to every document matching `filter`.
    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck>;

    /// Returns the first document matching `filter`, or `None`.
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> DabaResult<Option<Document>>;

    /// Atomically updates the first document matching `filter` and returns it
    /// as it is *after* the update, or `None` if nothing matched.
    async fn find_one_and_update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> DabaResult<Option<Document>>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck>;

    /// Deletes every document matching `filter`.
    async fn delete_many(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck>;

    /// Counts the documents matching `filter`.
    async fn count_documents(&self, namespace: &Namespace, filter: Document) -> DabaResult<u64>;

    /// Creates an index and returns its name.
    ///
    /// Creating an index whose definition already exists must succeed and
    /// return the existing name.
    async fn create_index(
        &self,
        namespace: &Namespace,
        keys: IndexKeys,
        options: IndexOptions,
    ) -> DabaResult<String>;

    /// Closes the pool, releasing its connections.
    ///
    /// Implementations may wait for outstanding cursors to be dropped.
    async fn close(&self) -> DabaResult<()>;
}

/// Opens [`Backend`] pools.
///
/// The registry keeps its connector for its whole lifetime and calls it again
/// on every swap, so a connector is typically a small, cheap value.
#[async_trait]
pub trait Connector: Send + Sync {
    type Backend: Backend;

    /// Opens a pool against `settings.connection_url` sized to `settings.max_pool_size`.
    ///
    /// # Errors
    ///
    /// Returns [`DabaError::Configuration`](crate::error::DabaError::Configuration)
    /// for an unusable connection string, or
    /// [`DabaError::Connection`](crate::error::DabaError::Connection) if the
    /// server cannot be reached at open time.
    async fn connect(&self, settings: &PoolSettings) -> DabaResult<Self::Backend>;
}

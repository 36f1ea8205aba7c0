//! The verb surface of a bound collection.
//!
//! A [`Collection`] names one `(database, collection)` pair and borrows the
//! [`ClientRegistry`] it was created from. It is cheap to build and meant to be
//! short-lived: create one per logical request and drop it afterwards.
//!
//! Every verb prepares driver-native arguments (defaulting an omitted filter
//! to `{}` and wrapping field maps in their update modifier) and routes them
//! through the [`OperationExecutor`]:
//!
//! | Verb                | Filter        | Update sent                    | Returns              |
//! |---------------------|---------------|--------------------------------|----------------------|
//! | `get`               | `None` → `{}` |                                | [`DocumentStream`]   |
//! | `find`              | pipeline      |                                | [`DocumentStream`]   |
//! | `put` / `put_many`  |               |                                | insert ack           |
//! | `set`               | as given      | `{ "$set": fields }`           | [`UpdateAck`]        |
//! | `inc`               | as given      | `{ "$inc": fields }`           | [`UpdateAck`]        |
//! | `set_many`          | as given      | `{ "$set": fields }`, all      | [`UpdateAck`]        |
//! | `get_one`           | as given      |                                | `Option<Document>`   |
//! | `get_after_count`   | as given      | `{ "$inc": { counter: 1 } }`   | `Option<Document>`   |
//! | `delete_one/_many`  | as given      |                                | [`DeleteAck`]        |
//! | `remove_element`    | as given      | `{ "$unset": fields }`, all    | [`UpdateAck`]        |
//! | `count`             | `None` → `{}` |                                | `u64`                |
//!
//! # Example
//!
//! ```ignore
//! use daba::prelude::*;
//!
//! let users = registry.collection("users");
//!
//! users.put(doc! { "_id": 1, "name": "y" }).await?;
//! let ack = users.set(doc! { "_id": 1 }, doc! { "name": "x" }).await?;
//! assert_eq!((ack.matched_count, ack.modified_count), (1, 1));
//!
//! let everyone = users.get(None, None).await?.collect_all().await?;
//! ```

use bson::{Document, doc};

use crate::{
    ack::{DeleteAck, InsertAck, InsertManyAck, UpdateAck},
    backend::{Connector, Namespace},
    error::DabaResult,
    executor::OperationExecutor,
    operation::{Limiter, Operation, Reply},
    registry::ClientRegistry,
    stream::DocumentStream,
};

/// A handle on one collection, bound to a registry's shared pool.
#[derive(Debug)]
pub struct Collection<'r, C: Connector> {
    registry: &'r ClientRegistry<C>,
    namespace: Namespace,
}

impl<'r, C: Connector> Collection<'r, C> {
    /// Binds `namespace` to `registry`.
    pub fn new(registry: &'r ClientRegistry<C>, namespace: Namespace) -> Self {
        Self { registry, namespace }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        self.namespace.collection()
    }

    /// Returns the database this collection lives in.
    pub fn database(&self) -> &str {
        self.namespace.database()
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub(crate) fn executor(&self) -> OperationExecutor<'_, C> {
        OperationExecutor::new(self.registry, &self.namespace)
    }

    /// Streams the documents matching `filter`; `None` matches every document.
    ///
    /// # Arguments
    ///
    /// * `filter` - The query predicate
    /// * `limiter` - Optional projection and document cap
    pub async fn get(
        &self,
        filter: Option<Document>,
        limiter: Option<Limiter>,
    ) -> DabaResult<DocumentStream> {
        self.executor()
            .run(
                Operation::Find {
                    filter: filter.unwrap_or_default(),
                    limiter: limiter.unwrap_or_default(),
                },
                Reply::into_documents,
            )
            .await
    }

    /// Runs an aggregation pipeline, passed to the server as-is.
    pub async fn find(&self, pipeline: Vec<Document>) -> DabaResult<DocumentStream> {
        self.executor()
            .run(Operation::Aggregate { pipeline }, Reply::into_documents)
            .await
    }

    /// Inserts one document.
    pub async fn put(&self, document: Document) -> DabaResult<InsertAck> {
        self.executor()
            .run(Operation::InsertOne { document }, Reply::into_inserted)
            .await
    }

    /// Inserts several documents in order.
    pub async fn put_many(&self, documents: Vec<Document>) -> DabaResult<InsertManyAck> {
        self.executor()
            .run(Operation::InsertMany { documents }, Reply::into_inserted_many)
            .await
    }

    /// Assigns `fields` on the first document matching `filter`.
    pub async fn set(&self, filter: Document, fields: Document) -> DabaResult<UpdateAck> {
        self.update_one(filter, doc! { "$set": fields }, false).await
    }

    /// Like [`set`](Self::set), inserting a new document when nothing matches.
    pub async fn upsert_set(&self, filter: Document, fields: Document) -> DabaResult<UpdateAck> {
        self.update_one(filter, doc! { "$set": fields }, true).await
    }

    /// Increments numeric `fields` on the first document matching `filter`.
    pub async fn inc(&self, filter: Document, fields: Document) -> DabaResult<UpdateAck> {
        self.update_one(filter, doc! { "$inc": fields }, false).await
    }

    /// Like [`inc`](Self::inc), inserting a new document when nothing matches.
    pub async fn upsert_inc(&self, filter: Document, fields: Document) -> DabaResult<UpdateAck> {
        self.update_one(filter, doc! { "$inc": fields }, true).await
    }

    /// Assigns `fields` on every document matching `filter`.
    pub async fn set_many(&self, filter: Document, fields: Document) -> DabaResult<UpdateAck> {
        self.update_many(filter, doc! { "$set": fields }, false).await
    }

    /// Like [`set_many`](Self::set_many), inserting a new document when nothing matches.
    pub async fn upsert_set_many(
        &self,
        filter: Document,
        fields: Document,
    ) -> DabaResult<UpdateAck> {
        self.update_many(filter, doc! { "$set": fields }, true).await
    }

    /// Returns the first document matching `filter`, or `None`.
    ///
    /// Only the limiter's projection applies; a single document is returned at most.
    pub async fn get_one(
        &self,
        filter: Document,
        limiter: Option<Limiter>,
    ) -> DabaResult<Option<Document>> {
        self.executor()
            .run(
                Operation::FindOne {
                    filter,
                    projection: limiter.and_then(|limiter| limiter.projection),
                },
                Reply::into_document,
            )
            .await
    }

    /// Increments `counter` by one on the first document matching `filter` and
    /// returns that document as it is after the increment.
    ///
    /// Returns `None` when no document matches; nothing is inserted.
    pub async fn get_after_count(
        &self,
        filter: Document,
        counter: &str,
    ) -> DabaResult<Option<Document>> {
        self.executor()
            .run(
                Operation::FindOneAndUpdate {
                    filter,
                    update: doc! { "$inc": { counter: 1 } },
                },
                Reply::into_document,
            )
            .await
    }

    /// Deletes the first document matching `filter`.
    pub async fn delete_one(&self, filter: Document) -> DabaResult<DeleteAck> {
        self.executor()
            .run(Operation::DeleteOne { filter }, Reply::into_deleted)
            .await
    }

    /// Deletes every document matching `filter`.
    pub async fn delete_many(&self, filter: Document) -> DabaResult<DeleteAck> {
        self.executor()
            .run(Operation::DeleteMany { filter }, Reply::into_deleted)
            .await
    }

    /// Removes `fields` from every document matching `filter`.
    ///
    /// The values in `fields` are ignored by the server; only the keys matter.
    pub async fn remove_element(&self, filter: Document, fields: Document) -> DabaResult<UpdateAck> {
        self.update_many(filter, doc! { "$unset": fields }, false).await
    }

    /// Counts the documents matching `filter`; `None` counts every document.
    pub async fn count(&self, filter: Option<Document>) -> DabaResult<u64> {
        self.executor()
            .run(
                Operation::CountDocuments { filter: filter.unwrap_or_default() },
                Reply::into_count,
            )
            .await
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        self.executor()
            .run(Operation::UpdateOne { filter, update, upsert }, Reply::into_updated)
            .await
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        self.executor()
            .run(Operation::UpdateMany { filter, update, upsert }, Reply::into_updated)
            .await
    }
}

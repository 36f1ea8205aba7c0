//! The table of primitive operations every verb is built from.
//!
//! A verb never calls the backend directly. It prepares an [`Operation`] (the
//! primitive plus its driver-native arguments, modifier wrapping included) and
//! hands it to the [`OperationExecutor`](crate::executor::OperationExecutor).
//! [`Operation::dispatch`] is the one place where a primitive is mapped onto a
//! [`Backend`] method, and [`Reply`] carries the result back in a shape the
//! verb can unpack.

use std::fmt;

use bson::Document;

use crate::{
    ack::{DeleteAck, InsertAck, InsertManyAck, UpdateAck},
    backend::{Backend, Namespace},
    error::{DabaError, DabaResult},
    index::{IndexKeys, IndexOptions},
    stream::DocumentStream,
};

/// Optional narrowing of a read: which fields come back, and how many documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Limiter {
    /// Field selection, e.g. `{ "name": 1, "_id": 0 }`.
    pub projection: Option<Document>,
    /// Maximum number of documents to return.
    pub limit: Option<i64>,
}

impl Limiter {
    /// Restricts the fields returned.
    pub fn fields(projection: Document) -> Self {
        Self { projection: Some(projection), limit: None }
    }

    /// Caps the number of documents returned.
    pub fn first(limit: i64) -> Self {
        Self { projection: None, limit: Some(limit) }
    }

    pub fn with_projection(mut self, projection: Document) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl From<Document> for Limiter {
    fn from(projection: Document) -> Self {
        Limiter::fields(projection)
    }
}

/// The tag of an [`Operation`], used for logging and reply checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Find,
    Aggregate,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    FindOne,
    FindOneAndUpdate,
    DeleteOne,
    DeleteMany,
    CountDocuments,
    CreateIndex,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Find => "find",
            OperationKind::Aggregate => "aggregate",
            OperationKind::InsertOne => "insert_one",
            OperationKind::InsertMany => "insert_many",
            OperationKind::UpdateOne => "update_one",
            OperationKind::UpdateMany => "update_many",
            OperationKind::FindOne => "find_one",
            OperationKind::FindOneAndUpdate => "find_one_and_update",
            OperationKind::DeleteOne => "delete_one",
            OperationKind::DeleteMany => "delete_many",
            OperationKind::CountDocuments => "count_documents",
            OperationKind::CreateIndex => "create_index",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive operation with its prepared arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Find { filter: Document, limiter: Limiter },
    Aggregate { pipeline: Vec<Document> },
    InsertOne { document: Document },
    InsertMany { documents: Vec<Document> },
    UpdateOne { filter: Document, update: Document, upsert: bool },
    UpdateMany { filter: Document, update: Document, upsert: bool },
    FindOne { filter: Document, projection: Option<Document> },
    FindOneAndUpdate { filter: Document, update: Document },
    DeleteOne { filter: Document },
    DeleteMany { filter: Document },
    CountDocuments { filter: Document },
    CreateIndex { keys: IndexKeys, options: IndexOptions },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Find { .. } => OperationKind::Find,
            Operation::Aggregate { .. } => OperationKind::Aggregate,
            Operation::InsertOne { .. } => OperationKind::InsertOne,
            Operation::InsertMany { .. } => OperationKind::InsertMany,
            Operation::UpdateOne { .. } => OperationKind::UpdateOne,
            Operation::UpdateMany { .. } => OperationKind::UpdateMany,
            Operation::FindOne { .. } => OperationKind::FindOne,
            Operation::FindOneAndUpdate { .. } => OperationKind::FindOneAndUpdate,
            Operation::DeleteOne { .. } => OperationKind::DeleteOne,
            Operation::DeleteMany { .. } => OperationKind::DeleteMany,
            Operation::CountDocuments { .. } => OperationKind::CountDocuments,
            Operation::CreateIndex { .. } => OperationKind::CreateIndex,
        }
    }

    /// Runs the operation against `backend`.
    pub async fn dispatch<B: Backend>(self, backend: &B, namespace: &Namespace) -> DabaResult<Reply> {
        match self {
            Operation::Find { filter, limiter } => backend
                .find(namespace, filter, limiter)
                .await
                .map(Reply::Documents),
            Operation::Aggregate { pipeline } => backend
                .aggregate(namespace, pipeline)
                .await
                .map(Reply::Documents),
            Operation::InsertOne { document } => backend
                .insert_one(namespace, document)
                .await
                .map(Reply::Inserted),
            Operation::InsertMany { documents } => backend
                .insert_many(namespace, documents)
                .await
                .map(Reply::InsertedMany),
            Operation::UpdateOne { filter, update, upsert } => backend
                .update_one(namespace, filter, update, upsert)
                .await
                .map(Reply::Updated),
            Operation::UpdateMany { filter, update, upsert } => backend
                .update_many(namespace, filter, update, upsert)
                .await
                .map(Reply::Updated),
            Operation::FindOne { filter, projection } => backend
                .find_one(namespace, filter, projection)
                .await
                .map(Reply::Document),
            Operation::FindOneAndUpdate { filter, update } => backend
                .find_one_and_update(namespace, filter, update)
                .await
                .map(Reply::Document),
            Operation::DeleteOne { filter } => backend
                .delete_one(namespace, filter)
                .await
                .map(Reply::Deleted),
            Operation::DeleteMany { filter } => backend
                .delete_many(namespace, filter)
                .await
                .map(Reply::Deleted),
            Operation::CountDocuments { filter } => backend
                .count_documents(namespace, filter)
                .await
                .map(Reply::Count),
            Operation::CreateIndex { keys, options } => backend
                .create_index(namespace, keys, options)
                .await
                .map(Reply::IndexName),
        }
    }
}

/// The result of a dispatched [`Operation`].
#[derive(Debug)]
pub enum Reply {
    Documents(DocumentStream),
    Inserted(InsertAck),
    InsertedMany(InsertManyAck),
    Updated(UpdateAck),
    Document(Option<Document>),
    Deleted(DeleteAck),
    Count(u64),
    IndexName(String),
}

impl Reply {
    fn shape(&self) -> &'static str {
        match self {
            Reply::Documents(_) => "documents",
            Reply::Inserted(_) => "inserted",
            Reply::InsertedMany(_) => "inserted_many",
            Reply::Updated(_) => "updated",
            Reply::Document(_) => "document",
            Reply::Deleted(_) => "deleted",
            Reply::Count(_) => "count",
            Reply::IndexName(_) => "index_name",
        }
    }

    fn mismatch(self, expected: OperationKind) -> DabaError {
        DabaError::UnexpectedReply { operation: expected.as_str(), reply: self.shape() }
    }

    pub fn into_documents(self) -> DabaResult<DocumentStream> {
        match self {
            Reply::Documents(stream) => Ok(stream),
            other => Err(other.mismatch(OperationKind::Find)),
        }
    }

    pub fn into_inserted(self) -> DabaResult<InsertAck> {
        match self {
            Reply::Inserted(ack) => Ok(ack),
            other => Err(other.mismatch(OperationKind::InsertOne)),
        }
    }

    pub fn into_inserted_many(self) -> DabaResult<InsertManyAck> {
        match self {
            Reply::InsertedMany(ack) => Ok(ack),
            other => Err(other.mismatch(OperationKind::InsertMany)),
        }
    }

    pub fn into_updated(self) -> DabaResult<UpdateAck> {
        match self {
            Reply::Updated(ack) => Ok(ack),
            other => Err(other.mismatch(OperationKind::UpdateOne)),
        }
    }

    pub fn into_document(self) -> DabaResult<Option<Document>> {
        match self {
            Reply::Document(document) => Ok(document),
            other => Err(other.mismatch(OperationKind::FindOne)),
        }
    }

    pub fn into_deleted(self) -> DabaResult<DeleteAck> {
        match self {
            Reply::Deleted(ack) => Ok(ack),
            other => Err(other.mismatch(OperationKind::DeleteOne)),
        }
    }

    pub fn into_count(self) -> DabaResult<u64> {
        match self {
            Reply::Count(count) => Ok(count),
            other => Err(other.mismatch(OperationKind::CountDocuments)),
        }
    }

    pub fn into_index_name(self) -> DabaResult<String> {
        match self {
            Reply::IndexName(name) => Ok(name),
            other => Err(other.mismatch(OperationKind::CreateIndex)),
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn kinds_have_stable_names() {
        let op = Operation::FindOneAndUpdate {
            filter: doc! {},
            update: doc! { "$inc": { "n": 1 } },
        };

        assert_eq!(op.kind(), OperationKind::FindOneAndUpdate);
        assert_eq!(op.kind().to_string(), "find_one_and_update");
    }

    #[test]
    fn reply_extractors_reject_other_shapes() {
        assert_eq!(Reply::Count(3).into_count(), Ok(3));
        assert_eq!(
            Reply::Count(3).into_index_name(),
            Err(DabaError::UnexpectedReply { operation: "create_index", reply: "count" })
        );
    }

    #[test]
    fn limiter_from_projection() {
        let limiter = Limiter::from(doc! { "name": 1 }).with_limit(5);

        assert_eq!(limiter.projection, Some(doc! { "name": 1 }));
        assert_eq!(limiter.limit, Some(5));
    }
}

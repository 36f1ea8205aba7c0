use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{
        ClientOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions,
        IndexOptions as MongoIndexOptions, ReturnDocument,
    },
};

use daba_core::{
    ack::{DeleteAck, InsertAck, InsertManyAck, UpdateAck},
    backend::{Backend, Connector, Namespace, PoolSettings},
    error::{DabaError, DabaResult},
    index::{IndexKeys, IndexOptions},
    operation::Limiter,
    stream::DocumentStream,
};

use crate::error::{classify, classify_setup};


/// Opens [`MongoDbPool`]s with the official async driver.
///
/// The driver connects lazily: `connect` only validates the connection
/// string and sizes the pool, and the first operation performs server
/// selection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Backend = MongoDbPool;

    async fn connect(&self, settings: &PoolSettings) -> DabaResult<Self::Backend> {
        if settings.max_pool_size == 0 {
            return Err(DabaError::Configuration("max pool size must be positive".to_string()));
        }

        let mut options = ClientOptions::parse(&settings.connection_url)
            .await
            .map_err(classify_setup)?;
        options.max_pool_size = Some(settings.max_pool_size);

        let client = Client::with_options(options).map_err(classify_setup)?;

        tracing::debug!(
            url = %settings.redacted_url(),
            max_pool_size = settings.max_pool_size,
            "created mongodb client"
        );

        Ok(MongoDbPool::new(client, settings.clone()))
    }
}

/// One driver [`Client`] and its connection pool.
#[derive(Debug)]
pub struct MongoDbPool {
    client: Client,
    settings: PoolSettings,
    closed: AtomicBool,
}

impl MongoDbPool {
    pub fn new(client: Client, settings: PoolSettings) -> Self {
        Self { client, settings, closed: AtomicBool::new(false) }
    }

    pub fn max_pool_size(&self) -> u32 {
        self.settings.max_pool_size
    }

    fn get_collection(&self, namespace: &Namespace) -> DabaResult<MongoCollection<Document>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DabaError::PoolClosed(self.settings.redacted_url()));
        }

        Ok(self.client
            .database(namespace.database())
            .collection(namespace.collection()))
    }
}

#[async_trait]
impl Backend for MongoDbPool {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        limiter: Limiter,
    ) -> DabaResult<DocumentStream> {
        let cursor = self.get_collection(namespace)?
            .find(filter)
            .with_options(find_options(limiter))
            .await
            .map_err(classify)?;

        Ok(DocumentStream::new(cursor.map_err(classify)))
    }

    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Vec<Document>,
    ) -> DabaResult<DocumentStream> {
        let cursor = self.get_collection(namespace)?
            .aggregate(pipeline)
            .await
            .map_err(classify)?;

        Ok(DocumentStream::new(cursor.map_err(classify)))
    }

    async fn insert_one(&self, namespace: &Namespace, document: Document) -> DabaResult<InsertAck> {
        let result = self.get_collection(namespace)?
            .insert_one(document)
            .await
            .map_err(classify)?;

        Ok(InsertAck { inserted_id: result.inserted_id })
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> DabaResult<InsertManyAck> {
        let result = self.get_collection(namespace)?
            .insert_many(documents)
            .await
            .map_err(classify)?;

        Ok(InsertManyAck { inserted_ids: result.inserted_ids })
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        let result = self.get_collection(namespace)?
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(classify)?;

        Ok(UpdateAck {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        let result = self.get_collection(namespace)?
            .update_many(filter, update)
            .upsert(upsert)
            .await
            .map_err(classify)?;

        Ok(UpdateAck {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> DabaResult<Option<Document>> {
        let mut options = FindOneOptions::default();
        options.projection = projection;

        self.get_collection(namespace)?
            .find_one(filter)
            .with_options(options)
            .await
            .map_err(classify)
    }

    async fn find_one_and_update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> DabaResult<Option<Document>> {
        let mut options = FindOneAndUpdateOptions::default();
        options.return_document = Some(ReturnDocument::After);

        self.get_collection(namespace)?
            .find_one_and_update(filter, update)
            .with_options(options)
            .await
            .map_err(classify)
    }

    async fn delete_one(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck> {
        let result = self.get_collection(namespace)?
            .delete_one(filter)
            .await
            .map_err(classify)?;

        Ok(DeleteAck { deleted_count: result.deleted_count })
    }

    async fn delete_many(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck> {
        let result = self.get_collection(namespace)?
            .delete_many(filter)
            .await
            .map_err(classify)?;

        Ok(DeleteAck { deleted_count: result.deleted_count })
    }

    async fn count_documents(&self, namespace: &Namespace, filter: Document) -> DabaResult<u64> {
        self.get_collection(namespace)?
            .count_documents(filter)
            .await
            .map_err(classify)
    }

    async fn create_index(
        &self,
        namespace: &Namespace,
        keys: IndexKeys,
        options: IndexOptions,
    ) -> DabaResult<String> {
        let result = self.get_collection(namespace)?
            .create_index(index_model(&keys, options))
            .await
            .map_err(classify)?;

        Ok(result.index_name)
    }

    /// Refuses new calls from here on and returns without waiting.
    ///
    /// Cursors already handed out hold their own client handle and keep
    /// reading. The driver releases the pool's connections once the last
    /// handle is dropped.
    async fn close(&self) -> DabaResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(url = %self.settings.redacted_url(), "mongodb pool closed to new calls");
        }

        Ok(())
    }
}

/// Driver options for a `find` call.
pub(crate) fn find_options(limiter: Limiter) -> FindOptions {
    let mut options = FindOptions::default();
    options.limit = limiter.limit;
    options.projection = limiter.projection;
    options
}

/// Driver index model for `keys` and `options`.
///
/// The name is always set explicitly so that it matches what
/// [`IndexOptions::resolved_name`] reports for the same keys.
pub(crate) fn index_model(keys: &IndexKeys, options: IndexOptions) -> IndexModel {
    let mut index_options = MongoIndexOptions::default();
    index_options.name = Some(options.resolved_name(keys));
    index_options.unique = options.unique.then_some(true);
    index_options.sparse = options.sparse;
    index_options.expire_after = options.expire_after;
    index_options.partial_filter_expression = options.partial_filter_expression;
    index_options.hidden = options.hidden;

    IndexModel::builder()
        .keys(keys.to_document())
        .options(index_options)
        .build()
}

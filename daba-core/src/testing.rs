//! A backend that records what it is asked to do.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::stream;

use crate::{
    ack::{DeleteAck, InsertAck, InsertManyAck, UpdateAck},
    backend::{Backend, Connector, Namespace, PoolSettings},
    config::Settings,
    error::{DabaError, DabaResult},
    error_log::MemoryErrorLog,
    index::{IndexKeys, IndexOptions},
    operation::{Limiter, Operation},
    registry::ClientRegistry,
    stream::DocumentStream,
};

#[derive(Debug, Default)]
struct Journal {
    calls: Vec<(String, Namespace, Operation)>,
    connects: Vec<PoolSettings>,
    closed: Vec<String>,
    failure: Option<DabaError>,
    stream_failure: Option<DabaError>,
    latency: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingConnector {
    journal: Arc<Mutex<Journal>>,
}

impl RecordingConnector {
    fn with<T>(&self, f: impl FnOnce(&mut Journal) -> T) -> T {
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *journal)
    }

    /// Every operation dispatched so far, with the URL of the pool that served it.
    pub(crate) fn calls(&self) -> Vec<(String, Namespace, Operation)> {
        self.with(|journal| journal.calls.clone())
    }

    pub(crate) fn last_operation(&self) -> Operation {
        self.calls()
            .pop()
            .map(|(_, _, operation)| operation)
            .expect("no operation recorded")
    }

    pub(crate) fn connects(&self) -> Vec<PoolSettings> {
        self.with(|journal| journal.connects.clone())
    }

    pub(crate) fn closed(&self) -> Vec<String> {
        self.with(|journal| journal.closed.clone())
    }

    /// Makes every following call fail with `err`.
    pub(crate) fn fail_with(&self, err: DabaError) {
        self.with(|journal| journal.failure = Some(err));
    }

    /// Makes `find` streams fail with `err` after their first document.
    pub(crate) fn fail_streams_with(&self, err: DabaError) {
        self.with(|journal| journal.stream_failure = Some(err));
    }

    /// Makes every following call take `latency` before it answers.
    pub(crate) fn delay_calls(&self, latency: Duration) {
        self.with(|journal| journal.latency = Some(latency));
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    type Backend = RecordingBackend;

    async fn connect(&self, settings: &PoolSettings) -> DabaResult<Self::Backend> {
        if settings.connection_url.starts_with("invalid") {
            return Err(DabaError::Configuration(format!(
                "unsupported connection string {}",
                settings.connection_url
            )));
        }

        self.with(|journal| journal.connects.push(settings.clone()));

        Ok(RecordingBackend {
            url: settings.connection_url.clone(),
            connector: self.clone(),
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
pub(crate) struct RecordingBackend {
    url: String,
    connector: RecordingConnector,
    closed: AtomicBool,
}

impl RecordingBackend {
    /// Journals the call, then waits out the configured latency.
    ///
    /// A call still running when its pool closes fails with `PoolClosed`.
    async fn record(&self, namespace: &Namespace, operation: Operation) -> DabaResult<()> {
        let latency = self.connector.with(|journal| {
            journal
                .calls
                .push((self.url.clone(), namespace.clone(), operation));

            match &journal.failure {
                Some(err) => Err(err.clone()),
                None => Ok(journal.latency),
            }
        })?;

        self.ensure_open()?;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
            self.ensure_open()?;
        }

        Ok(())
    }

    fn ensure_open(&self) -> DabaResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DabaError::PoolClosed(self.url.clone()));
        }

        Ok(())
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        limiter: Limiter,
    ) -> DabaResult<DocumentStream> {
        self.record(namespace, Operation::Find { filter, limiter }).await?;

        Ok(match self.connector.with(|journal| journal.stream_failure.clone()) {
            Some(err) => DocumentStream::new(stream::iter(vec![
                Ok(doc! { "_id": 1 }),
                Err(err),
                Ok(doc! { "_id": 2 }),
            ])),
            None => DocumentStream::empty(),
        })
    }

    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Vec<Document>,
    ) -> DabaResult<DocumentStream> {
        self.record(namespace, Operation::Aggregate { pipeline }).await?;
        Ok(DocumentStream::empty())
    }

    async fn insert_one(&self, namespace: &Namespace, document: Document) -> DabaResult<InsertAck> {
        let inserted_id = document.get("_id").cloned().unwrap_or(Bson::Int32(1));
        self.record(namespace, Operation::InsertOne { document }).await?;
        Ok(InsertAck { inserted_id })
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> DabaResult<InsertManyAck> {
        self.record(namespace, Operation::InsertMany { documents }).await?;
        Ok(InsertManyAck::default())
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        self.record(namespace, Operation::UpdateOne { filter, update, upsert }).await?;
        Ok(UpdateAck { matched_count: 1, modified_count: 1, upserted_id: None })
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        self.record(namespace, Operation::UpdateMany { filter, update, upsert }).await?;
        Ok(UpdateAck { matched_count: 2, modified_count: 2, upserted_id: None })
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> DabaResult<Option<Document>> {
        self.record(namespace, Operation::FindOne { filter, projection }).await?;
        Ok(None)
    }

    async fn find_one_and_update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> DabaResult<Option<Document>> {
        self.record(namespace, Operation::FindOneAndUpdate { filter, update }).await?;
        Ok(Some(doc! { "_id": 1, "count": 1 }))
    }

    async fn delete_one(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck> {
        self.record(namespace, Operation::DeleteOne { filter }).await?;
        Ok(DeleteAck { deleted_count: 1 })
    }

    async fn delete_many(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck> {
        self.record(namespace, Operation::DeleteMany { filter }).await?;
        Ok(DeleteAck { deleted_count: 2 })
    }

    async fn count_documents(&self, namespace: &Namespace, filter: Document) -> DabaResult<u64> {
        self.record(namespace, Operation::CountDocuments { filter }).await?;
        Ok(10)
    }

    async fn create_index(
        &self,
        namespace: &Namespace,
        keys: IndexKeys,
        options: IndexOptions,
    ) -> DabaResult<String> {
        let name = options.resolved_name(&keys);
        self.record(namespace, Operation::CreateIndex { keys, options }).await?;
        Ok(name)
    }

    async fn close(&self) -> DabaResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.connector.with(|journal| journal.closed.push(self.url.clone()));
        Ok(())
    }
}

/// A registry over a [`RecordingConnector`] with an in-memory error log.
pub(crate) async fn recording_registry()
-> (ClientRegistry<RecordingConnector>, RecordingConnector, MemoryErrorLog) {
    let connector = RecordingConnector::default();
    let log = MemoryErrorLog::new();
    let registry = ClientRegistry::builder(
        connector.clone(),
        Settings::new("mongodb://primary:27017/", "app").with_pool_size(100),
    )
    .error_log(log.clone())
    .build()
    .await
    .expect("recording connector always connects");

    (registry, connector, log)
}

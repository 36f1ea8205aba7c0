//! In-memory servers and the pools that connect to them.
//!
//! A [`MemoryCluster`] plays the role of the network: it owns one
//! [`MemoryServer`] per host name and hands out [`InMemoryPool`]s, each bound
//! to the server its connection string names. Two pools opened on the same
//! host see the same data; pools on different hosts are isolated, which is
//! what makes a registry swap observable in tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;

use daba_core::{
    ack::{DeleteAck, InsertAck, InsertManyAck, UpdateAck},
    backend::{Backend, Connector, Namespace, PoolSettings, redact_url},
    error::{DabaError, DabaResult},
    index::{IndexKeys, IndexOptions},
    operation::Limiter,
    stream::DocumentStream,
};

use crate::{
    evaluator::{DocumentEvaluator, lookup, values_equal},
    pipeline, update,
};

type CollectionMap = HashMap<String, MemoryCollection>;
type DatabaseMap = HashMap<String, CollectionMap>;

#[derive(Debug, Clone, PartialEq)]
struct MemoryIndex {
    name: String,
    keys: IndexKeys,
    unique: bool,
    sparse: bool,
}

impl MemoryIndex {
    /// The indexed values of `document`, or `None` if a sparse index skips it.
    fn key_of(&self, document: &Document) -> Option<Vec<Bson>> {
        let fields = self.keys.fields();
        let values: Vec<Option<&Bson>> = fields
            .iter()
            .map(|(field, _)| lookup(document, field))
            .collect();

        if self.sparse && values.iter().all(Option::is_none) {
            return None;
        }

        Some(values
            .into_iter()
            .map(|value| value.cloned().unwrap_or(Bson::Null))
            .collect())
    }
}

/// One collection's documents, in insertion order, and its indexes.
#[derive(Debug, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<MemoryIndex>,
}

impl MemoryCollection {
    fn matching(&self, filter: &Document) -> DabaResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document).matches(filter)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    fn first_matching(&self, filter: &Document) -> DabaResult<Option<usize>> {
        for (position, document) in self.documents.iter().enumerate() {
            if DocumentEvaluator::new(document).matches(filter)? {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    /// Rejects `candidate` if it collides with another document on `_id`
    /// or on any unique index. `replacing` is the position it will occupy.
    fn check_unique(&self, namespace: &Namespace, candidate: &Document, replacing: Option<usize>) -> DabaResult<()> {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != replacing)
            .map(|(_, document)| document);

        if let Some(id) = candidate.get("_id") {
            if others.clone().any(|other| other.get("_id").is_some_and(|other| values_equal(other, id))) {
                return Err(duplicate_key(namespace, "_id_", &[id.clone()]));
            }
        }

        for index in self.indexes.iter().filter(|index| index.unique) {
            let Some(key) = index.key_of(candidate) else {
                continue;
            };

            let collides = others.clone().any(|other| {
                index
                    .key_of(other)
                    .is_some_and(|other| same_key(&other, &key))
            });

            if collides {
                return Err(duplicate_key(namespace, &index.name, &key));
            }
        }

        Ok(())
    }

    fn insert(&mut self, namespace: &Namespace, mut document: Document) -> DabaResult<Bson> {
        // _id always leads the stored document
        let id = document.remove("_id").unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        let mut stored = Document::new();
        stored.insert("_id", id.clone());
        stored.extend(document);
        let document = stored;

        self.check_unique(namespace, &document, None)?;
        self.documents.push(document);

        Ok(id)
    }

    fn modify(&mut self, namespace: &Namespace, position: usize, update: &Document) -> DabaResult<bool> {
        let Some(current) = self.documents.get(position) else {
            return Ok(false);
        };

        let mut candidate = current.clone();
        if !update::apply(&mut candidate, update)? {
            return Ok(false);
        }

        self.check_unique(namespace, &candidate, Some(position))?;
        self.documents[position] = candidate;

        Ok(true)
    }

    fn update(
        &mut self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
        upsert: bool,
        many: bool,
    ) -> DabaResult<UpdateAck> {
        update::validate(update)?;

        let positions = match many {
            true => self.matching(filter)?,
            false => self.first_matching(filter)?.into_iter().collect(),
        };

        let mut ack = UpdateAck { matched_count: positions.len() as u64, ..UpdateAck::default() };
        for position in positions {
            if self.modify(namespace, position, update)? {
                ack.modified_count += 1;
            }
        }

        if ack.matched_count == 0 && upsert {
            let mut seed = update::upsert_seed(filter)?;
            update::apply(&mut seed, update)?;
            ack.upserted_id = Some(self.insert(namespace, seed)?);
        }

        Ok(ack)
    }

    fn delete(&mut self, filter: &Document, many: bool) -> DabaResult<u64> {
        let positions = match many {
            true => self.matching(filter)?,
            false => self.first_matching(filter)?.into_iter().collect(),
        };

        for position in positions.iter().rev() {
            self.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    fn create_index(&mut self, namespace: &Namespace, keys: IndexKeys, options: &IndexOptions) -> DabaResult<String> {
        let fields = keys.fields();
        if fields.is_empty() || fields.iter().any(|(field, _)| field.is_empty()) {
            return Err(DabaError::Operation(format!("index keys on {namespace} cannot be empty")));
        }

        let index = MemoryIndex {
            name: options.resolved_name(&keys),
            keys,
            unique: options.unique,
            sparse: options.sparse.unwrap_or(false),
        };

        if let Some(existing) = self.indexes.iter().find(|existing| existing.name == index.name) {
            return match *existing == index {
                true => Ok(index.name),
                false => Err(DabaError::Operation(format!(
                    "an index named {} already exists on {namespace} with different options",
                    index.name
                ))),
            };
        }

        if let Some(existing) = self.indexes.iter().find(|existing| existing.keys == index.keys) {
            return Err(DabaError::Operation(format!(
                "index {} already exists on {namespace} with a different name: {}",
                index.name, existing.name
            )));
        }

        if index.unique {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for key in self.documents.iter().filter_map(|document| index.key_of(document)) {
                if seen.iter().any(|other| same_key(other, &key)) {
                    return Err(duplicate_key(namespace, &index.name, &key));
                }
                seen.push(key);
            }
        }

        let name = index.name.clone();
        self.indexes.push(index);

        Ok(name)
    }
}

fn same_key(left: &[Bson], right: &[Bson]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|(l, r)| values_equal(l, r))
}

fn duplicate_key(namespace: &Namespace, index: &str, key: &[Bson]) -> DabaError {
    DabaError::Operation(format!(
        "E11000 duplicate key error collection: {namespace} index: {index} dup key: {key:?}"
    ))
}

/// The data held by one host.
#[derive(Debug)]
pub struct MemoryServer {
    host: String,
    databases: RwLock<DatabaseMap>,
    reachable: AtomicBool,
    open_pools: AtomicUsize,
}

impl MemoryServer {
    fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            databases: RwLock::new(DatabaseMap::new()),
            reachable: AtomicBool::new(true),
            open_pools: AtomicUsize::new(0),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Number of pools currently open against this server.
    pub fn open_pools(&self) -> usize {
        self.open_pools.load(Ordering::SeqCst)
    }
}

/// A set of in-memory servers addressed by host name.
///
/// `MemoryCluster` implements [`Connector`], so it can back a
/// [`ClientRegistry`](daba_core::registry::ClientRegistry) directly.
/// Connection strings may use the `memory://` or `mongodb://` scheme; only
/// the first host of the authority is significant. Servers are created on
/// first use.
///
/// # Example
///
/// ```ignore
/// use daba::{prelude::*, memory::MemoryCluster};
///
/// let cluster = MemoryCluster::new();
/// let registry = ClientRegistry::initialize(
///     cluster.clone(),
///     Settings::new("memory://primary", "app"),
/// ).await?;
///
/// cluster.set_reachable("primary", false);
/// assert!(registry.collection("users").count(None).await.is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    servers: Arc<Mutex<HashMap<String, Arc<MemoryServer>>>>,
    connects: Arc<Mutex<Vec<PoolSettings>>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// The server for `host` (a bare host name or a full connection string).
    pub fn server(&self, host: &str) -> DabaResult<Arc<MemoryServer>> {
        let host = resolve_host(host)?;
        let mut servers = self.servers.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(Arc::clone(
            servers
                .entry(host.clone())
                .or_insert_with(|| Arc::new(MemoryServer::new(host))),
        ))
    }

    /// Makes a host accept or refuse connections and operations.
    ///
    /// Pools already open against the host start failing with
    /// [`DabaError::Connection`] while it is unreachable.
    pub fn set_reachable(&self, host: &str, reachable: bool) -> DabaResult<()> {
        let server = self.server(host)?;
        server.reachable.store(reachable, Ordering::SeqCst);

        tracing::debug!(host = %server.host, reachable, "memory host reachability changed");
        Ok(())
    }

    /// Number of pools currently open against `host`.
    pub fn open_pools(&self, host: &str) -> DabaResult<usize> {
        Ok(self.server(host)?.open_pools())
    }

    /// Every successful `connect` so far, in order.
    pub fn connect_log(&self) -> Vec<PoolSettings> {
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Connector for MemoryCluster {
    type Backend = InMemoryPool;

    async fn connect(&self, settings: &PoolSettings) -> DabaResult<Self::Backend> {
        if settings.max_pool_size == 0 {
            return Err(DabaError::Configuration("max pool size must be positive".to_string()));
        }

        let server = self.server(&settings.connection_url)?;
        if !server.is_reachable() {
            return Err(DabaError::Connection(format!(
                "server selection failed for {}: {} is unreachable",
                settings.redacted_url(),
                server.host
            )));
        }

        server.open_pools.fetch_add(1, Ordering::SeqCst);
        self.connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(settings.clone());

        tracing::debug!(
            host = %server.host,
            max_pool_size = settings.max_pool_size,
            "opened memory pool"
        );

        Ok(InMemoryPool {
            settings: settings.clone(),
            server,
            closed: AtomicBool::new(false),
        })
    }
}

/// A pool bound to one [`MemoryServer`].
///
/// Operations fail with [`DabaError::PoolClosed`] after [`Backend::close`],
/// and with [`DabaError::Connection`] while the server is unreachable.
#[derive(Debug)]
pub struct InMemoryPool {
    settings: PoolSettings,
    server: Arc<MemoryServer>,
    closed: AtomicBool,
}

impl InMemoryPool {
    pub fn connection_url(&self) -> &str {
        &self.settings.connection_url
    }

    pub fn max_pool_size(&self) -> u32 {
        self.settings.max_pool_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn server(&self) -> &Arc<MemoryServer> {
        &self.server
    }

    fn ensure_usable(&self) -> DabaResult<()> {
        if self.is_closed() {
            return Err(DabaError::PoolClosed(self.settings.redacted_url()));
        }
        if !self.server.is_reachable() {
            return Err(DabaError::Connection(format!("{}: connection refused", self.server.host)));
        }
        Ok(())
    }

    async fn read<T, F>(&self, namespace: &Namespace, f: F) -> DabaResult<T>
    where
        F: FnOnce(Option<&MemoryCollection>) -> DabaResult<T> + Send,
    {
        self.ensure_usable()?;

        let databases = self.server.databases.read().await;
        f(databases
            .get(namespace.database())
            .and_then(|collections| collections.get(namespace.collection())))
    }

    async fn write<T, F>(&self, namespace: &Namespace, f: F) -> DabaResult<T>
    where
        F: FnOnce(&mut MemoryCollection) -> DabaResult<T> + Send,
    {
        self.ensure_usable()?;

        let mut databases = self.server.databases.write().await;
        let collection = databases
            .entry(namespace.database().to_string())
            .or_default()
            .entry(namespace.collection().to_string())
            .or_default();

        f(collection)
    }
}

#[async_trait]
impl Backend for InMemoryPool {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: Document,
        limiter: Limiter,
    ) -> DabaResult<DocumentStream> {
        let documents = self
            .read(namespace, |collection| {
                let Some(collection) = collection else {
                    return Ok(Vec::new());
                };

                let mut matched = DocumentEvaluator::filter_documents(&collection.documents, &filter)?;
                if let Some(limit) = limiter.limit.filter(|limit| *limit != 0) {
                    matched.truncate(limit.unsigned_abs() as usize);
                }

                match &limiter.projection {
                    Some(projection) => matched
                        .iter()
                        .map(|document| pipeline::project(document, projection))
                        .collect(),
                    None => Ok(matched),
                }
            })
            .await?;

        Ok(DocumentStream::from_documents(documents))
    }

    async fn aggregate(
        &self,
        namespace: &Namespace,
        pipeline: Vec<Document>,
    ) -> DabaResult<DocumentStream> {
        let documents = self
            .read(namespace, |collection| {
                let documents = collection
                    .map(|collection| collection.documents.clone())
                    .unwrap_or_default();
                pipeline::run(documents, &pipeline)
            })
            .await?;

        Ok(DocumentStream::from_documents(documents))
    }

    async fn insert_one(&self, namespace: &Namespace, document: Document) -> DabaResult<InsertAck> {
        self.write(namespace, |collection| {
            let inserted_id = collection.insert(namespace, document)?;
            Ok(InsertAck { inserted_id })
        })
        .await
    }

    async fn insert_many(
        &self,
        namespace: &Namespace,
        documents: Vec<Document>,
    ) -> DabaResult<InsertManyAck> {
        self.write(namespace, |collection| {
            let mut ack = InsertManyAck::default();
            for (position, document) in documents.into_iter().enumerate() {
                ack.inserted_ids
                    .insert(position, collection.insert(namespace, document)?);
            }
            Ok(ack)
        })
        .await
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        self.write(namespace, |collection| collection.update(namespace, &filter, &update, upsert, false))
            .await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> DabaResult<UpdateAck> {
        self.write(namespace, |collection| collection.update(namespace, &filter, &update, upsert, true))
            .await
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: Document,
        projection: Option<Document>,
    ) -> DabaResult<Option<Document>> {
        self.read(namespace, |collection| {
            let Some(collection) = collection else {
                return Ok(None);
            };

            let found = collection
                .first_matching(&filter)?
                .and_then(|position| collection.documents.get(position));

            match (found, &projection) {
                (Some(document), Some(projection)) => pipeline::project(document, projection).map(Some),
                (found, _) => Ok(found.cloned()),
            }
        })
        .await
    }

    async fn find_one_and_update(
        &self,
        namespace: &Namespace,
        filter: Document,
        update: Document,
    ) -> DabaResult<Option<Document>> {
        self.write(namespace, |collection| {
            update::validate(&update)?;

            let Some(position) = collection.first_matching(&filter)? else {
                return Ok(None);
            };

            collection.modify(namespace, position, &update)?;
            Ok(collection.documents.get(position).cloned())
        })
        .await
    }

    async fn delete_one(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck> {
        self.write(namespace, |collection| {
            Ok(DeleteAck { deleted_count: collection.delete(&filter, false)? })
        })
        .await
    }

    async fn delete_many(&self, namespace: &Namespace, filter: Document) -> DabaResult<DeleteAck> {
        self.write(namespace, |collection| {
            Ok(DeleteAck { deleted_count: collection.delete(&filter, true)? })
        })
        .await
    }

    async fn count_documents(&self, namespace: &Namespace, filter: Document) -> DabaResult<u64> {
        self.read(namespace, |collection| match collection {
            Some(collection) => Ok(collection.matching(&filter)?.len() as u64),
            None => Ok(0),
        })
        .await
    }

    async fn create_index(
        &self,
        namespace: &Namespace,
        keys: IndexKeys,
        options: IndexOptions,
    ) -> DabaResult<String> {
        self.write(namespace, |collection| collection.create_index(namespace, keys, &options))
            .await
    }

    async fn close(&self) -> DabaResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.server.open_pools.fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(host = %self.server.host, "closed memory pool");
        }
        Ok(())
    }
}

/// The host a connection string (or bare host name) addresses.
///
/// `mongodb://user:pw@alt-host:27017,other/db` resolves to `alt-host`.
pub fn resolve_host(target: &str) -> DabaResult<String> {
    let authority = match target.split_once("://") {
        Some(("memory" | "mongodb" | "mongodb+srv", rest)) => rest.split(['/', '?']).next().unwrap_or_default(),
        Some((scheme, _)) => {
            return Err(DabaError::Configuration(format!(
                "unsupported connection scheme '{scheme}' in {}",
                redact_url(target)
            )));
        }
        None => target,
    };

    let hosts = authority
        .rsplit_once('@')
        .map_or(authority, |(_, hosts)| hosts);
    let host = hosts
        .split(',')
        .next()
        .and_then(|host| host.split(':').next())
        .unwrap_or_default();

    match host.is_empty() {
        true => Err(DabaError::Configuration(format!(
            "no host in connection string {}",
            redact_url(target)
        ))),
        false => Ok(host.to_string()),
    }
}

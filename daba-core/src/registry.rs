//! Ownership of the shared connection pool.
//!
//! A [`ClientRegistry`] holds exactly one live pool at a time and is the only
//! thing that ever opens or closes one. Collection handles borrow the registry
//! rather than the pool, so every call resolves the pool that is active at
//! that moment.
//!
//! # Swapping
//!
//! [`swap`](ClientRegistry::swap) opens the replacement pool before touching
//! the active one, installs it under the write lock, and closes the previous
//! pool afterwards. Calls hold the read lock for the length of their primitive
//! operation, so installing waits for in-flight calls to finish and no call is
//! ever cut off by an unrelated swap. New calls queue behind the writer
//! for that short window.
//!
//! # Example
//!
//! ```ignore
//! use daba::{prelude::*, memory::MemoryCluster};
//!
//! let registry = ClientRegistry::builder(MemoryCluster::new(), Settings::from_env()?)
//!     .error_log(MemoryErrorLog::new())
//!     .build()
//!     .await?;
//!
//! let users = registry.collection("users");
//! users.put(doc! { "name": "Alice" }).await?;
//!
//! registry.swap("mongodb://replica-2:27017/").await?;
//! assert_eq!(users.count(None).await?, 0);
//!
//! registry.reset().await?;
//! ```

use std::{fmt, sync::Arc};

use mea::rwlock::RwLock;

use crate::{
    backend::{Backend, Connector, Namespace, PoolSettings},
    collection::Collection,
    config::Settings,
    error::DabaResult,
    error_log::{ErrorLog, FileErrorLog},
};

/// The pool currently serving calls, with the settings it was opened from.
#[derive(Debug)]
pub(crate) struct ActivePool<B> {
    pub(crate) settings: PoolSettings,
    pub(crate) pool: B,
}

/// Process-wide owner of the shared connection pool.
///
/// Construct one at start-up and pass a reference to whatever needs database
/// access; handles are created from it with [`collection`](Self::collection).
pub struct ClientRegistry<C: Connector> {
    connector: C,
    settings: Settings,
    active: RwLock<ActivePool<C::Backend>>,
    error_log: Arc<dyn ErrorLog>,
}

impl<C: Connector> ClientRegistry<C> {
    /// Opens the configured pool with the default file error log.
    ///
    /// # Errors
    ///
    /// Any failure to open the pool is returned as-is; there is no registry
    /// without a pool.
    pub async fn initialize(connector: C, settings: Settings) -> DabaResult<Self> {
        Self::builder(connector, settings).build().await
    }

    /// Starts building a registry.
    pub fn builder(connector: C, settings: Settings) -> ClientRegistryBuilder<C> {
        ClientRegistryBuilder::new(connector, settings)
    }

    /// Returns a handle on `collection` in the default database.
    pub fn collection(&self, collection: &str) -> Collection<'_, C> {
        Collection::new(self, Namespace::new(&self.settings.default_database, collection))
    }

    /// Returns a handle on `collection` in `database`.
    pub fn collection_in(&self, database: &str, collection: &str) -> Collection<'_, C> {
        Collection::new(self, Namespace::new(database, collection))
    }

    /// Replaces the active pool with one connected to `connection_url`.
    ///
    /// The new pool keeps the configured maximum size. Handles created before
    /// the swap use the new pool for every call issued after it returns.
    ///
    /// # Errors
    ///
    /// If the new pool cannot be opened the error is returned and the current
    /// pool stays active.
    pub async fn swap(&self, connection_url: &str) -> DabaResult<()> {
        self.install(PoolSettings::new(connection_url, self.settings.pool_size))
            .await
    }

    /// Swaps back to the configured connection string.
    pub async fn reset(&self) -> DabaResult<()> {
        self.install(self.settings.pool_settings()).await
    }

    /// The connection string of the active pool.
    pub async fn connection_url(&self) -> String {
        self.active
            .read()
            .await
            .settings
            .connection_url
            .clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn default_database(&self) -> &str {
        &self.settings.default_database
    }

    pub fn max_pool_size(&self) -> u32 {
        self.settings.pool_size
    }

    /// Closes the active pool.
    pub async fn shutdown(self) -> DabaResult<()> {
        let active = self.active.read().await;

        tracing::info!(url = %active.settings.redacted_url(), "closing connection pool");

        active.pool.close().await
    }

    pub(crate) fn active(&self) -> &RwLock<ActivePool<C::Backend>> {
        &self.active
    }

    pub(crate) fn error_log(&self) -> &Arc<dyn ErrorLog> {
        &self.error_log
    }

    async fn install(&self, settings: PoolSettings) -> DabaResult<()> {
        let target = settings.redacted_url();
        let pool = self
            .connector
            .connect(&settings)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    url = %target,
                    error = %err,
                    "failed to open replacement connection pool"
                )
            })?;

        let previous = {
            let mut active = self.active.write().await;
            std::mem::replace(&mut *active, ActivePool { settings, pool })
        };

        tracing::info!(
            from = %previous.settings.redacted_url(),
            to = %target,
            "swapped connection pool"
        );

        // The replacement is already serving calls; a failed close only leaks the old pool
        if let Err(err) = previous.pool.close().await {
            tracing::warn!(
                url = %previous.settings.redacted_url(),
                error = %err,
                "failed to close previous connection pool"
            );
        }

        Ok(())
    }
}

impl<C: Connector> fmt::Debug for ClientRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("settings", &self.settings)
            .field("error_log", &self.error_log)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ClientRegistry`].
pub struct ClientRegistryBuilder<C: Connector> {
    connector: C,
    settings: Settings,
    error_log: Option<Arc<dyn ErrorLog>>,
}

impl<C: Connector> ClientRegistryBuilder<C> {
    pub fn new(connector: C, settings: Settings) -> Self {
        Self { connector, settings, error_log: None }
    }

    /// Sends failure records to `error_log` instead of the configured file.
    pub fn error_log(mut self, error_log: impl ErrorLog + 'static) -> Self {
        self.error_log = Some(Arc::new(error_log));
        self
    }

    /// Opens the configured pool.
    pub async fn build(self) -> DabaResult<ClientRegistry<C>> {
        let settings = self.settings.pool_settings();
        let pool = self.connector.connect(&settings).await?;
        let error_log = self
            .error_log
            .unwrap_or_else(|| Arc::new(FileErrorLog::new(&self.settings.error_log_path)) as Arc<dyn ErrorLog>);

        tracing::info!(
            url = %settings.redacted_url(),
            max_pool_size = settings.max_pool_size,
            database = %self.settings.default_database,
            "opened connection pool"
        );

        Ok(ClientRegistry {
            connector: self.connector,
            settings: self.settings,
            active: RwLock::new(ActivePool { settings, pool }),
            error_log,
        })
    }
}

//! Main daba crate providing a verb-oriented interface to a document database.
//!
//! This crate is the primary entry point for users of daba. It re-exports the
//! core types from `daba-core` and gives access to the available backends.
//!
//! # Features
//!
//! - **One shared pool** - A process-wide registry owns the connection pool and can swap it at runtime
//! - **Short verbs** - `get`, `put`, `set`, `inc`, `get_one`, `get_after_count`, `delete_one`, `count`, ...
//! - **Uniform failure handling** - Every failed call is traced, appended to an error log and returned
//! - **Index management** - Create indexes through the same handles, with structured options
//!
//! # Quick Start
//!
//! ```ignore
//! use daba::{prelude::*, memory::MemoryCluster};
//!
//! #[tokio::main]
//! async fn main() -> DabaResult<()> {
//!     let registry = ClientRegistry::initialize(
//!         MemoryCluster::new(),
//!         Settings::new("memory://primary", "app"),
//!     )
//!     .await?;
//!
//!     let users = registry.collection("users");
//!     users.create_index("username", IndexOptions::unique()).await?;
//!
//!     users.put(doc! { "username": "alice", "logins": 0 }).await?;
//!     users.inc(doc! { "username": "alice" }, doc! { "logins": 1 }).await?;
//!
//!     let alice = users.get_one(doc! { "username": "alice" }, None).await?;
//!     println!("{alice:?}");
//!
//!     registry.shutdown().await
//! }
//! ```
//!
//! # Switching servers
//!
//! Handles borrow the registry rather than a pool, so a swap is visible to
//! every handle at once:
//!
//! ```ignore
//! let users = registry.collection("users");
//!
//! registry.swap("mongodb://replica-2:27017/").await?;
//! users.count(None).await?; // served by replica-2
//!
//! registry.reset().await?; // back to the configured connection string
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-process servers for development and testing
//! - [`mongodb`] - The official MongoDB driver (requires the `mongodb` feature)

pub mod prelude;

pub use daba_core::{
    ack, backend, collection, config, error, error_log, executor, index, operation, registry, stream,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory backend.
pub mod memory {
    pub use daba_memory::{InMemoryPool, MemoryCluster, MemoryServer, resolve_host};
}

/// MongoDB backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use daba_mongodb::{MongoConnector, MongoDbPool};
}

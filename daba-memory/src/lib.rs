//! In-memory document database backend for daba.
//!
//! This crate provides [`MemoryCluster`], a [`Connector`](daba_core::backend::Connector)
//! whose pools keep documents in process memory behind async-aware read-write
//! locks. It behaves like a small document server: filters, update operators,
//! aggregation stages and unique indexes follow the server's semantics closely
//! enough for development and tests, and hosts can be made unreachable to
//! exercise failure paths.
//!
//! # Features
//!
//! - **Per-host isolation** - Each host in a connection string gets its own data
//! - **Query support** - Comparison, membership, existence and logical filter operators
//! - **Updates** - `$set`, `$inc` and `$unset` with dotted paths and upserts
//! - **Aggregation** - `$match`, `$sort`, `$skip`, `$limit`, `$project` and `$count`
//! - **Indexes** - Unique and sparse constraints, idempotent creation
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
//!     users.put(doc! { "name": "Alice" }).await?;
//!     assert_eq!(users.count(None).await?, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as daba_memory;

pub mod store;

mod evaluator;
mod pipeline;
mod update;

pub use store::{InMemoryPool, MemoryCluster, MemoryServer, resolve_host};

//! A thin, verb-oriented access layer over a document database.
//!
//! This crate is the core of the daba project and provides:
//!
//! - **Connection registry** ([`registry`]) - Owns the single shared pool and swaps it at runtime
//! - **Collection handles** ([`collection`]) - The `get`/`put`/`set`/`inc`/`delete`/`count` verbs
//! - **Operation executor** ([`executor`]) - Uniform dispatch, error logging and propagation
//! - **Index management** ([`index`]) - Passthrough index creation with structured options
//! - **Backend abstraction** ([`backend`]) - Traits a database driver implements
//! - **Operations** ([`operation`]) - The tagged table of primitives the verbs are built from
//! - **Configuration** ([`config`]) - Settings read from the environment
//! - **Error handling** ([`error`], [`error_log`]) - Error types and the persistent failure log
//!
//! # Example
//!
//! ```ignore
//! use daba::{prelude::*, memory::MemoryCluster};
//!
//! let registry = ClientRegistry::initialize(MemoryCluster::new(), Settings::from_env()?).await?;
//! let users = registry.collection("users");
//!
//! users.put(doc! { "_id": 1, "name": "Alice", "visits": 0 }).await?;
//! users.inc(doc! { "_id": 1 }, doc! { "visits": 1 }).await?;
//!
//! let alice = users.get_one(doc! { "_id": 1 }, None).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as daba_core;

pub mod ack;
pub mod backend;
pub mod collection;
pub mod config;
pub mod error;
pub mod error_log;
pub mod executor;
pub mod index;
pub mod operation;
pub mod registry;
pub mod stream;

#[cfg(test)]
mod testing;

//! MongoDB backend for daba.
//!
//! This crate provides [`MongoConnector`], a
//! [`Connector`](daba_core::backend::Connector) that opens pools with the
//! official async MongoDB driver, and [`MongoDbPool`], the
//! [`Backend`](daba_core::backend::Backend) that forwards each primitive to the
//! matching driver call.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! daba = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use daba::{prelude::*, mongodb::MongoConnector};
//!
//! #[tokio::main]
//! async fn main() -> DabaResult<()> {
//!     let registry = ClientRegistry::initialize(MongoConnector::new(), Settings::from_env()?).await?;
//!     let users = registry.collection("users");
//!
//!     users.set(doc! { "username": "alice" }, doc! { "active": true }).await?;
//!     registry.shutdown().await
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as daba_mongodb;

pub mod store;

mod error;

pub use store::{MongoConnector, MongoDbPool};

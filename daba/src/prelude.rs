//! Convenient re-exports of commonly used types from daba.
//!
//! ```ignore
//! use daba::prelude::*;
//! ```

pub use daba_core::{
    ack::{DeleteAck, InsertAck, InsertManyAck, UpdateAck},
    backend::{Backend, Connector, Namespace, PoolSettings},
    collection::Collection,
    config::Settings,
    error::{DabaError, DabaResult},
    error_log::{ErrorLog, ErrorRecord, FileErrorLog, MemoryErrorLog, Severity},
    index::{IndexDirection, IndexKeys, IndexOptions},
    operation::Limiter,
    registry::{ClientRegistry, ClientRegistryBuilder},
    stream::DocumentStream,
};

pub use bson::{Bson, Document, doc};

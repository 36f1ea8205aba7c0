//! Error types and result types for data access operations.
//!
//! Every verb on a [`Collection`](crate::collection::Collection) returns a
//! [`DabaResult<T>`]. The variants follow the failure categories callers care
//! about: a bad configuration is fatal at start-up, connectivity failures and
//! operation failures surface from individual calls, and nothing is retried or
//! suppressed by this layer.

use bson::error::Error as BsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to the document database.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DabaError {
    /// Missing or invalid configuration (connection string, database name, pool size).
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The server could not be reached or refused the connection (network, DNS, authentication).
    #[error("Connection error: {0}")]
    Connection(String),
    /// The server rejected the operation (constraint violation, malformed filter or payload).
    #[error("Operation error: {0}")]
    Operation(String),
    /// The pool the call was routed to has already been closed.
    #[error("Connection pool closed: {0}")]
    PoolClosed(String),
    /// Conversion between BSON and Rust values failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A backend answered an operation with a reply of the wrong shape.
    #[error("Unexpected reply to {operation}: got {reply}")]
    UnexpectedReply {
        /// The operation that was dispatched.
        operation: &'static str,
        /// The reply shape that came back.
        reply: &'static str,
    },
}

impl DabaError {
    /// Returns `true` for failures caused by the connection rather than the request.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DabaError::Connection(_) | DabaError::PoolClosed(_))
    }
}

/// A specialized `Result` type for data access operations.
pub type DabaResult<T> = Result<T, DabaError>;

impl From<BsonError> for DabaError {
    fn from(err: BsonError) -> Self {
        DabaError::Serialization(err.to_string())
    }
}

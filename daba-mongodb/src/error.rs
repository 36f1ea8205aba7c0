//! Mapping of driver errors onto [`DabaError`].

use mongodb::error::{Error as MongoError, ErrorKind};

use daba_core::error::DabaError;

/// Classifies a driver error by what went wrong rather than where.
///
/// Server selection, I/O, DNS and authentication failures mean the server
/// could not be used at all and become [`DabaError::Connection`]. A client
/// that has been shut down becomes [`DabaError::PoolClosed`]. Everything else
/// is the server rejecting the request.
pub(crate) fn classify(err: MongoError) -> DabaError {
    match err.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::Authentication { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => DabaError::Connection(err.to_string()),
        ErrorKind::Shutdown => DabaError::PoolClosed(err.to_string()),
        _ => DabaError::Operation(err.to_string()),
    }
}

/// Errors raised while building a client are configuration problems unless
/// the network was involved.
pub(crate) fn classify_setup(err: MongoError) -> DabaError {
    match classify(err) {
        DabaError::Operation(message) => DabaError::Configuration(message),
        other => other,
    }
}

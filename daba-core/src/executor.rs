//! The call-and-log wrapper every verb goes through.
//!
//! [`OperationExecutor::execute`] resolves the registry's active pool, runs
//! one [`Operation`] against it and hands back the [`Reply`]. On failure it
//! emits a `tracing` error event, appends exactly one [`ErrorRecord`] to the
//! registry's [`ErrorLog`], and returns the original error unchanged. Nothing
//! is retried and nothing is swallowed.
//!
//! Verbs go through [`OperationExecutor::run`], which also unwraps the reply
//! into the verb's result type. A reply of the wrong shape is recorded like
//! any other failure.

use std::sync::Arc;

use crate::{
    backend::{Connector, Namespace},
    error::{DabaError, DabaResult},
    error_log::{ErrorLog, ErrorRecord, Severity},
    operation::{Operation, OperationKind, Reply},
    registry::ClientRegistry,
};

/// Runs operations for one namespace against a registry's active pool.
#[derive(Debug)]
pub struct OperationExecutor<'a, C: Connector> {
    registry: &'a ClientRegistry<C>,
    namespace: &'a Namespace,
}

impl<'a, C: Connector> OperationExecutor<'a, C> {
    pub fn new(registry: &'a ClientRegistry<C>, namespace: &'a Namespace) -> Self {
        Self { registry, namespace }
    }

    /// Dispatches `operation` and returns its reply.
    ///
    /// The read lock on the active pool is held until the primitive returns,
    /// so a concurrent swap cannot close the pool underneath this call.
    /// Streams returned by reads keep logging: every error they yield while
    /// being consumed is recorded the same way.
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged, after recording it.
    pub async fn execute(&self, operation: Operation) -> DabaResult<Reply> {
        let kind = operation.kind();

        tracing::debug!(
            operation = %kind,
            namespace = %self.namespace,
            "dispatching operation"
        );

        let result = {
            let active = self.registry.active().read().await;
            operation
                .dispatch(&active.pool, self.namespace)
                .await
        };

        match result {
            Ok(Reply::Documents(stream)) => {
                let log = Arc::clone(self.registry.error_log());
                let namespace = self.namespace.clone();

                Ok(Reply::Documents(stream.inspect_errors(move |err| {
                    report(log.as_ref(), kind, &namespace, err)
                })))
            }
            Ok(reply) => Ok(reply),
            Err(err) => {
                report(self.registry.error_log().as_ref(), kind, self.namespace, &err);
                Err(err)
            }
        }
    }

    /// Dispatches `operation` and converts its reply with `extract`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error, or the extractor's
    /// [`UnexpectedReply`](DabaError::UnexpectedReply), after recording it.
    pub async fn run<T>(
        &self,
        operation: Operation,
        extract: fn(Reply) -> DabaResult<T>,
    ) -> DabaResult<T> {
        let kind = operation.kind();

        extract(self.execute(operation).await?).inspect_err(|err| {
            report(self.registry.error_log().as_ref(), kind, self.namespace, err)
        })
    }
}

/// The `source` field of records written for `namespace`.
pub fn log_source(namespace: &Namespace) -> String {
    format!("daba.{namespace}")
}

fn report(log: &dyn ErrorLog, kind: OperationKind, namespace: &Namespace, err: &DabaError) {
    tracing::error!(
        operation = %kind,
        namespace = %namespace,
        error = %err,
        "operation failed"
    );

    let record = ErrorRecord::now(
        log_source(namespace),
        Severity::Error,
        format!("{kind} on {namespace} failed: {err}"),
    );

    if let Err(io_err) = log.append(&record) {
        tracing::warn!(error = %io_err, "failed to write error log record");
    }
}

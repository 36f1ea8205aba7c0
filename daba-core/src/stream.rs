//! Lazy sequences of documents returned by `get` and `find`.

use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use bson::Document;
use futures::{
    Stream, StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};

use crate::error::{DabaError, DabaResult};

/// A lazy, owned stream of documents.
///
/// Backends hand back whatever cursor their driver produces, boxed behind this
/// type. Nothing is fetched until the stream is polled, and each item carries
/// its own result because a cursor can fail part-way through.
pub struct DocumentStream {
    inner: BoxStream<'static, DabaResult<Document>>,
}

impl DocumentStream {
    /// Wraps any `Send + 'static` stream of document results.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = DabaResult<Document>> + Send + 'static,
    {
        Self { inner: stream.boxed() }
    }

    /// A stream over documents that are already in memory.
    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self::new(stream::iter(documents.into_iter().map(Ok)))
    }

    /// An empty stream.
    pub fn empty() -> Self {
        Self::new(stream::empty())
    }

    /// Drains the stream, stopping at the first error.
    pub async fn collect_all(self) -> DabaResult<Vec<Document>> {
        self.inner.try_collect().await
    }

    /// Runs `hook` on every error the stream yields, leaving the error in place.
    pub(crate) fn inspect_errors<F>(self, hook: F) -> Self
    where
        F: FnMut(&DabaError) + Send + 'static,
    {
        Self::new(self.inner.inspect_err(hook))
    }
}

impl Stream for DocumentStream {
    type Item = DabaResult<Document>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl fmt::Debug for DocumentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStream").finish_non_exhaustive()
    }
}

//! Per-call deadline and latency metrics around any [`DocumentStore`].
//!
//! The remote store defines no timeouts of its own. Wrapping it in a
//! [`TimedStore`] turns a hung call into `StoreError::Unavailable`, which the
//! retry layer treats as transient.

use crate::metrics::StoreMetrics;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use talkboard_core::document_store::{
    Collection, Document, DocumentStore, Query, SnapshotStream, StoreError, WriteOp,
};

/// Decorator applying a deadline to every call on the inner store.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn DocumentStore>,
    timeout: Duration,
}

impl TimedStore {
    /// Wrap `inner` with a per-call `timeout`.
    #[must_use]
    pub fn new(inner: Arc<dyn DocumentStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn run<T>(
        &self,
        call: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, fut).await;
        StoreMetrics::record_call(call, started.elapsed());

        result.unwrap_or_else(|_| {
            tracing::warn!(call, timeout_ms = self.timeout.as_millis(), "Store call timed out");
            Err(StoreError::Unavailable(format!(
                "{call} timed out after {}ms",
                self.timeout.as_millis()
            )))
        })
    }
}

impl DocumentStore for TimedStore {
    fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Document>, StoreError>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move { self.run("get", self.inner.get(collection, &id)).await })
    }

    fn query(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Document>, StoreError>> + Send + '_>> {
        Box::pin(self.run("query", self.inner.query(query)))
    }

    fn commit(
        &self,
        writes: Vec<WriteOp>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(self.run("commit", self.inner.commit(writes)))
    }

    fn subscribe(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, StoreError>> + Send + '_>> {
        Box::pin(self.run("subscribe", self.inner.subscribe(query)))
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(self.run("ping", self.inner.ping()))
    }
}

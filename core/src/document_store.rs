//! Document store trait and related types.
//!
//! Talkboard persists talks, registrations and users as JSON documents in a
//! remote, internally consistent document store. This module defines the
//! contract the services depend on:
//!
//! - Read one document by id
//! - Query a collection by field equality
//! - Commit a batch of creates, updates and deletes atomically, with
//!   optimistic concurrency per document
//! - Subscribe to a query and receive snapshots after every relevant change
//!
//! # Implementations
//!
//! - `PostgresDocumentStore` (in `talkboard-postgres`): production implementation
//! - `InMemoryDocumentStore` (in `talkboard-testing`): fast, deterministic tests
//!   with fault injection
//!
//! # Example
//!
//! ```no_run
//! use talkboard_core::document_store::{Collection, DocumentStore, Query, StoreError, WriteOp};
//! use serde_json::json;
//!
//! async fn example(store: &dyn DocumentStore) -> Result<(), StoreError> {
//!     store
//!         .commit(vec![WriteOp::create(Collection::Talks, "t1", json!({"title": "Rust"}))])
//!         .await?;
//!
//!     let talk = store.get(Collection::Talks, "t1").await?.ok_or(StoreError::NotFound {
//!         collection: Collection::Talks,
//!         id: "t1".into(),
//!     })?;
//!
//!     // Conditional update: fails with ConcurrencyConflict if someone else wrote first
//!     store
//!         .commit(vec![WriteOp::update(
//!             Collection::Talks,
//!             "t1",
//!             json!({"title": "Rust 2024"}),
//!             Some(talk.revision),
//!         )])
//!         .await?;
//!
//!     let rust_talks = store
//!         .query(Query::new(Collection::Talks).filter("title", json!("Rust 2024")))
//!         .await?;
//!     assert_eq!(rust_talks.len(), 1);
//!     Ok(())
//! }
//! ```

use crate::subscription::Snapshot;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Canonical collection names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Talk documents.
    Talks,
    /// Registration documents (one per participant per talk).
    Registrations,
    /// User documents.
    Users,
    /// Bookkeeping documents (first-administrator claim).
    System,
}

impl Collection {
    /// Stored collection name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Talks => "talks",
            Self::Registrations => "registrations",
            Self::Users => "users",
            Self::System => "system",
        }
    }

    /// Singular human-readable noun for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Talks => "Talk",
            Self::Registrations => "Registration",
            Self::Users => "User",
            Self::System => "Document",
        }
    }

    /// Parse a stored collection name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "talks" => Some(Self::Talks),
            "registrations" => Some(Self::Registrations),
            "users" => Some(Self::Users),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-document revision, starting at 1 on create and bumped by every update.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(u64);

impl Revision {
    /// Revision of a freshly created document.
    pub const INITIAL: Self = Self(1);

    /// Create a revision from a raw value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The revision following this one.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A stored document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Owning collection.
    pub collection: Collection,
    /// Document id, unique within the collection.
    pub id: String,
    /// Current revision.
    pub revision: Revision,
    /// JSON body.
    pub data: Value,
}

/// Conjunction of top-level field equality filters over one collection.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    /// Collection to scan.
    pub collection: Collection,
    /// `(field, value)` pairs that must all match.
    pub filters: Vec<(String, Value)>,
}

impl Query {
    /// Match every document of a collection.
    #[must_use]
    pub const fn new(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
        }
    }

    /// Add a field equality filter.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push((field.into(), value));
        self
    }

    /// Whether `document` satisfies this query.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        document.collection == self.collection
            && self
                .filters
                .iter()
                .all(|(field, value)| document.data.get(field) == Some(value))
    }
}

/// One write in an atomic commit.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    /// Insert a new document. Fails with `AlreadyExists` if the id is taken.
    Create {
        /// Target collection.
        collection: Collection,
        /// Document id.
        id: String,
        /// JSON body.
        data: Value,
    },
    /// Replace an existing document's body.
    ///
    /// With `expected = Some(r)` the write only applies while the document is
    /// still at revision `r`.
    Update {
        /// Target collection.
        collection: Collection,
        /// Document id.
        id: String,
        /// New JSON body.
        data: Value,
        /// Required current revision.
        expected: Option<Revision>,
    },
    /// Remove a document.
    ///
    /// Deleting a missing document without an expected revision is a no-op.
    Delete {
        /// Target collection.
        collection: Collection,
        /// Document id.
        id: String,
        /// Required current revision.
        expected: Option<Revision>,
    },
}

impl WriteOp {
    /// Build a create.
    #[must_use]
    pub fn create(collection: Collection, id: impl Into<String>, data: Value) -> Self {
        Self::Create {
            collection,
            id: id.into(),
            data,
        }
    }

    /// Build an update.
    #[must_use]
    pub fn update(
        collection: Collection,
        id: impl Into<String>,
        data: Value,
        expected: Option<Revision>,
    ) -> Self {
        Self::Update {
            collection,
            id: id.into(),
            data,
            expected,
        }
    }

    /// Build a delete.
    #[must_use]
    pub fn delete(collection: Collection, id: impl Into<String>, expected: Option<Revision>) -> Self {
        Self::Delete {
            collection,
            id: id.into(),
            expected,
        }
    }

    /// Collection touched by this write.
    #[must_use]
    pub const fn collection(&self) -> Collection {
        match self {
            Self::Create { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => *collection,
        }
    }

    /// Document id touched by this write.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Create { id, .. } | Self::Update { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// Errors that can occur during document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency conflict: the document moved past the expected revision.
    #[error("Concurrency conflict on {collection}/{id}: expected {expected}, found {actual:?}")]
    ConcurrencyConflict {
        /// Collection of the conflicting document.
        collection: Collection,
        /// Id of the conflicting document.
        id: String,
        /// Revision the writer expected.
        expected: Revision,
        /// Current revision, `None` if the document no longer exists.
        actual: Option<Revision>,
    },

    /// Create targeted an id that already exists.
    #[error("Document already exists: {collection}/{id}")]
    AlreadyExists {
        /// Target collection.
        collection: Collection,
        /// Target id.
        id: String,
    },

    /// Update targeted a missing document.
    #[error("Document not found: {collection}/{id}")]
    NotFound {
        /// Target collection.
        collection: Collection,
        /// Target id.
        id: String,
    },

    /// Transient failure: connection lost, timeout, throttling.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Non-transient database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Whether the failure came from a concurrent writer.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

/// Boxed stream of snapshots for one subscription.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<Snapshot, StoreError>> + Send>>;

/// Document store abstraction.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared across request handlers.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of `async fn` so services can
/// hold an `Arc<dyn DocumentStore>`.
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    ///
    /// Returns `Ok(None)` if it does not exist.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: transient failure
    /// - `Database`: query failed
    fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Document>, StoreError>> + Send + '_>>;

    /// Return every document matching the query, ordered by id.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: transient failure
    /// - `Database`: query failed
    fn query(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Document>, StoreError>> + Send + '_>>;

    /// Apply every write or none of them.
    ///
    /// Returns the store sequence number assigned to the commit.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict`: an expected revision did not match
    /// - `AlreadyExists`: a create targeted an existing id
    /// - `NotFound`: an update targeted a missing document
    /// - `Unavailable` / `Database`: the store failed; nothing was applied
    fn commit(
        &self,
        writes: Vec<WriteOp>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>>;

    /// Subscribe to a query.
    ///
    /// The first item is the current result set. A new snapshot follows every
    /// commit that touches the query's collection. Consumers may see the same
    /// snapshot more than once and must apply them idempotently
    /// (see [`LiveView`](crate::subscription::LiveView)).
    ///
    /// # Errors
    ///
    /// Fails if the subscription cannot be set up.
    fn subscribe(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, StoreError>> + Send + '_>>;

    /// Cheap connectivity check used by readiness probes.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the store cannot be reached.
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(data: Value) -> Document {
        Document {
            collection: Collection::Registrations,
            id: "r1".into(),
            revision: Revision::INITIAL,
            data,
        }
    }

    #[test]
    fn test_query_matches_all_filters() {
        let d = doc(json!({"talk_id": "t1", "email": "a@x.com"}));

        assert!(Query::new(Collection::Registrations).matches(&d));
        assert!(
            Query::new(Collection::Registrations)
                .filter("talk_id", json!("t1"))
                .filter("email", json!("a@x.com"))
                .matches(&d)
        );
        assert!(
            !Query::new(Collection::Registrations)
                .filter("talk_id", json!("t1"))
                .filter("email", json!("b@x.com"))
                .matches(&d)
        );
        assert!(!Query::new(Collection::Talks).matches(&d));
    }

    #[test]
    fn test_collection_names_round_trip() {
        for c in [Collection::Talks, Collection::Registrations, Collection::Users, Collection::System] {
            assert_eq!(Collection::parse(c.as_str()), Some(c));
        }
        assert_eq!(Collection::parse("inscricoes"), None);
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(StoreError::Unavailable("timeout".into()).is_transient());
        assert!(!StoreError::Database("syntax".into()).is_transient());
        assert!(
            StoreError::ConcurrencyConflict {
                collection: Collection::Talks,
                id: "t1".into(),
                expected: Revision::INITIAL,
                actual: Some(Revision::new(2)),
            }
            .is_conflict()
        );
    }
}

//! `PostgreSQL` document store for talkboard.
//!
//! Implements the `DocumentStore` trait from `talkboard-core` over one JSONB
//! table:
//!
//! - Atomic multi-document commits with per-document revisions
//! - Equality queries served by a GIN index (`data @> filter`)
//! - Live snapshots driven by `LISTEN`/`NOTIFY`
//! - Connection pooling
//!
//! # Example
//!
//! ```ignore
//! use talkboard_postgres::PostgresDocumentStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresDocumentStore::connect("postgres://localhost/talkboard", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Document store over `PostgreSQL`
pub mod document_store;

pub use document_store::PostgresDocumentStore;

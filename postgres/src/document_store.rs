//! [`DocumentStore`] over a single `documents` table.
//!
//! Commits run in one transaction: each touched row is locked with
//! `SELECT ... FOR UPDATE`, its revision checked, then written. The global
//! `store_sequence` row is bumped last and a `NOTIFY` is queued, which
//! Postgres delivers only if the transaction commits.

use async_stream::stream;
use serde_json::{Map, Value};
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use talkboard_core::document_store::{
    Collection, Document, DocumentStore, Query, Revision, SnapshotStream, StoreError, WriteOp,
};
use talkboard_core::subscription::Snapshot;

/// Channel commits are announced on.
const CHANNEL: &str = "talkboard_documents";

const MIGRATION: &str = include_str!("../migrations/0001_documents.sql");

/// `PostgreSQL`-backed document store.
///
/// # Example
///
/// ```no_run
/// use talkboard_postgres::PostgresDocumentStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PostgresDocumentStore::connect("postgres://localhost/talkboard", 10).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Connect a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// `Unavailable` if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema if it does not exist.
    ///
    /// # Errors
    ///
    /// `Database` if a statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Document store schema ready");
        Ok(())
    }

    async fn snapshot(pool: &PgPool, query: &Query) -> Result<Snapshot, StoreError> {
        let mut tx = pool.begin().await.map_err(|e| map_sqlx_error("snapshot", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot", e))?;

        let sequence: i64 = sqlx::query_scalar("SELECT value FROM store_sequence")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot", e))?;
        let documents = Self::select(&mut tx, query).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("snapshot", e))?;

        Ok(Snapshot {
            sequence: to_u64(sequence)?,
            documents,
        })
    }

    async fn select(
        tx: &mut Transaction<'_, Postgres>,
        query: &Query,
    ) -> Result<Vec<Document>, StoreError> {
        let filter: Map<String, Value> = query.filters.iter().cloned().collect();
        let rows = sqlx::query(
            r"
            SELECT id, revision, data
            FROM documents
            WHERE collection = $1 AND data @> $2
            ORDER BY id
            ",
        )
        .bind(query.collection.as_str())
        .bind(Value::Object(filter))
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("query", e))?;

        rows.iter()
            .map(|row| {
                Ok(Document {
                    collection: query.collection,
                    id: row.try_get("id").map_err(|e| map_sqlx_error("query", e))?,
                    revision: Revision::new(to_u64(
                        row.try_get("revision").map_err(|e| map_sqlx_error("query", e))?,
                    )?),
                    data: row.try_get("data").map_err(|e| map_sqlx_error("query", e))?,
                })
            })
            .collect()
    }

    async fn apply(tx: &mut Transaction<'_, Postgres>, write: WriteOp) -> Result<(), StoreError> {
        let collection = write.collection();
        let id = write.id().to_string();

        let current: Option<i64> = sqlx::query_scalar(
            "SELECT revision FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection.as_str())
        .bind(&id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("commit", e))?;
        let current = current.map(to_u64).transpose()?.map(Revision::new);

        let check = |expected: Option<Revision>| match expected {
            Some(expected) if current != Some(expected) => {
                metrics::counter!("talkboard_store_conflicts_total", "collection" => collection.as_str())
                    .increment(1);
                Err(StoreError::ConcurrencyConflict {
                    collection,
                    id: id.clone(),
                    expected,
                    actual: current,
                })
            }
            _ => Ok(()),
        };

        match write {
            WriteOp::Create { data, .. } => {
                if current.is_some() {
                    return Err(StoreError::AlreadyExists { collection, id });
                }
                sqlx::query(
                    "INSERT INTO documents (collection, id, revision, data) VALUES ($1, $2, 1, $3)",
                )
                .bind(collection.as_str())
                .bind(&id)
                .bind(data)
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    if unique_violation(&e) {
                        StoreError::AlreadyExists {
                            collection,
                            id: id.clone(),
                        }
                    } else {
                        map_sqlx_error("commit", e)
                    }
                })?;
            }
            WriteOp::Update { data, expected, .. } => {
                check(expected)?;
                if current.is_none() {
                    return Err(StoreError::NotFound { collection, id });
                }
                sqlx::query(
                    r"
                    UPDATE documents
                    SET data = $3, revision = revision + 1, updated_at = now()
                    WHERE collection = $1 AND id = $2
                    ",
                )
                .bind(collection.as_str())
                .bind(&id)
                .bind(data)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("commit", e))?;
            }
            WriteOp::Delete { expected, .. } => {
                check(expected)?;
                sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                    .bind(collection.as_str())
                    .bind(&id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("commit", e))?;
            }
        }
        Ok(())
    }
}

impl DocumentStore for PostgresDocumentStore {
    fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Document>, StoreError>> + Send + '_>> {
        let id = id.to_string();
        Box::pin(async move {
            let row = sqlx::query("SELECT revision, data FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.as_str())
                .bind(&id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("get", e))?;

            row.map(|row| {
                Ok(Document {
                    collection,
                    id: id.clone(),
                    revision: Revision::new(to_u64(
                        row.try_get("revision").map_err(|e| map_sqlx_error("get", e))?,
                    )?),
                    data: row.try_get("data").map_err(|e| map_sqlx_error("get", e))?,
                })
            })
            .transpose()
        })
    }

    fn query(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Document>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("query", e))?;
            let documents = Self::select(&mut tx, &query).await?;
            tx.commit().await.map_err(|e| map_sqlx_error("query", e))?;
            Ok(documents)
        })
    }

    fn commit(
        &self,
        writes: Vec<WriteOp>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut collections: Vec<&'static str> = Vec::new();
            for write in &writes {
                let name = write.collection().as_str();
                if !collections.contains(&name) {
                    collections.push(name);
                }
            }

            // Dropping the transaction on an early return rolls it back.
            let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("commit", e))?;
            for write in writes {
                Self::apply(&mut tx, write).await?;
            }

            let sequence: i64 =
                sqlx::query_scalar("UPDATE store_sequence SET value = value + 1 RETURNING value")
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("commit", e))?;

            sqlx::query("SELECT pg_notify($1, $2)")
                .bind(CHANNEL)
                .bind(format!("{sequence}:{}", collections.join(",")))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("commit", e))?;

            tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
            to_u64(sequence)
        })
    }

    fn subscribe(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, StoreError>> + Send + '_>> {
        Box::pin(async move {
            // Listen before the first read so no commit falls between the two.
            let mut listener = PgListener::connect_with(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("subscribe", e))?;
            listener
                .listen(CHANNEL)
                .await
                .map_err(|e| map_sqlx_error("subscribe", e))?;

            let initial = Self::snapshot(&self.pool, &query).await?;
            let pool = self.pool.clone();
            let wanted = query.collection.as_str();

            let snapshots: SnapshotStream = Box::pin(stream! {
                yield Ok(initial);
                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            let touched = notification
                                .payload()
                                .split_once(':')
                                .is_none_or(|(_, names)| names.split(',').any(|n| n == wanted));
                            if touched {
                                yield Self::snapshot(&pool, &query).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Document listener lost its connection");
                            yield Err(map_sqlx_error("subscribe", e));
                            break;
                        }
                    }
                }
            });
            Ok(snapshots)
        })
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ping", e))?;
            Ok(())
        })
    }
}

fn to_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Serialization(format!("negative counter {value}")))
}

fn unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Connection-level failures are transient; everything else is a database error.
fn map_sqlx_error(call: &'static str, error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(format!("{call}: {error}")),
        // Serialization failure or deadlock: safe to run the whole commit again.
        sqlx::Error::Database(ref db)
            if matches!(db.code().as_deref(), Some("40001" | "40P01")) =>
        {
            StoreError::Unavailable(format!("{call}: {error}"))
        }
        other => StoreError::Database(format!("{call}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_transient() {
        assert!(map_sqlx_error("get", sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx_error("get", sqlx::Error::PoolClosed).is_transient());
        assert!(!map_sqlx_error("get", sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_negative_counters_are_rejected() {
        assert_eq!(to_u64(7), Ok(7));
        assert!(to_u64(-1).is_err());
    }

    #[test]
    fn test_migration_creates_both_tables() {
        assert!(MIGRATION.contains("CREATE TABLE IF NOT EXISTS documents"));
        assert!(MIGRATION.contains("CREATE TABLE IF NOT EXISTS store_sequence"));
    }
}

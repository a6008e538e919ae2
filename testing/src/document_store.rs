//! In-memory document store with fault injection.
//!
//! [`InMemoryDocumentStore`] implements the full [`DocumentStore`] contract
//! (atomic commits, per-document revisions, snapshot subscriptions) over a
//! `BTreeMap`. Tests can make the next calls fail, make commits conflict or
//! add latency to every call.

use async_stream::stream;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use talkboard_core::document_store::{
    Collection, Document, DocumentStore, Query, Revision, SnapshotStream, StoreError, WriteOp,
};
use talkboard_core::subscription::Snapshot;
use tokio::sync::broadcast;

type Key = (Collection, String);

#[derive(Debug, Default)]
struct State {
    documents: BTreeMap<Key, (Revision, Value)>,
    sequence: u64,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable_calls: usize,
    unavailable_commits: usize,
    commits_before_failure: usize,
    conflicting_commits: usize,
    latency: Option<Duration>,
}

/// In-memory [`DocumentStore`] for tests and single-process deployments.
///
/// # Example
///
/// ```
/// use talkboard_testing::InMemoryDocumentStore;
/// use talkboard_core::document_store::{Collection, DocumentStore, WriteOp};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryDocumentStore::new();
/// store.commit(vec![WriteOp::create(Collection::Talks, "t1", json!({"title": "Rust"}))]).await?;
/// assert_eq!(store.len(Collection::Talks), 1);
///
/// // Next call fails as if the network dropped
/// store.fail_next_calls(1);
/// assert!(store.get(Collection::Talks, "t1").await.is_err());
/// assert!(store.get(Collection::Talks, "t1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
    changes: broadcast::Sender<(u64, Vec<Collection>)>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            state: Arc::new(Mutex::new(State::default())),
            faults: Arc::new(Mutex::new(Faults::default())),
            changes,
        }
    }

    /// The next `n` calls of any kind fail with `Unavailable`.
    pub fn fail_next_calls(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.unavailable_calls = n;
        }
    }

    /// The next `n` commits fail with `Unavailable` without applying anything.
    pub fn fail_next_commits(&self, n: usize) {
        self.fail_commits_after(0, n);
    }

    /// Let `succeed` commits through, then fail the `fail` after them with
    /// `Unavailable`. Interrupts multi-commit operations part way.
    pub fn fail_commits_after(&self, succeed: usize, fail: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.commits_before_failure = succeed;
            faults.unavailable_commits = fail;
        }
    }

    /// The next `n` commits fail with `ConcurrencyConflict`, as if another
    /// writer had got there first.
    pub fn conflict_next_commits(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.conflicting_commits = n;
        }
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.latency = latency;
        }
    }

    /// Number of documents in `collection`.
    #[must_use]
    pub fn len(&self, collection: Collection) -> usize {
        self.state.lock().map_or(0, |state| {
            state
                .documents
                .keys()
                .filter(|(c, _)| *c == collection)
                .count()
        })
    }

    /// Whether `collection` holds no documents.
    #[must_use]
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Current store sequence.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.state.lock().map_or(0, |state| state.sequence)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("state lock poisoned".to_string()))
    }

    async fn before_call(&self, is_commit: bool) -> Result<(), StoreError> {
        let latency = {
            let mut faults = self
                .faults
                .lock()
                .map_err(|_| StoreError::Database("fault lock poisoned".to_string()))?;

            if faults.unavailable_calls > 0 {
                faults.unavailable_calls -= 1;
                return Err(StoreError::Unavailable("injected failure".to_string()));
            }
            if is_commit && faults.unavailable_commits > 0 {
                if faults.commits_before_failure > 0 {
                    faults.commits_before_failure -= 1;
                } else {
                    faults.unavailable_commits -= 1;
                    return Err(StoreError::Unavailable("injected commit failure".to_string()));
                }
            }
            faults.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    fn take_injected_conflict(&self, writes: &[WriteOp]) -> Result<(), StoreError> {
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| StoreError::Database("fault lock poisoned".to_string()))?;
        if faults.conflicting_commits == 0 {
            return Ok(());
        }
        faults.conflicting_commits -= 1;

        let (collection, id) = writes
            .first()
            .map_or((Collection::System, String::new()), |w| (w.collection(), w.id().to_string()));
        Err(StoreError::ConcurrencyConflict {
            collection,
            id,
            expected: Revision::INITIAL,
            actual: None,
        })
    }

    fn run_query(state: &State, query: &Query) -> Vec<Document> {
        state
            .documents
            .iter()
            .filter(|((collection, _), _)| *collection == query.collection)
            .map(|((collection, id), (revision, data))| Document {
                collection: *collection,
                id: id.clone(),
                revision: *revision,
                data: data.clone(),
            })
            .filter(|doc| query.matches(doc))
            .collect()
    }

    fn apply(state: &mut State, writes: Vec<WriteOp>) -> Result<(u64, Vec<Collection>), StoreError> {
        // Stage against an overlay so a failing write leaves nothing applied.
        let mut staged: HashMap<Key, Option<(Revision, Value)>> = HashMap::new();
        let mut touched = Vec::new();

        for write in writes {
            let collection = write.collection();
            if !touched.contains(&collection) {
                touched.push(collection);
            }
            let key = (collection, write.id().to_string());
            let current = staged
                .get(&key)
                .cloned()
                .unwrap_or_else(|| state.documents.get(&key).cloned());
            let current_revision = current.as_ref().map(|(r, _)| *r);

            let check = |expected: Option<Revision>| match expected {
                Some(expected) if current_revision != Some(expected) => {
                    Err(StoreError::ConcurrencyConflict {
                        collection,
                        id: key.1.clone(),
                        expected,
                        actual: current_revision,
                    })
                }
                _ => Ok(()),
            };

            match write {
                WriteOp::Create { data, .. } => {
                    if current.is_some() {
                        return Err(StoreError::AlreadyExists {
                            collection,
                            id: key.1,
                        });
                    }
                    staged.insert(key, Some((Revision::INITIAL, data)));
                }
                WriteOp::Update { data, expected, .. } => {
                    check(expected)?;
                    let Some(revision) = current_revision else {
                        return Err(StoreError::NotFound {
                            collection,
                            id: key.1,
                        });
                    };
                    staged.insert(key, Some((revision.next(), data)));
                }
                WriteOp::Delete { expected, .. } => {
                    check(expected)?;
                    staged.insert(key, None);
                }
            }
        }

        for (key, entry) in staged {
            match entry {
                Some(entry) => {
                    state.documents.insert(key, entry);
                }
                None => {
                    state.documents.remove(&key);
                }
            }
        }
        state.sequence += 1;
        Ok((state.sequence, touched))
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Document>, StoreError>> + Send + '_>> {
        let key = (collection, id.to_string());
        Box::pin(async move {
            self.before_call(false).await?;
            let state = self.lock_state()?;
            Ok(state.documents.get(&key).map(|(revision, data)| Document {
                collection,
                id: key.1.clone(),
                revision: *revision,
                data: data.clone(),
            }))
        })
    }

    fn query(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Document>, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.before_call(false).await?;
            let state = self.lock_state()?;
            Ok(Self::run_query(&state, &query))
        })
    }

    fn commit(
        &self,
        writes: Vec<WriteOp>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.before_call(true).await?;
            self.take_injected_conflict(&writes)?;

            let (sequence, touched) = {
                let mut state = self.lock_state()?;
                Self::apply(&mut state, writes)?
            };
            // No receivers is fine
            let _ = self.changes.send((sequence, touched));
            Ok(sequence)
        })
    }

    fn subscribe(
        &self,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = Result<SnapshotStream, StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.before_call(false).await?;

            // Subscribe before reading so no commit falls between the two.
            let mut changes = self.changes.subscribe();
            let initial = {
                let state = self.lock_state()?;
                Snapshot {
                    sequence: state.sequence,
                    documents: Self::run_query(&state, &query),
                }
            };
            let store = self.clone();

            let snapshots: SnapshotStream = Box::pin(stream! {
                yield Ok(initial);
                loop {
                    match changes.recv().await {
                        Ok((_, collections)) if !collections.contains(&query.collection) => {}
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            let snapshot = store.lock_state().map(|state| Snapshot {
                                sequence: state.sequence,
                                documents: Self::run_query(&state, &query),
                            });
                            yield snapshot;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            Ok(snapshots)
        })
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move { self.before_call(false).await })
    }
}

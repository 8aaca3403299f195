//! Store boundary.
//!
//! [`DocumentStore`] is the narrow interface the sync engine needs from a
//! document store: a count, "first document ordered by `created`", and an
//! unordered bulk replace-with-upsert. [`MemoryStore`] is an in-process
//! implementation used by tests, benchmarks and dry runs.

use crate::error::{StoreError, WriteError};
use crate::stats::CollectionStats;
use crate::{Document, RecordId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Sort direction for [`DocumentStore::first_by_created`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Identity and ordering key of a stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHead {
    pub id: RecordId,
    pub created: DateTime<Utc>,
}

/// Outcome of an unordered bulk upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Documents inserted without an upsert filter
    pub inserted_count: u64,
    /// Documents created because no document matched the filter
    pub upserted_count: u64,
    /// Documents matched by the filter
    pub matched_count: u64,
    /// Matched documents whose content actually changed
    pub modified_count: u64,
    /// Operations that failed while the rest of the batch was applied
    pub write_errors: Vec<WriteError>,
}

impl BulkWriteResult {
    /// Documents created or replaced by the write.
    pub fn affected(&self) -> u64 {
        self.inserted_count + self.upserted_count + self.modified_count
    }
}

/// A document collection the engine can read from and write to.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Number of stored documents.
    async fn count(&self) -> Result<u64, StoreError>;

    /// First document ordered by `created` in the given direction.
    ///
    /// Documents without `created` are never returned.
    async fn first_by_created(&self, order: SortOrder) -> Result<Option<DocumentHead>, StoreError>;

    /// Replace each document by id, inserting it when absent.
    ///
    /// Operations are unordered: one failing operation does not prevent the
    /// others from applying and is reported in
    /// [`BulkWriteResult::write_errors`]. An `Err` means nothing is known to
    /// have been applied.
    async fn bulk_upsert(&self, docs: &[Document]) -> Result<BulkWriteResult, StoreError>;

    /// Count and `created` range of the collection.
    ///
    /// The default issues three reads; backends that can answer in one
    /// consistent query should override it.
    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let total_records = self.count().await?;
        if total_records == 0 {
            return Ok(CollectionStats::empty());
        }
        let oldest = self.first_by_created(SortOrder::Ascending).await?;
        let newest = self.first_by_created(SortOrder::Descending).await?;
        Ok(CollectionStats {
            total_records,
            oldest_date: oldest.map(|h| h.created),
            newest_date: newest.map(|h| h.created),
        })
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    docs: HashMap<RecordId, Document>,
    write_calls: usize,
    failing_calls: HashSet<usize>,
    rejected_ids: HashSet<RecordId>,
    unavailable: bool,
}

/// In-memory [`DocumentStore`] with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `docs`.
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock();
            for doc in docs {
                state.docs.insert(doc.id().to_string(), doc);
            }
        }
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Every mutation is a single insert, so a poisoned map is still consistent.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Get a document by id.
    pub fn get(&self, id: &str) -> Option<Document> {
        self.lock().docs.get(id).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `bulk_upsert` calls received so far.
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// Make the `call`-th `bulk_upsert` (zero based) fail as a whole.
    pub fn fail_write_call(&self, call: usize) {
        self.lock().failing_calls.insert(call);
    }

    /// Make every upsert of `id` fail individually.
    pub fn reject_id(&self, id: impl Into<RecordId>) {
        self.lock().rejected_ids.insert(id.into());
    }

    /// Simulate a lost connection: every call fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn count(&self) -> Result<u64, StoreError> {
        let state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(state.docs.len() as u64)
    }

    async fn first_by_created(&self, order: SortOrder) -> Result<Option<DocumentHead>, StoreError> {
        let state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let dated = state
            .docs
            .values()
            .filter_map(|doc| doc.created().map(|created| (created, doc.id())));
        let pick = match order {
            SortOrder::Ascending => dated.min(),
            SortOrder::Descending => dated.max(),
        };
        Ok(pick.map(|(created, id)| DocumentHead {
            id: id.to_string(),
            created,
        }))
    }

    async fn bulk_upsert(&self, docs: &[Document]) -> Result<BulkWriteResult, StoreError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }

        let call = state.write_calls;
        state.write_calls += 1;
        if state.failing_calls.contains(&call) {
            return Err(StoreError::Rejected(format!("bulk write {call} rejected")));
        }

        let mut result = BulkWriteResult::default();
        for (index, doc) in docs.iter().enumerate() {
            if state.rejected_ids.contains(doc.id()) {
                result.write_errors.push(WriteError {
                    index,
                    id: doc.id().to_string(),
                    message: "document rejected".into(),
                });
                continue;
            }
            match state.docs.insert(doc.id().to_string(), doc.clone()) {
                None => result.upserted_count += 1,
                Some(previous) => {
                    result.matched_count += 1;
                    if previous != *doc {
                        result.modified_count += 1;
                    }
                }
            }
        }
        Ok(result)
    }
}

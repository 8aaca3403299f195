//! # docsync engine
//!
//! Incremental synchronization of a document collection from a periodically
//! refreshed full snapshot.
//!
//! Each run reads the collection's high-water mark (the newest stored
//! `created` timestamp), keeps only snapshot rows newer than it, normalizes
//! those rows into documents, and writes them in batches with unordered
//! replace-by-id upserts. Running twice over the same snapshot writes nothing
//! the second time.
//!
//! ## Design Principles
//!
//! - **No I/O of its own**: storage is reached only through [`DocumentStore`]
//! - **Per-row isolation**: a bad row or a rejected batch is counted, not fatal
//! - **Absent, never null**: documents only carry fields that have a value
//!
//! ## Core Concepts
//!
//! ### Snapshots
//!
//! A [`Snapshot`] holds ordered rows over named columns. Cells are loosely
//! typed ([`Cell`]) because exports mix native values, NaN-as-missing and
//! JSON encoded as text.
//!
//! ### Normalization
//!
//! [`normalize`] coerces a row into a [`Document`] following a
//! [`RecordSchema`]. Each [`FieldType`] has an `Option`-returning coercion in
//! [`coerce`]; anything unconvertible is dropped. Only a missing identifier
//! is an error.
//!
//! ### Sync
//!
//! [`SyncEngine::sync`] runs the incremental update and returns
//! [`SyncStats`]. [`StatsReader`] reports count and `created` range.
//!
//! ## Quick Start
//!
//! ```rust
//! use docsync_engine::{MemoryStore, Snapshot, SyncEngine};
//! use serde_json::json;
//!
//! # tokio_test();
//! # fn tokio_test() {
//! # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! # rt.block_on(async {
//! let rows = vec![
//!     json!({"id": "1", "created": "2024-05-01", "interactions": "[]"}),
//!     json!({"id": "2", "created": "2024-05-02", "solved": true}),
//! ];
//! let snapshot = Snapshot::from_json_rows(
//!     rows.into_iter().filter_map(|v| v.as_object().cloned()),
//! );
//!
//! let store = MemoryStore::new();
//! let stats = SyncEngine::new(&store).sync(&snapshot).await.unwrap();
//! assert_eq!(stats.new_records, 2);
//!
//! // Nothing new the second time.
//! let again = SyncEngine::new(&store).sync(&snapshot).await.unwrap();
//! assert_eq!(again.new_records, 0);
//! # });
//! # }
//! ```

pub mod coerce;
pub mod document;
pub mod error;
pub mod normalize;
pub mod schema;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod sync;

// Re-export main types at crate root
pub use document::{Document, FieldValue};
pub use error::{Error, Result, StoreError, WriteError};
pub use normalize::{coerce_field, normalize};
pub use schema::{FieldDef, FieldType, RecordSchema, CREATED_FIELD, ID_FIELD};
pub use snapshot::{Cell, Row, Snapshot};
pub use stats::{CollectionStats, StatsReader};
pub use store::{BulkWriteResult, DocumentHead, DocumentStore, MemoryStore, SortOrder};
pub use sync::{eligible_rows, SyncEngine, SyncOptions, SyncStats, DEFAULT_BATCH_SIZE};

/// Type aliases for clarity
pub type RecordId = String;

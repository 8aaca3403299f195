//! Incremental sync.
//!
//! # Algorithm
//!
//! 1. Read the high-water mark (`max(created)`) from the store
//! 2. Keep snapshot rows strictly newer than the mark (all rows when the
//!    collection is empty); stop early when none qualify
//! 3. Split the eligible rows into order-preserving batches
//! 4. Normalize each row; rows without an id are counted and skipped
//! 5. Write each batch with one unordered bulk upsert; a rejected batch is
//!    counted and the run moves on, an unreachable store aborts the run
//!
//! The engine keeps no state between runs. Everything it needs lives in the
//! store, so re-running over the same snapshot writes nothing new.

use crate::coerce;
use crate::error::StoreError;
use crate::normalize::normalize;
use crate::schema::{RecordSchema, CREATED_FIELD};
use crate::snapshot::{Row, Snapshot};
use crate::stats::StatsReader;
use crate::store::DocumentStore;
use crate::{Document, Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Rows per bulk write unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Row failures logged at `warn` before the rest drop to `debug`.
const LOGGED_ROW_FAILURES: u64 = 5;

/// Tunables for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum documents per bulk write, must be positive
    pub batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncOptions {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self { batch_size }
    }
}

/// Counters returned by a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Documents inserted or replaced
    pub new_records: u64,
    /// Rows skipped during normalization plus documents whose write failed
    pub errors: u64,
    /// Rows that passed the high-water-mark filter
    pub total_processed: u64,
}

impl std::fmt::Display for SyncStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "new_records={} errors={} total_processed={}",
            self.new_records, self.errors, self.total_processed
        )
    }
}

/// Rows whose `created` parses to a timestamp strictly after `mark`.
///
/// With no mark every row qualifies. Rows with a missing or unparseable
/// `created` never pass a mark.
pub fn eligible_rows(snapshot: &Snapshot, mark: Option<DateTime<Utc>>) -> Vec<Row<'_>> {
    match mark {
        None => snapshot.rows().collect(),
        Some(mark) => snapshot
            .rows()
            .filter(|row| {
                coerce::to_timestamp(row.get(CREATED_FIELD)).is_some_and(|created| created > mark)
            })
            .collect(),
    }
}

/// Runs incremental syncs of snapshots into one store.
pub struct SyncEngine<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    schema: RecordSchema,
    options: SyncOptions,
}

impl<'a, S: DocumentStore + ?Sized> SyncEngine<'a, S> {
    /// Create an engine for the complaints schema with default options.
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            schema: RecordSchema::complaints(),
            options: SyncOptions::default(),
        }
    }

    pub fn with_schema(mut self, schema: RecordSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Current high-water mark of the store.
    pub async fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>> {
        StatsReader::new(self.store).high_water_mark().await
    }

    /// Write every snapshot row newer than the store's high-water mark.
    pub async fn sync(&self, snapshot: &Snapshot) -> Result<SyncStats> {
        let batch_size = self.options.batch_size;
        if batch_size == 0 {
            return Err(Error::InvalidOptions("batch size must be positive".into()));
        }

        let mark = self.high_water_mark().await?;
        let eligible = eligible_rows(snapshot, mark);
        match mark {
            None => info!(rows = eligible.len(), "collection empty, inserting every snapshot row"),
            Some(mark) => {
                info!(high_water_mark = %mark, eligible = eligible.len(), "filtered snapshot");
                if eligible.is_empty() {
                    info!("collection already up to date");
                    return Ok(SyncStats::default());
                }
            }
        }

        let total = eligible.len();
        let batches = total.div_ceil(batch_size);
        let mut stats = SyncStats {
            total_processed: total as u64,
            ..SyncStats::default()
        };
        let mut row_failures = 0u64;
        let started = Instant::now();

        info!(total, batch_size, batches, "processing eligible rows");

        for (batch_no, batch) in eligible.chunks(batch_size).enumerate() {
            let docs = self.prepare_batch(batch_no * batch_size, batch, &mut row_failures);
            stats.errors += (batch.len() - docs.len()) as u64;

            if docs.is_empty() {
                warn!(batch = batch_no + 1, "no documents prepared for batch");
            } else {
                self.write_batch(batch_no + 1, &docs, &mut stats).await?;
            }

            let processed = (batch_no * batch_size + batch.len()) as f64;
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { processed / elapsed } else { 0.0 };
            let eta = if rate > 0.0 {
                (total as f64 - processed) / rate
            } else {
                0.0
            };
            info!(
                batch = batch_no + 1,
                batches,
                processed = processed as u64,
                total,
                percent = %format!("{:.1}", 100.0 * processed / total as f64),
                rows_per_sec = rate as u64,
                eta_secs = eta as u64,
                written = stats.new_records,
                "batch done"
            );
        }

        info!(
            new_records = stats.new_records,
            errors = stats.errors,
            total_processed = stats.total_processed,
            "incremental sync finished"
        );
        Ok(stats)
    }

    fn prepare_batch(&self, offset: usize, rows: &[Row<'_>], failures: &mut u64) -> Vec<Document> {
        let mut docs = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            match normalize(&self.schema, row) {
                Ok(doc) => docs.push(doc),
                Err(err) => {
                    *failures += 1;
                    if *failures <= LOGGED_ROW_FAILURES {
                        warn!(row = offset + i, error = %err, "skipping row");
                    } else {
                        debug!(row = offset + i, error = %err, "skipping row");
                    }
                }
            }
        }
        docs
    }

    async fn write_batch(&self, batch: usize, docs: &[Document], stats: &mut SyncStats) -> Result<()> {
        match self.store.bulk_upsert(docs).await {
            Ok(result) => {
                stats.new_records += result.affected();
                if !result.write_errors.is_empty() {
                    stats.errors += result.write_errors.len() as u64;
                    for failed in result.write_errors.iter().take(LOGGED_ROW_FAILURES as usize) {
                        warn!(batch, id = %failed.id, error = %failed.message, "document write failed");
                    }
                }
                debug!(
                    batch,
                    upserted = result.upserted_count,
                    matched = result.matched_count,
                    modified = result.modified_count,
                    "bulk write applied"
                );
                Ok(())
            }
            Err(StoreError::Rejected(message)) => {
                let failure = Error::BatchWriteFailure {
                    attempted: docs.len(),
                    message,
                };
                error!(batch, error = %failure, "bulk write failed, continuing with next batch");
                stats.errors += docs.len() as u64;
                Ok(())
            }
            Err(StoreError::Unavailable(message)) => {
                error!(batch, error = %message, "store unavailable, aborting sync");
                Err(Error::StoreUnavailable(message))
            }
        }
    }
}

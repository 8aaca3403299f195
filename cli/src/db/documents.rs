//! Document collection backed by the `documents` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_engine::{
    BulkWriteResult, CollectionStats, Document, DocumentHead, DocumentStore, SortOrder, StoreError,
    WriteError,
};
use std::collections::HashMap;

use super::Pool;

/// A [`DocumentStore`] over one logical collection in Postgres.
///
/// Each collection is a slice of the shared `documents` table keyed by
/// `(collection, id)`. The full normalized document lives in a JSONB column;
/// `created` is duplicated into its own column for the high-water-mark index.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: Pool,
    collection: String,
}

impl PgDocumentStore {
    pub fn new(pool: Pool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

/// Map a driver error onto the engine's failure classes.
///
/// Anything that means the database could not be reached is `Unavailable` and
/// aborts a sync; errors raised by the database for a statement are
/// `Rejected` and only fail the batch.
pub fn classify_sqlx_error(err: sqlx::Error) -> StoreError {
    let message = err.to_string();
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(message),
        _ => StoreError::Rejected(message),
    }
}

const UPSERT_BATCH_SQL: &str = r#"
    INSERT INTO documents (collection, id, created, document)
    SELECT $1::text, t.id, t.created, t.document
    FROM UNNEST($2::text[], $3::timestamptz[], $4::jsonb[]) AS t(id, created, document)
    ON CONFLICT (collection, id) DO UPDATE SET
        created = EXCLUDED.created,
        document = EXCLUDED.document,
        updated_at = now()
    WHERE documents.document IS DISTINCT FROM EXCLUDED.document
       OR documents.created IS DISTINCT FROM EXCLUDED.created
    RETURNING (xmax = 0) AS inserted
"#;

const UPSERT_ONE_SQL: &str = r#"
    INSERT INTO documents (collection, id, created, document)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (collection, id) DO UPDATE SET
        created = EXCLUDED.created,
        document = EXCLUDED.document,
        updated_at = now()
    WHERE documents.document IS DISTINCT FROM EXCLUDED.document
       OR documents.created IS DISTINCT FROM EXCLUDED.created
    RETURNING (xmax = 0) AS inserted
"#;

/// Column vectors for one `UNNEST` upsert. Ids are unique within a round.
#[derive(Debug, Default)]
struct UpsertColumns {
    /// Position of each row in the submitted batch
    positions: Vec<usize>,
    ids: Vec<String>,
    created: Vec<Option<DateTime<Utc>>>,
    documents: Vec<serde_json::Value>,
}

impl UpsertColumns {
    /// Split a batch into rounds in which every id appears once.
    ///
    /// The k-th occurrence of an id lands in round k. `ON CONFLICT` cannot
    /// touch the same row twice in one statement; running the rounds in order
    /// leaves the last occurrence stored and counts every occurrence.
    fn rounds(docs: &[Document]) -> Vec<Self> {
        let mut next_round: HashMap<&str, usize> = HashMap::with_capacity(docs.len());
        let mut rounds: Vec<Self> = Vec::new();

        for (index, doc) in docs.iter().enumerate() {
            let round = next_round.entry(doc.id()).or_insert(0);
            if *round == rounds.len() {
                rounds.push(Self::default());
            }
            rounds[*round].push(index, doc);
            *round += 1;
        }
        rounds
    }

    fn push(&mut self, index: usize, doc: &Document) {
        self.positions.push(index);
        self.ids.push(doc.id().to_string());
        self.created.push(doc.created());
        self.documents.push(doc.to_json());
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

fn merge_results(total: &mut BulkWriteResult, part: BulkWriteResult) {
    total.inserted_count += part.inserted_count;
    total.upserted_count += part.upserted_count;
    total.matched_count += part.matched_count;
    total.modified_count += part.modified_count;
    total.write_errors.extend(part.write_errors);
}

impl PgDocumentStore {
    /// Write one round, falling back to row-by-row writes if the database
    /// rejects the combined statement.
    async fn upsert_round(&self, round: &UpsertColumns) -> Result<BulkWriteResult, StoreError> {
        match self.upsert_batch(round).await {
            Ok(result) => Ok(result),
            Err(StoreError::Rejected(message)) => {
                tracing::warn!(
                    collection = %self.collection,
                    documents = round.len(),
                    error = %message,
                    "bulk upsert rejected, writing documents one at a time"
                );
                self.upsert_each(round).await
            }
            Err(err) => Err(err),
        }
    }

    async fn upsert_batch(&self, round: &UpsertColumns) -> Result<BulkWriteResult, StoreError> {
        let inserted: Vec<bool> = sqlx::query_scalar(UPSERT_BATCH_SQL)
            .bind(&self.collection)
            .bind(&round.ids)
            .bind(&round.created)
            .bind(&round.documents)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        let upserted = inserted.iter().filter(|fresh| **fresh).count() as u64;
        Ok(BulkWriteResult {
            upserted_count: upserted,
            matched_count: round.len() as u64 - upserted,
            modified_count: inserted.len() as u64 - upserted,
            ..BulkWriteResult::default()
        })
    }

    /// Upsert each row behind its own savepoint inside one transaction.
    ///
    /// A row the database rejects is rolled back to its savepoint and reported
    /// in `write_errors`; the other rows commit. Losing the connection aborts
    /// the whole round.
    async fn upsert_each(&self, round: &UpsertColumns) -> Result<BulkWriteResult, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;
        let mut result = BulkWriteResult::default();

        for i in 0..round.len() {
            sqlx::query("SAVEPOINT upsert_document")
                .execute(&mut *tx)
                .await
                .map_err(classify_sqlx_error)?;

            let written: Result<Option<bool>, sqlx::Error> = sqlx::query_scalar(UPSERT_ONE_SQL)
                .bind(&self.collection)
                .bind(&round.ids[i])
                .bind(round.created[i])
                .bind(&round.documents[i])
                .fetch_optional(&mut *tx)
                .await;

            match written {
                Ok(Some(true)) => result.upserted_count += 1,
                Ok(Some(false)) => {
                    result.matched_count += 1;
                    result.modified_count += 1;
                }
                Ok(None) => result.matched_count += 1,
                Err(err) => match classify_sqlx_error(err) {
                    StoreError::Rejected(message) => {
                        sqlx::query("ROLLBACK TO SAVEPOINT upsert_document")
                            .execute(&mut *tx)
                            .await
                            .map_err(classify_sqlx_error)?;
                        result.write_errors.push(WriteError {
                            index: round.positions[i],
                            id: round.ids[i].clone(),
                            message,
                        });
                    }
                    unavailable => return Err(unavailable),
                },
            }

            sqlx::query("RELEASE SAVEPOINT upsert_document")
                .execute(&mut *tx)
                .await
                .map_err(classify_sqlx_error)?;
        }

        tx.commit().await.map_err(classify_sqlx_error)?;
        Ok(result)
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM documents WHERE collection = $1")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(count as u64)
    }

    async fn first_by_created(&self, order: SortOrder) -> Result<Option<DocumentHead>, StoreError> {
        let sql = match order {
            SortOrder::Ascending => {
                r#"
                SELECT id, created FROM documents
                WHERE collection = $1 AND created IS NOT NULL
                ORDER BY created ASC
                LIMIT 1
                "#
            }
            SortOrder::Descending => {
                r#"
                SELECT id, created FROM documents
                WHERE collection = $1 AND created IS NOT NULL
                ORDER BY created DESC
                LIMIT 1
                "#
            }
        };

        let head: Option<(String, DateTime<Utc>)> = sqlx::query_as(sql)
            .bind(&self.collection)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(head.map(|(id, created)| DocumentHead { id, created }))
    }

    /// One `INSERT .. ON CONFLICT` statement per round of unique ids.
    ///
    /// Documents the database refuses are reported in `write_errors` with
    /// their batch position. Re-writing an identical document is matched but
    /// not modified.
    async fn bulk_upsert(&self, docs: &[Document]) -> Result<BulkWriteResult, StoreError> {
        let rounds = UpsertColumns::rounds(docs);
        if rounds.len() > 1 {
            tracing::debug!(
                collection = %self.collection,
                rounds = rounds.len(),
                "batch repeats ids, writing in rounds"
            );
        }

        let mut result = BulkWriteResult::default();
        for round in &rounds {
            merge_results(&mut result, self.upsert_round(round).await?);
        }
        Ok(result)
    }

    async fn stats(&self) -> Result<CollectionStats, StoreError> {
        let (total, oldest, newest): (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>) =
            sqlx::query_as(
                r#"
                SELECT count(*), min(created), max(created)
                FROM documents
                WHERE collection = $1
                "#,
            )
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;

        if total == 0 {
            return Ok(CollectionStats::empty());
        }
        Ok(CollectionStats {
            total_records: total as u64,
            oldest_date: oldest,
            newest_date: newest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use docsync_engine::FieldValue;

    fn doc(id: &str, day: u32, title: &str) -> Document {
        let mut doc = Document::new(id);
        doc.insert(
            "created",
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).single().unwrap()),
        );
        doc.insert("title", FieldValue::String(title.into()));
        doc
    }

    #[test]
    fn repeated_ids_move_to_later_rounds() {
        let docs = vec![doc("a", 1, "first"), doc("b", 2, "b"), doc("a", 3, "second")];
        let rounds = UpsertColumns::rounds(&docs);

        assert_eq!(rounds.len(), 2);
        assert_eq!(rounds[0].ids, ["a", "b"]);
        assert_eq!(rounds[0].positions, [0, 1]);
        assert_eq!(rounds[1].ids, ["a"]);
        assert_eq!(rounds[1].positions, [2]);
        assert_eq!(rounds[1].documents[0]["title"], "second");
        assert_eq!(
            rounds[1].created[0],
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).single()
        );
    }

    #[test]
    fn unique_ids_fit_one_round() {
        let docs = vec![doc("a", 1, "a"), doc("b", 2, "b"), doc("c", 3, "c")];
        let rounds = UpsertColumns::rounds(&docs);

        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].len(), 3);
        assert!(UpsertColumns::rounds(&[]).is_empty());
    }

    #[test]
    fn undated_documents_bind_null_created() {
        let rounds = UpsertColumns::rounds(&[Document::new("x")]);
        assert_eq!(rounds[0].created, [None]);
        assert_eq!(rounds[0].documents[0], serde_json::json!({"id": "x"}));
    }

    #[test]
    fn round_results_add_up() {
        let mut total = BulkWriteResult {
            upserted_count: 2,
            ..BulkWriteResult::default()
        };
        merge_results(
            &mut total,
            BulkWriteResult {
                upserted_count: 1,
                matched_count: 1,
                modified_count: 1,
                write_errors: vec![WriteError {
                    index: 3,
                    id: "bad".into(),
                    message: "rejected".into(),
                }],
                ..BulkWriteResult::default()
            },
        );

        assert_eq!(total.upserted_count, 3);
        assert_eq!(total.matched_count, 1);
        assert_eq!(total.affected(), 4);
        assert_eq!(total.write_errors.len(), 1);
        assert_eq!(total.write_errors[0].index, 3);
    }

    #[test]
    fn connection_errors_are_unavailable() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(classify_sqlx_error(io), StoreError::Unavailable(_)));
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Rejected(_)
        ));
    }

    // The tests below need a running PostgreSQL database:
    // DATABASE_URL=postgres://... cargo test -p docsync-cli -- --ignored

    async fn test_store() -> PgDocumentStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = crate::db::create_pool(&url, 2).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let collection = format!(
            "test_{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        PgDocumentStore::new(pool, collection)
    }

    async fn drop_collection(store: &PgDocumentStore) {
        sqlx::query("DELETE FROM documents WHERE collection = $1")
            .bind(store.collection())
            .execute(&store.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn upsert_counts_inserts_and_changes() {
        let store = test_store().await;

        let first = store
            .bulk_upsert(&[doc("a", 1, "one"), doc("b", 2, "two")])
            .await
            .unwrap();
        assert_eq!(first.upserted_count, 2);
        assert_eq!(first.affected(), 2);

        let second = store
            .bulk_upsert(&[doc("a", 1, "one"), doc("b", 2, "changed")])
            .await
            .unwrap();
        assert_eq!(second.upserted_count, 0);
        assert_eq!(second.matched_count, 2);
        assert_eq!(second.modified_count, 1);

        assert_eq!(store.count().await.unwrap(), 2);
        drop_collection(&store).await;
    }

    #[tokio::test]
    #[ignore]
    async fn rejected_document_does_not_sink_its_batch() {
        let store = test_store().await;
        let mut bad = doc("bad", 2, "bad");
        bad.insert("description", FieldValue::String("nul \u{0000} byte".into()));

        let result = store
            .bulk_upsert(&[doc("good1", 1, "one"), bad, doc("good2", 3, "two")])
            .await
            .unwrap();

        assert_eq!(result.upserted_count, 2);
        assert_eq!(result.write_errors.len(), 1);
        assert_eq!(result.write_errors[0].index, 1);
        assert_eq!(result.write_errors[0].id, "bad");
        assert_eq!(store.count().await.unwrap(), 2);
        drop_collection(&store).await;
    }

    #[tokio::test]
    #[ignore]
    async fn rejected_row_is_counted_as_a_sync_error() {
        use docsync_engine::{Snapshot, SyncEngine};
        use serde_json::json;

        let store = test_store().await;
        let rows = [
            json!({"id": "good1", "created": "2024-03-01"}),
            json!({"id": "bad", "created": "2024-03-02", "description": "nul \u{0000} byte"}),
            json!({"id": "good2", "created": "2024-03-03"}),
        ];
        let snapshot = Snapshot::from_json_rows(rows.iter().filter_map(|v| v.as_object().cloned()));

        let stats = SyncEngine::new(&store).sync(&snapshot).await.unwrap();

        assert_eq!(stats.new_records, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_processed, 3);
        assert_eq!(store.count().await.unwrap(), 2);
        drop_collection(&store).await;
    }

    #[tokio::test]
    #[ignore]
    async fn repeated_ids_count_every_occurrence() {
        let store = test_store().await;

        let result = store
            .bulk_upsert(&[doc("dup", 1, "first"), doc("dup", 2, "second")])
            .await
            .unwrap();

        assert_eq!(result.upserted_count, 1);
        assert_eq!(result.modified_count, 1);
        assert_eq!(result.affected(), 2);
        assert_eq!(store.count().await.unwrap(), 1);

        let title: String = sqlx::query_scalar(
            "SELECT document->>'title' FROM documents WHERE collection = $1 AND id = 'dup'",
        )
        .bind(store.collection())
        .fetch_one(&store.pool)
        .await
        .unwrap();
        assert_eq!(title, "second");
        drop_collection(&store).await;
    }

    #[tokio::test]
    #[ignore]
    async fn stats_and_high_water_mark() {
        let store = test_store().await;
        assert_eq!(store.stats().await.unwrap(), CollectionStats::empty());

        store
            .bulk_upsert(&[doc("a", 5, "a"), doc("b", 2, "b"), Document::new("undated")])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.oldest_date, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).single());
        assert_eq!(stats.newest_date, Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).single());

        let newest = store
            .first_by_created(SortOrder::Descending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newest.id, "a");
        drop_collection(&store).await;
    }

    #[tokio::test]
    #[ignore]
    async fn incremental_sync_against_postgres() {
        use docsync_engine::{Snapshot, SyncEngine, SyncOptions};
        use serde_json::json;

        let store = test_store().await;
        let rows = (1..=9)
            .map(|day| json!({"id": format!("r{day}"), "created": format!("2024-02-0{day}")}))
            .filter_map(|v| v.as_object().cloned());
        let snapshot = Snapshot::from_json_rows(rows);
        let engine = SyncEngine::new(&store).with_options(SyncOptions::with_batch_size(4));

        let first = engine.sync(&snapshot).await.unwrap();
        assert_eq!(first.new_records, 9);
        assert_eq!(first.errors, 0);

        let second = engine.sync(&snapshot).await.unwrap();
        assert_eq!(second.new_records, 0);
        drop_collection(&store).await;
    }
}

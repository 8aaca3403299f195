//! Collection statistics.

use crate::store::{DocumentStore, SortOrder};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregate state of the collection at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub total_records: u64,
    /// Minimum `created`, `None` for an empty collection
    pub oldest_date: Option<DateTime<Utc>>,
    /// Maximum `created`, `None` for an empty collection
    pub newest_date: Option<DateTime<Utc>>,
}

impl CollectionStats {
    pub fn empty() -> Self {
        Self {
            total_records: 0,
            oldest_date: None,
            newest_date: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }
}

impl std::fmt::Display for CollectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "empty collection");
        }
        let fmt_date = |d: Option<DateTime<Utc>>| {
            d.map(|d| d.to_rfc3339()).unwrap_or_else(|| "-".to_string())
        };
        write!(
            f,
            "{} records, oldest {}, newest {}",
            self.total_records,
            fmt_date(self.oldest_date),
            fmt_date(self.newest_date)
        )
    }
}

/// Read-only view over a store's aggregate state.
pub struct StatsReader<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: DocumentStore + ?Sized> StatsReader<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Count and `created` range of the collection.
    pub async fn stats(&self) -> Result<CollectionStats> {
        Ok(self.store.stats().await?)
    }

    /// Maximum stored `created`, or `None` when nothing dated is stored.
    pub async fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>> {
        let newest = self.store.first_by_created(SortOrder::Descending).await?;
        Ok(newest.map(|head| head.created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, FieldValue};
    use crate::store::MemoryStore;
    use crate::Error;
    use chrono::TimeZone;

    fn dated(id: &str, y: i32, m: u32, d: u32) -> Document {
        let mut doc = Document::new(id);
        doc.insert(
            "created",
            FieldValue::Timestamp(Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single().unwrap()),
        );
        doc
    }

    #[tokio::test]
    async fn empty_collection_has_no_dates() {
        let store = MemoryStore::new();
        let reader = StatsReader::new(&store);

        let stats = reader.stats().await.unwrap();
        assert_eq!(stats, CollectionStats::empty());
        assert_eq!(reader.high_water_mark().await.unwrap(), None);
        assert_eq!(stats.to_string(), "empty collection");
    }

    #[tokio::test]
    async fn reports_count_and_created_range() {
        let store = MemoryStore::with_documents([
            dated("a", 2023, 6, 1),
            dated("b", 2024, 1, 1),
            dated("c", 2023, 12, 31),
        ]);
        let reader = StatsReader::new(&store);

        let stats = reader.stats().await.unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.oldest_date, Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).single());
        assert_eq!(stats.newest_date, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single());
        assert_eq!(reader.high_water_mark().await.unwrap(), stats.newest_date);
    }

    #[tokio::test]
    async fn unavailable_store_propagates() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let err = StatsReader::new(&store).stats().await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
    }
}

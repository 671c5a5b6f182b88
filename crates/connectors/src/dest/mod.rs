pub mod clickhouse;

use crate::error::DestError;
use async_trait::async_trait;
use chrono::NaiveDate;
use model::{core::value::Value, records::row::RowData};

/// Predicate for conditional deletes on the destination.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletePredicate {
    /// Inclusive calendar-date window on a temporal column.
    DateWithin {
        column: String,
        from: NaiveDate,
        to: NaiveDate,
    },
    /// One calendar date (a single partition for daily granularity).
    DateEq { column: String, date: NaiveDate },
}

/// Batched append, conditional delete, and compaction against the
/// analytical store. Append-only: consistency is restored by compaction,
/// not by transactions.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn insert_rows(&self, table: &str, rows: &[RowData]) -> Result<u64, DestError>;

    async fn truncate(&self, table: &str) -> Result<(), DestError>;

    async fn delete_where(&self, table: &str, predicate: &DeletePredicate)
    -> Result<(), DestError>;

    /// Compaction: background merge removing transient duplicates created
    /// by append-only writes.
    async fn optimize(&self, table: &str) -> Result<(), DestError>;

    async fn count(&self, table: &str) -> Result<u64, DestError>;

    async fn count_where(&self, table: &str, predicate: &DeletePredicate)
    -> Result<u64, DestError>;

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<Value>, DestError>;

    /// Row count after destination-side deduplication over `key_columns`
    /// (all columns when empty).
    async fn distinct_count(&self, table: &str, key_columns: &[String]) -> Result<u64, DestError>;

    /// The table's physical partition expression, when partitioned.
    async fn partition_key(&self, table: &str) -> Result<Option<String>, DestError>;
}

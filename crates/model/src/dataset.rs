use crate::core::data_type::DataType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven synchronization strategies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategyKind {
    FullRefresh,
    TimestampIncrement,
    IdIncrement,
    DateDeleteInsert,
    PartitionWindow,
    MissingRanges,
    TailAppend,
}

impl fmt::Display for SyncStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStrategyKind::FullRefresh => "full_refresh",
            SyncStrategyKind::TimestampIncrement => "timestamp_increment",
            SyncStrategyKind::IdIncrement => "id_increment",
            SyncStrategyKind::DateDeleteInsert => "date_delete_insert",
            SyncStrategyKind::PartitionWindow => "partition_window",
            SyncStrategyKind::MissingRanges => "missing_ranges",
            SyncStrategyKind::TailAppend => "tail_append",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartitionGranularity {
    Daily,
    Monthly,
}

/// Source column -> destination column with a destination type to coerce to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source: String,
    pub destination: String,
    pub data_type: DataType,
}

impl ColumnMapping {
    pub fn new(source: &str, destination: &str, data_type: DataType) -> Self {
        ColumnMapping {
            source: source.to_string(),
            destination: destination.to_string(),
            data_type,
        }
    }
}

/// Either a plain table or a raw query to read from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SourceRelation {
    Table(String),
    Query(String),
}

/// Dataset configuration owned by the external CRUD layer and consumed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    pub name: String,
    pub connection_id: String,
    /// Source table name, or a raw SELECT when `source_query` is set.
    pub source_table: String,
    pub source_query: Option<String>,
    pub dest_table: String,
    pub strategy: SyncStrategyKind,
    /// Cursor column for timestamp/id strategies.
    pub reference_column: Option<String>,
    pub row_limit: Option<u64>,
    /// Lookback window for date-delete-insert; 0 means "today only".
    pub delete_days: u32,
    pub partition_column: Option<String>,
    pub partition_granularity: Option<PartitionGranularity>,
    /// Enables modified-row detection for the partition window strategy.
    pub modified_column: Option<String>,
    pub column_mappings: Vec<ColumnMapping>,
    /// Opaque resume point persisted across runs (timestamp or max id).
    pub last_sync_cursor: Option<String>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl DatasetDescriptor {
    pub fn source_relation(&self) -> SourceRelation {
        match &self.source_query {
            Some(q) if !q.trim().is_empty() => SourceRelation::Query(q.clone()),
            _ => SourceRelation::Table(self.source_table.clone()),
        }
    }

    pub fn mapping_for(&self, source_column: &str) -> Option<&ColumnMapping> {
        self.column_mappings
            .iter()
            .find(|m| m.source.eq_ignore_ascii_case(source_column))
    }
}

/// A primary-key gap produced by the external diff/validation tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

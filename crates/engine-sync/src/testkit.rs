//! In-memory source and destination fakes for engine tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use connectors::{
    dest::{DeletePredicate, Destination},
    error::{DestError, SourceError},
    request::{FetchRequest, RowFilter},
    source::SourceAdapter,
};
use model::{
    connection::SourceKind,
    core::value::Value,
    dataset::SourceRelation,
    records::row::{FieldValue, RowData},
};
use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
};
use tokio::sync::Mutex;

pub(crate) fn id_row(id: i64, note: &str) -> RowData {
    RowData::new(vec![
        FieldValue::new("id", Value::Int(id)),
        FieldValue::new("note", Value::String(note.to_string())),
    ])
}

pub(crate) fn ts_row(id: i64, updated_at: &str, note: &str) -> RowData {
    let ts = chrono::DateTime::parse_from_rfc3339(updated_at)
        .unwrap()
        .with_timezone(&chrono::Utc);
    RowData::new(vec![
        FieldValue::new("id", Value::Int(id)),
        FieldValue::new("updated_at", Value::Timestamp(ts)),
        FieldValue::new("note", Value::String(note.to_string())),
    ])
}

pub(crate) fn date_row(id: i64, date: NaiveDate, note: &str) -> RowData {
    RowData::new(vec![
        FieldValue::new("id", Value::Int(id)),
        FieldValue::new("event_date", Value::Date(date)),
        FieldValue::new("note", Value::String(note.to_string())),
    ])
}

fn cmp_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Some(x), Some(y)) = (a.as_timestamp(), b.as_timestamp()) {
        return x.cmp(&y);
    }
    a.as_string()
        .unwrap_or_default()
        .cmp(&b.as_string().unwrap_or_default())
}

fn matches_filter(row: &RowData, filter: &RowFilter) -> bool {
    match filter {
        RowFilter::Gt(col, v) => cmp_values(&row.get_value(col), v) == Ordering::Greater,
        RowFilter::Ge(col, v) => cmp_values(&row.get_value(col), v) != Ordering::Less,
        RowFilter::Between(col, lo, hi) => {
            let value = row.get_value(col);
            cmp_values(&value, lo) != Ordering::Less && cmp_values(&value, hi) != Ordering::Greater
        }
        RowFilter::DateEq(col, d) => row.get_value(col).as_date() == Some(*d),
        RowFilter::DateBetween(col, from, to) => row
            .get_value(col)
            .as_date()
            .is_some_and(|d| d >= *from && d <= *to),
        RowFilter::Since(col, ts) => row
            .get_value(col)
            .as_timestamp()
            .is_some_and(|v| v >= *ts),
        RowFilter::And(parts) => parts.iter().all(|p| matches_filter(row, p)),
    }
}

fn matches_predicate(row: &RowData, predicate: &DeletePredicate) -> bool {
    match predicate {
        DeletePredicate::DateWithin { column, from, to } => row
            .get_value(column)
            .as_date()
            .is_some_and(|d| d >= *from && d <= *to),
        DeletePredicate::DateEq { column, date } => row.get_value(column).as_date() == Some(*date),
    }
}

/// Fixed-row source honoring filter, order, limit, and offset.
pub(crate) struct MemSource {
    kind: SourceKind,
    rows: Vec<RowData>,
}

impl MemSource {
    pub(crate) fn new(kind: SourceKind, rows: Vec<RowData>) -> Self {
        MemSource { kind, rows }
    }
}

#[async_trait]
impl SourceAdapter for MemSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch_rows(&self, request: &FetchRequest) -> Result<Vec<RowData>, SourceError> {
        let mut rows: Vec<RowData> = self
            .rows
            .iter()
            .filter(|r| {
                request
                    .filter
                    .as_ref()
                    .is_none_or(|f| matches_filter(r, f))
            })
            .cloned()
            .collect();

        if let Some(order) = &request.order_by {
            rows.sort_by(|a, b| cmp_values(&a.get_value(order), &b.get_value(order)));
        }

        let offset = request.offset.unwrap_or(0);
        let rows = rows.into_iter().skip(offset);
        let rows: Vec<RowData> = match request.limit {
            Some(limit) => rows.take(limit).collect(),
            None => rows.collect(),
        };

        if request.columns.is_empty() {
            return Ok(rows);
        }
        Ok(rows
            .into_iter()
            .map(|row| {
                let columns = request
                    .columns
                    .iter()
                    .filter_map(|c| row.get(c).cloned())
                    .collect();
                RowData::new(columns)
            })
            .collect())
    }

    async fn distinct_dates(
        &self,
        _relation: &SourceRelation,
        date_col: &str,
        modified: Option<(&str, chrono::DateTime<chrono::Utc>)>,
    ) -> Result<Vec<NaiveDate>, SourceError> {
        if self.kind != SourceKind::MySql {
            return Err(SourceError::Unsupported(
                "modified-date detection is only implemented for mysql sources".into(),
            ));
        }
        let mut dates = BTreeSet::new();
        for row in &self.rows {
            if let Some((col, since)) = modified {
                let touched = row
                    .get_value(col)
                    .as_timestamp()
                    .is_some_and(|ts| ts >= since);
                if !touched {
                    continue;
                }
            }
            if let Some(d) = row.get_value(date_col).as_date() {
                dates.insert(d);
            }
        }
        Ok(dates.into_iter().collect())
    }
}

/// In-memory destination with an insert failure budget for retry tests.
#[derive(Default)]
pub(crate) struct MemDestination {
    tables: Mutex<HashMap<String, Vec<RowData>>>,
    optimize_calls: AtomicU64,
    fail_inserts: AtomicU64,
    partition_key: Option<String>,
}

impl MemDestination {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_partition_key(key: &str) -> Self {
        MemDestination {
            partition_key: Some(key.to_string()),
            ..Self::default()
        }
    }

    /// The next `n` insert calls fail with a transient server error.
    pub(crate) fn fail_next_inserts(&self, n: u64) {
        self.fail_inserts.store(n, AtomicOrdering::SeqCst);
    }

    pub(crate) async fn seed(&self, table: &str, rows: Vec<RowData>) {
        self.tables.lock().await.insert(table.to_string(), rows);
    }

    pub(crate) async fn rows(&self, table: &str) -> Vec<RowData> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn optimize_count(&self) -> u64 {
        self.optimize_calls.load(AtomicOrdering::SeqCst)
    }

    fn row_key(row: &RowData, key_columns: &[String]) -> String {
        if key_columns.is_empty() {
            let mut parts: Vec<String> = row
                .columns
                .iter()
                .map(|c| {
                    format!(
                        "{}={}",
                        c.name.to_ascii_lowercase(),
                        c.value.as_ref().map_or("NULL".to_string(), |v| v.to_string())
                    )
                })
                .collect();
            parts.sort();
            return parts.join("|");
        }
        key_columns
            .iter()
            .map(|c| row.get_value(c).to_string())
            .collect::<Vec<_>>()
            .join("|")
    }
}

#[async_trait]
impl Destination for MemDestination {
    async fn insert_rows(&self, table: &str, rows: &[RowData]) -> Result<u64, DestError> {
        let remaining = self.fail_inserts.load(AtomicOrdering::SeqCst);
        if remaining > 0 {
            self.fail_inserts.store(remaining - 1, AtomicOrdering::SeqCst);
            return Err(DestError::Server {
                status: 503,
                body: "temporarily unavailable".into(),
            });
        }
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn truncate(&self, table: &str) -> Result<(), DestError> {
        self.tables.lock().await.insert(table.to_string(), vec![]);
        Ok(())
    }

    async fn delete_where(
        &self,
        table: &str,
        predicate: &DeletePredicate,
    ) -> Result<(), DestError> {
        if let Some(rows) = self.tables.lock().await.get_mut(table) {
            rows.retain(|r| !matches_predicate(r, predicate));
        }
        Ok(())
    }

    async fn optimize(&self, _table: &str) -> Result<(), DestError> {
        self.optimize_calls.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<u64, DestError> {
        Ok(self.rows(table).await.len() as u64)
    }

    async fn count_where(
        &self,
        table: &str,
        predicate: &DeletePredicate,
    ) -> Result<u64, DestError> {
        Ok(self
            .rows(table)
            .await
            .iter()
            .filter(|r| matches_predicate(r, predicate))
            .count() as u64)
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<Value>, DestError> {
        Ok(self
            .rows(table)
            .await
            .iter()
            .map(|r| r.get_value(column))
            .filter(|v| !v.is_null())
            .max_by(cmp_values))
    }

    async fn distinct_count(&self, table: &str, key_columns: &[String]) -> Result<u64, DestError> {
        let keys: HashSet<String> = self
            .rows(table)
            .await
            .iter()
            .map(|r| Self::row_key(r, key_columns))
            .collect();
        Ok(keys.len() as u64)
    }

    async fn partition_key(&self, _table: &str) -> Result<Option<String>, DestError> {
        Ok(self.partition_key.clone())
    }
}

use crate::{
    error::SourceError,
    request::FetchRequest,
    source::SourceAdapter,
    sql::render::SqlDialect,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use model::{
    connection::{ConnectionDescriptor, SourceKind},
    core::{data_type::DataType, value::Value},
    dataset::SourceRelation,
    records::row::{FieldValue, RowData},
};
use sqlx::{
    Column, Row, TypeInfo,
    sqlite::{SqlitePool, SqliteRow},
};
use tracing::debug;

#[derive(Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
}

impl SqliteSource {
    pub async fn connect(conn: &ConnectionDescriptor) -> Result<Self, SourceError> {
        if conn.kind != SourceKind::Sqlite {
            return Err(SourceError::BadConnection(format!(
                "expected sqlite connection, got {}",
                conn.kind
            )));
        }
        let pool = SqlitePool::connect(&conn.connection_url()).await?;
        Ok(SqliteSource { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        SqliteSource { pool }
    }

    fn row_to_data(row: &SqliteRow) -> Result<RowData, SourceError> {
        let mut columns = Vec::with_capacity(row.columns().len());
        for col in row.columns() {
            let name = col.name();
            let type_name = col.type_info().name().to_ascii_uppercase();
            let (value, data_type) = decode_column(row, col.ordinal(), &type_name)?;
            columns.push(match value {
                Some(v) => FieldValue::new(name, v),
                None => FieldValue::null(name, data_type),
            });
        }
        Ok(RowData::new(columns))
    }
}

fn decode_column(
    row: &SqliteRow,
    idx: usize,
    type_name: &str,
) -> Result<(Option<Value>, DataType), SourceError> {
    let decoded = match type_name {
        "INTEGER" | "INT" | "BIGINT" => {
            let v: Option<i64> = row.try_get(idx)?;
            (v.map(Value::Int), DataType::Int)
        }
        "REAL" | "NUMERIC" | "FLOAT" | "DOUBLE" => {
            let v: Option<f64> = row.try_get(idx)?;
            (v.map(Value::Float), DataType::Float)
        }
        "BOOLEAN" => {
            let v: Option<bool> = row.try_get(idx)?;
            (v.map(Value::Boolean), DataType::Boolean)
        }
        "DATE" => {
            let v: Option<NaiveDate> = row.try_get(idx)?;
            (v.map(Value::Date), DataType::Date)
        }
        "DATETIME" | "TIMESTAMP" => {
            let v: Option<NaiveDateTime> = row.try_get(idx)?;
            (
                v.map(|dt| Value::Timestamp(Utc.from_utc_datetime(&dt))),
                DataType::Timestamp,
            )
        }
        _ => {
            let v: Option<String> = row.try_get(idx).unwrap_or(None);
            (v.map(Value::String), DataType::String)
        }
    };
    Ok(decoded)
}

#[async_trait]
impl SourceAdapter for SqliteSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Sqlite
    }

    async fn fetch_rows(&self, request: &FetchRequest) -> Result<Vec<RowData>, SourceError> {
        let sql = SqlDialect::Sqlite.render_select(request);
        debug!(sql = %sql, "fetching rows from sqlite source");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_data).collect()
    }

    async fn distinct_dates(
        &self,
        _relation: &SourceRelation,
        _date_col: &str,
        _modified: Option<(&str, DateTime<Utc>)>,
    ) -> Result<Vec<NaiveDate>, SourceError> {
        Err(SourceError::Unsupported(
            "modified-date detection is only implemented for mysql sources".into(),
        ))
    }
}

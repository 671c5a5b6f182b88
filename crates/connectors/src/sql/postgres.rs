use crate::{
    error::SourceError,
    request::FetchRequest,
    source::SourceAdapter,
    sql::render::SqlDialect,
};
use async_trait::async_trait;
use bigdecimal::ToPrimitive;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use model::{
    connection::{ConnectionDescriptor, SourceKind},
    core::{data_type::DataType, value::Value},
    dataset::SourceRelation,
    records::row::{FieldValue, RowData},
};
use sqlx::{
    Column, Row, TypeInfo,
    postgres::{PgPool, PgRow},
    types::BigDecimal,
};
use tracing::debug;

#[derive(Clone)]
pub struct PostgresSource {
    pool: PgPool,
}

impl PostgresSource {
    pub async fn connect(conn: &ConnectionDescriptor) -> Result<Self, SourceError> {
        if conn.kind != SourceKind::Postgres {
            return Err(SourceError::BadConnection(format!(
                "expected postgres connection, got {}",
                conn.kind
            )));
        }
        let pool = PgPool::connect(&conn.connection_url()).await?;
        Ok(PostgresSource { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        PostgresSource { pool }
    }

    fn row_to_data(row: &PgRow) -> Result<RowData, SourceError> {
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
    row: &PgRow,
    idx: usize,
    type_name: &str,
) -> Result<(Option<Value>, DataType), SourceError> {
    let decoded = match type_name {
        "INT2" => {
            let v: Option<i16> = row.try_get(idx)?;
            (v.map(|v| Value::Int(v as i64)), DataType::Int)
        }
        "INT4" => {
            let v: Option<i32> = row.try_get(idx)?;
            (v.map(|v| Value::Int(v as i64)), DataType::Int)
        }
        "INT8" => {
            let v: Option<i64> = row.try_get(idx)?;
            (v.map(Value::Int), DataType::Int)
        }
        "FLOAT4" => {
            let v: Option<f32> = row.try_get(idx)?;
            (v.map(|v| Value::Float(v as f64)), DataType::Float)
        }
        "FLOAT8" => {
            let v: Option<f64> = row.try_get(idx)?;
            (v.map(Value::Float), DataType::Float)
        }
        "NUMERIC" => {
            let v: Option<BigDecimal> = row.try_get(idx)?;
            (
                v.and_then(|d| d.to_f64()).map(Value::Float),
                DataType::Float,
            )
        }
        "BOOL" => {
            let v: Option<bool> = row.try_get(idx)?;
            (v.map(Value::Boolean), DataType::Boolean)
        }
        "DATE" => {
            let v: Option<NaiveDate> = row.try_get(idx)?;
            (v.map(Value::Date), DataType::Date)
        }
        "TIMESTAMP" => {
            let v: Option<NaiveDateTime> = row.try_get(idx)?;
            (
                v.map(|dt| Value::Timestamp(Utc.from_utc_datetime(&dt))),
                DataType::Timestamp,
            )
        }
        "TIMESTAMPTZ" => {
            let v: Option<DateTime<Utc>> = row.try_get(idx)?;
            (v.map(Value::Timestamp), DataType::Timestamp)
        }
        // TEXT, VARCHAR, BPCHAR, NAME, JSON rendered as text, and anything
        // else we have no tighter mapping for.
        _ => {
            let v: Option<String> = row.try_get(idx).unwrap_or(None);
            (v.map(Value::String), DataType::String)
        }
    };
    Ok(decoded)
}

#[async_trait]
impl SourceAdapter for PostgresSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn fetch_rows(&self, request: &FetchRequest) -> Result<Vec<RowData>, SourceError> {
        let sql = SqlDialect::Postgres.render_select(request);
        debug!(sql = %sql, "fetching rows from postgres source");

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

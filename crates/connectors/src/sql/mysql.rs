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
    mysql::{MySqlPool, MySqlRow},
    types::BigDecimal,
};
use tracing::debug;

#[derive(Clone)]
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    pub async fn connect(conn: &ConnectionDescriptor) -> Result<Self, SourceError> {
        if conn.kind != SourceKind::MySql {
            return Err(SourceError::BadConnection(format!(
                "expected mysql connection, got {}",
                conn.kind
            )));
        }
        let pool = MySqlPool::connect(&conn.connection_url()).await?;
        Ok(MySqlSource { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        MySqlSource { pool }
    }

    fn row_to_data(row: &MySqlRow) -> Result<RowData, SourceError> {
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
    row: &MySqlRow,
    idx: usize,
    type_name: &str,
) -> Result<(Option<Value>, DataType), SourceError> {
    let decoded = if type_name.contains("UNSIGNED") {
        let v: Option<u64> = row.try_get(idx)?;
        (v.map(Value::Uint), DataType::Int)
    } else {
        match type_name {
            "BOOLEAN" => {
                let v: Option<bool> = row.try_get(idx)?;
                (v.map(Value::Boolean), DataType::Boolean)
            }
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                let v: Option<i64> = row.try_get(idx)?;
                (v.map(Value::Int), DataType::Int)
            }
            "FLOAT" | "DOUBLE" => {
                let v: Option<f64> = row.try_get(idx)?;
                (v.map(Value::Float), DataType::Float)
            }
            "DECIMAL" | "NEWDECIMAL" => {
                let v: Option<BigDecimal> = row.try_get(idx)?;
                (
                    v.and_then(|d| d.to_f64()).map(Value::Float),
                    DataType::Float,
                )
            }
            "DATE" => {
                let v: Option<NaiveDate> = row.try_get(idx)?;
                (v.map(Value::Date), DataType::Date)
            }
            "DATETIME" => {
                let v: Option<NaiveDateTime> = row.try_get(idx)?;
                (
                    v.map(|dt| Value::Timestamp(Utc.from_utc_datetime(&dt))),
                    DataType::Timestamp,
                )
            }
            "TIMESTAMP" => {
                let v: Option<DateTime<Utc>> = row.try_get(idx)?;
                (v.map(Value::Timestamp), DataType::Timestamp)
            }
            // Everything textual, plus types we have no tighter mapping for.
            _ => {
                let v: Option<String> = row.try_get(idx).unwrap_or(None);
                (v.map(Value::String), DataType::String)
            }
        }
    };
    Ok(decoded)
}

#[async_trait]
impl SourceAdapter for MySqlSource {
    fn kind(&self) -> SourceKind {
        SourceKind::MySql
    }

    async fn fetch_rows(&self, request: &FetchRequest) -> Result<Vec<RowData>, SourceError> {
        let sql = SqlDialect::MySql.render_select(request);
        debug!(sql = %sql, "fetching rows from mysql source");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_data).collect()
    }

    async fn distinct_dates(
        &self,
        relation: &SourceRelation,
        date_col: &str,
        modified: Option<(&str, DateTime<Utc>)>,
    ) -> Result<Vec<NaiveDate>, SourceError> {
        let since = modified.map(|(col, ts)| (col, ts.format("%Y-%m-%d %H:%M:%S").to_string()));
        let sql = SqlDialect::MySql.render_distinct_dates(
            relation,
            date_col,
            since.as_ref().map(|(col, ts)| (*col, ts.as_str())),
        );
        debug!(sql = %sql, "listing modified dates from mysql source");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut dates = Vec::with_capacity(rows.len());
        for row in &rows {
            let d: Option<NaiveDate> = row.try_get("d")?;
            if let Some(d) = d {
                dates.push(d);
            }
        }
        Ok(dates)
    }
}

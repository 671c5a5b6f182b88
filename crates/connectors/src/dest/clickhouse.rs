use crate::{
    dest::{DeletePredicate, Destination},
    error::DestError,
};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use model::{
    connection::Secret,
    core::value::Value,
    records::row::RowData,
};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    /// HTTP interface endpoint, e.g. `http://ch.internal:8123`.
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: Secret,
}

/// Destination over the ClickHouse HTTP interface.
///
/// Inserts go as JSONEachRow, deletes as lightweight `ALTER TABLE ...
/// DELETE`, compaction as `OPTIMIZE TABLE ... FINAL`. The engine's rows are
/// shaped at runtime by column mappings, so the wire format is built from
/// dynamic JSON rather than a typed row client.
pub struct ClickHouseDestination {
    client: reqwest::Client,
    config: ClickHouseConfig,
}

impl ClickHouseDestination {
    pub fn new(config: ClickHouseConfig) -> Self {
        ClickHouseDestination {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn table_ref(&self, table: &str) -> String {
        format!(
            "`{}`.`{}`",
            self.config.database.replace('`', ""),
            table.replace('`', "")
        )
    }

    fn render_predicate(predicate: &DeletePredicate) -> String {
        match predicate {
            DeletePredicate::DateWithin { column, from, to } => format!(
                "toDate(`{}`) BETWEEN '{from}' AND '{to}'",
                column.replace('`', "")
            ),
            DeletePredicate::DateEq { column, date } => {
                format!("toDate(`{}`) = '{date}'", column.replace('`', ""))
            }
        }
    }

    async fn execute(&self, query: &str, body: Option<String>) -> Result<String, DestError> {
        debug!(query = %query, "executing clickhouse statement");

        let mut request = self
            .client
            .post(&self.config.url)
            .query(&[("query", query)])
            .header("X-ClickHouse-User", &self.config.username)
            .header("X-ClickHouse-Key", self.config.password.reveal());

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(DestError::Server {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn scalar(&self, query: &str) -> Result<Option<String>, DestError> {
        let text = self.execute(query, None).await?;
        let first = text.lines().next().map(str::trim).unwrap_or_default();
        if first.is_empty() || first == "\\N" {
            return Ok(None);
        }
        Ok(Some(first.to_string()))
    }

    async fn scalar_u64(&self, query: &str) -> Result<u64, DestError> {
        let raw = self.scalar(query).await?.unwrap_or_default();
        raw.parse::<u64>()
            .map_err(|_| DestError::Decode(format!("expected unsigned count, got {raw:?}")))
    }

    fn value_to_json(value: &Value) -> serde_json::Value {
        match value {
            Value::Int(v) => json!(v),
            Value::Uint(v) => json!(v),
            Value::Float(v) => json!(v),
            Value::String(v) => json!(v),
            Value::Boolean(v) => json!(*v as u8),
            Value::Date(v) => json!(v.to_string()),
            Value::Timestamp(v) => json!(v.format("%Y-%m-%d %H:%M:%S").to_string()),
            Value::Null => serde_json::Value::Null,
        }
    }

    fn row_to_json_line(row: &RowData) -> String {
        let mut object = serde_json::Map::with_capacity(row.columns.len());
        for col in &row.columns {
            let value = col
                .value
                .as_ref()
                .map(Self::value_to_json)
                .unwrap_or(serde_json::Value::Null);
            object.insert(col.name.clone(), value);
        }
        serde_json::Value::Object(object).to_string()
    }

    fn parse_scalar_value(raw: &str) -> Option<Value> {
        if let Ok(id) = raw.parse::<i64>() {
            return Some(Value::Int(id));
        }
        if let Ok(ts) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
            return Some(Value::Timestamp(Utc.from_utc_datetime(&ts)));
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(Value::Date(d));
        }
        Some(Value::String(raw.to_string()))
    }
}

#[async_trait]
impl Destination for ClickHouseDestination {
    async fn insert_rows(&self, table: &str, rows: &[RowData]) -> Result<u64, DestError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let query = format!("INSERT INTO {} FORMAT JSONEachRow", self.table_ref(table));
        let body = rows
            .iter()
            .map(Self::row_to_json_line)
            .collect::<Vec<_>>()
            .join("\n");

        self.execute(&query, Some(body)).await?;
        Ok(rows.len() as u64)
    }

    async fn truncate(&self, table: &str) -> Result<(), DestError> {
        self.execute(&format!("TRUNCATE TABLE {}", self.table_ref(table)), None)
            .await?;
        Ok(())
    }

    async fn delete_where(
        &self,
        table: &str,
        predicate: &DeletePredicate,
    ) -> Result<(), DestError> {
        let query = format!(
            "ALTER TABLE {} DELETE WHERE {}",
            self.table_ref(table),
            Self::render_predicate(predicate)
        );
        self.execute(&query, None).await?;
        Ok(())
    }

    async fn optimize(&self, table: &str) -> Result<(), DestError> {
        self.execute(
            &format!("OPTIMIZE TABLE {} FINAL", self.table_ref(table)),
            None,
        )
        .await?;
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<u64, DestError> {
        self.scalar_u64(&format!(
            "SELECT count() FROM {} FORMAT TabSeparated",
            self.table_ref(table)
        ))
        .await
    }

    async fn count_where(
        &self,
        table: &str,
        predicate: &DeletePredicate,
    ) -> Result<u64, DestError> {
        self.scalar_u64(&format!(
            "SELECT count() FROM {} WHERE {} FORMAT TabSeparated",
            self.table_ref(table),
            Self::render_predicate(predicate)
        ))
        .await
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<Value>, DestError> {
        let query = format!(
            "SELECT max(`{}`) FROM {} FORMAT TabSeparated",
            column.replace('`', ""),
            self.table_ref(table)
        );
        let raw = self.scalar(&query).await?;
        Ok(raw.as_deref().and_then(Self::parse_scalar_value))
    }

    async fn distinct_count(&self, table: &str, key_columns: &[String]) -> Result<u64, DestError> {
        let query = if key_columns.is_empty() {
            format!(
                "SELECT count() FROM (SELECT DISTINCT * FROM {}) FORMAT TabSeparated",
                self.table_ref(table)
            )
        } else {
            let keys = key_columns
                .iter()
                .map(|c| format!("`{}`", c.replace('`', "")))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "SELECT uniqExact(({keys})) FROM {} FORMAT TabSeparated",
                self.table_ref(table)
            )
        };
        self.scalar_u64(&query).await
    }

    async fn partition_key(&self, table: &str) -> Result<Option<String>, DestError> {
        let query = format!(
            "SELECT partition_key FROM system.tables \
             WHERE database = '{}' AND name = '{}' FORMAT TabSeparated",
            self.config.database.replace('\'', ""),
            table.replace('\'', "")
        );
        Ok(self.scalar(&query).await?.filter(|k| !k.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::row::FieldValue;

    #[test]
    fn rows_serialize_as_json_each_row() {
        let row = RowData::new(vec![
            FieldValue::new("id", Value::Int(7)),
            FieldValue::new("name", Value::String("widget".into())),
            FieldValue::new(
                "synced_at",
                Value::Timestamp(Utc.with_ymd_and_hms(2024, 1, 11, 8, 0, 0).unwrap()),
            ),
        ]);
        let line = ClickHouseDestination::row_to_json_line(&row);
        assert_eq!(
            line,
            r#"{"id":7,"name":"widget","synced_at":"2024-01-11 08:00:00"}"#
        );
    }

    #[test]
    fn predicate_renders_to_date_expr() {
        let p = DeletePredicate::DateEq {
            column: "created_at".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        };
        assert_eq!(
            ClickHouseDestination::render_predicate(&p),
            "toDate(`created_at`) = '2024-01-10'"
        );
    }
}

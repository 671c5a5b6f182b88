use crate::core::value::Value;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Destination-side column types a mapping can coerce to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int,
    Float,
    String,
    Boolean,
    Date,
    Timestamp,
}

impl DataType {
    /// Accepts the loose type names column mappings arrive with.
    pub fn parse(name: &str) -> DataType {
        match name.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" | "bigint" | "smallint" | "tinyint" | "long" => DataType::Int,
            "float" | "double" | "decimal" | "numeric" | "real" => DataType::Float,
            "bool" | "boolean" => DataType::Boolean,
            "date" => DataType::Date,
            "timestamp" | "datetime" => DataType::Timestamp,
            _ => DataType::String,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Timestamp)
    }

    /// Sentinel written when a source value is null, empty, or unparseable:
    /// numeric columns get 0, temporal columns the epoch, the rest "".
    pub fn null_sentinel(&self) -> Value {
        match self {
            DataType::Int => Value::Int(0),
            DataType::Float => Value::Float(0.0),
            DataType::Boolean => Value::Boolean(false),
            DataType::Date => Value::Date(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()),
            DataType::Timestamp => Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH),
            DataType::String => Value::String(String::new()),
        }
    }

    /// Coerce a source value to this type, falling back to the sentinel.
    pub fn coerce(&self, value: &Value) -> Value {
        if value.is_null() {
            return self.null_sentinel();
        }
        if let Value::String(s) = value
            && s.trim().is_empty()
        {
            return self.null_sentinel();
        }

        match self {
            DataType::Int => value.as_i64().map(Value::Int),
            DataType::Float => value.as_f64().map(Value::Float),
            DataType::Boolean => value.as_i64().map(|v| Value::Boolean(v != 0)),
            DataType::Date => value.as_date().map(Value::Date),
            DataType::Timestamp => value.as_timestamp().map(Value::Timestamp),
            DataType::String => value.as_string().map(Value::String),
        }
        .unwrap_or_else(|| self.null_sentinel())
    }
}

use crate::core::data_type::DataType;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamically typed cell value moved between a source and the destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Null,
}

impl Value {
    /// Defensive integer cast: numeric strings parse, garbage yields `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            Value::Float(v) => Some(*v as i64),
            Value::String(v) => v.trim().parse::<i64>().ok(),
            Value::Boolean(v) => Some(if *v { 1 } else { 0 }),
            Value::Date(_) | Value::Timestamp(_) | Value::Null => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            Value::String(v) => v.trim().parse::<f64>().ok(),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Date(_) | Value::Timestamp(_) | Value::Null => None,
        }
    }

    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Int(v) => Some(v.to_string()),
            Value::Uint(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::String(v) => Some(v.clone()),
            Value::Boolean(v) => Some(v.to_string()),
            Value::Date(v) => Some(v.to_string()),
            Value::Timestamp(v) => Some(v.to_rfc3339()),
            Value::Null => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            Value::Timestamp(v) => Some(v.date_naive()),
            Value::String(v) => {
                NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok().or_else(|| {
                    DateTime::parse_from_rfc3339(v.trim())
                        .ok()
                        .map(|dt| dt.date_naive())
                })
            }
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(v) => Some(*v),
            Value::Date(v) => v.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt)),
            Value::String(v) => {
                let s = v.trim();
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
                    .or_else(|| {
                        chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                            .ok()
                            .map(|dt| Utc.from_utc_datetime(&dt))
                    })
            }
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Approximate in-memory footprint, used by the memory governor.
    pub fn size_bytes(&self) -> usize {
        match self {
            Value::Int(_) | Value::Uint(_) | Value::Float(_) => 8,
            Value::String(s) => s.len(),
            Value::Boolean(_) => 1,
            Value::Date(_) => 4,
            Value::Timestamp(_) => 12,
            Value::Null => 0,
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) | Value::Uint(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
            Value::Boolean(_) => DataType::Boolean,
            Value::Date(_) => DataType::Date,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Null => DataType::String,
        }
    }
}

/// Renders the value as a SQL literal for dialect filter clauses.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "'{v}'"),
            Value::Timestamp(v) => write!(f, "'{}'", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Null => write!(f, "NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defensive_int_cast() {
        assert_eq!(Value::String("42".into()).as_i64(), Some(42));
        assert_eq!(Value::String("not-a-number".into()).as_i64(), None);
        assert_eq!(Value::Null.as_i64(), None);
    }

    #[test]
    fn string_literal_escapes_quotes() {
        let v = Value::String("O'Brien".into());
        assert_eq!(v.to_string(), "'O''Brien'");
    }

    #[test]
    fn timestamp_parses_sql_format() {
        let v = Value::String("2024-01-11 08:00:00".into());
        let ts = v.as_timestamp().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-11T08:00:00+00:00");
    }
}

use crate::core::{data_type::DataType, value::Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub value: Option<Value>,
    pub data_type: DataType,
}

impl FieldValue {
    pub fn new(name: &str, value: Value) -> Self {
        let data_type = value.data_type();
        FieldValue {
            name: name.to_string(),
            value: Some(value),
            data_type,
        }
    }

    pub fn null(name: &str, data_type: DataType) -> Self {
        FieldValue {
            name: name.to_string(),
            value: None,
            data_type,
        }
    }
}

/// One row as read from a source or written to the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowData {
    pub columns: Vec<FieldValue>,
}

impl RowData {
    pub fn new(columns: Vec<FieldValue>) -> Self {
        RowData { columns }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Missing columns and nulls both read as `Value::Null`.
    pub fn get_value(&self, name: &str) -> Value {
        self.get(name)
            .and_then(|c| c.value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn size_bytes(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.name.len() + c.value.as_ref().map_or(0, |v| v.size_bytes()))
            .sum()
    }
}

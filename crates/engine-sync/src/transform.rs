use model::{
    dataset::DatasetDescriptor,
    records::row::{FieldValue, RowData},
};

/// Applies the dataset's column mappings: rename source columns to their
/// destination names and coerce to the mapped type. Null, empty, and
/// unparseable values become the type's sentinel (numeric 0, epoch for
/// temporal columns, empty string otherwise).
///
/// Datasets without mappings pass rows through unchanged.
pub fn transform_rows(dataset: &DatasetDescriptor, rows: Vec<RowData>) -> Vec<RowData> {
    if dataset.column_mappings.is_empty() {
        return rows;
    }

    rows.into_iter()
        .map(|row| {
            let columns = dataset
                .column_mappings
                .iter()
                .map(|mapping| {
                    let value = mapping.data_type.coerce(&row.get_value(&mapping.source));
                    FieldValue::new(&mapping.destination, value)
                })
                .collect();
            RowData::new(columns)
        })
        .collect()
}

/// The destination-side name of a source column, falling back to the
/// source name when no mapping renames it.
pub fn dest_column(dataset: &DatasetDescriptor, source_column: &str) -> String {
    dataset
        .mapping_for(source_column)
        .map(|m| m.destination.clone())
        .unwrap_or_else(|| source_column.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::{data_type::DataType, value::Value};
    use model::dataset::{ColumnMapping, SyncStrategyKind};

    fn dataset_with_mappings() -> DatasetDescriptor {
        DatasetDescriptor {
            id: "ds-1".into(),
            name: "orders".into(),
            connection_id: "c1".into(),
            source_table: "orders".into(),
            source_query: None,
            dest_table: "dw_orders".into(),
            strategy: SyncStrategyKind::FullRefresh,
            reference_column: None,
            row_limit: None,
            delete_days: 0,
            partition_column: None,
            partition_granularity: None,
            modified_column: None,
            column_mappings: vec![
                ColumnMapping::new("order_id", "id", DataType::Int),
                ColumnMapping::new("amount", "amount", DataType::Float),
                ColumnMapping::new("note", "note", DataType::String),
            ],
            last_sync_cursor: None,
            last_sync_at: None,
        }
    }

    #[test]
    fn renames_and_coerces() {
        let ds = dataset_with_mappings();
        let rows = vec![RowData::new(vec![
            FieldValue::new("order_id", Value::String("7".into())),
            FieldValue::new("amount", Value::Null),
            FieldValue::new("extra", Value::Int(1)),
        ])];

        let out = transform_rows(&ds, rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get_value("id"), Value::Int(7));
        // Null numeric becomes 0, missing string column becomes "".
        assert_eq!(out[0].get_value("amount"), Value::Float(0.0));
        assert_eq!(out[0].get_value("note"), Value::String(String::new()));
        // Unmapped source columns are dropped.
        assert!(out[0].get("extra").is_none());
    }

    #[test]
    fn dest_column_falls_back_to_source_name() {
        let ds = dataset_with_mappings();
        assert_eq!(dest_column(&ds, "order_id"), "id");
        assert_eq!(dest_column(&ds, "updated_at"), "updated_at");
    }
}

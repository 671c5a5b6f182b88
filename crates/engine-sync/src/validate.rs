use crate::transform::dest_column;
use connectors::{dest::Destination, error::DestError};
use model::dataset::DatasetDescriptor;
use std::sync::Arc;
use tracing::{info, warn};

/// Post-run consistency figures for one destination table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationReport {
    /// Rows the run believes it delivered.
    pub expected_min: u64,
    /// Rows actually present on the destination.
    pub actual: u64,
    /// Rows beyond the first per dedup key; nonzero means compaction has
    /// not caught up or a repair run overlapped existing data.
    pub duplicates: u64,
}

impl ValidationReport {
    pub fn is_consistent(&self) -> bool {
        self.duplicates == 0 && self.actual >= self.expected_min
    }
}

/// Advisory post-run check. Findings are logged, never enforced: the
/// destination is append-only and duplicates resolve at the next merge.
pub struct ConsistencyValidator {
    dest: Arc<dyn Destination>,
}

impl ConsistencyValidator {
    pub fn new(dest: Arc<dyn Destination>) -> Self {
        ConsistencyValidator { dest }
    }

    /// Dedup key is the mapped reference column when the dataset has one,
    /// otherwise whole-row identity.
    pub async fn check(
        &self,
        dataset: &DatasetDescriptor,
        expected_min: u64,
    ) -> Result<ValidationReport, DestError> {
        let key_columns: Vec<String> = dataset
            .reference_column
            .as_deref()
            .map(|c| vec![dest_column(dataset, c)])
            .unwrap_or_default();

        let actual = self.dest.count(&dataset.dest_table).await?;
        let distinct = self
            .dest
            .distinct_count(&dataset.dest_table, &key_columns)
            .await?;

        let report = ValidationReport {
            expected_min,
            actual,
            duplicates: actual.saturating_sub(distinct),
        };

        if report.is_consistent() {
            info!(
                dataset_id = %dataset.id,
                rows = report.actual,
                "post-run validation passed"
            );
        } else {
            warn!(
                dataset_id = %dataset.id,
                expected_min = report.expected_min,
                actual = report.actual,
                duplicates = report.duplicates,
                "post-run validation found inconsistencies"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{id_row, MemDestination};
    use model::dataset::SyncStrategyKind;

    fn dataset() -> DatasetDescriptor {
        DatasetDescriptor {
            id: "ds-1".into(),
            name: "orders".into(),
            connection_id: "c1".into(),
            source_table: "orders".into(),
            source_query: None,
            dest_table: "dw_orders".into(),
            strategy: SyncStrategyKind::IdIncrement,
            reference_column: Some("id".into()),
            row_limit: None,
            delete_days: 0,
            partition_column: None,
            partition_granularity: None,
            modified_column: None,
            column_mappings: vec![],
            last_sync_cursor: None,
            last_sync_at: None,
        }
    }

    #[tokio::test]
    async fn flags_duplicates_on_the_reference_key() {
        let dest = Arc::new(MemDestination::new());
        dest.seed(
            "dw_orders",
            vec![id_row(1, "a"), id_row(1, "a-again"), id_row(2, "b")],
        )
        .await;

        let report = ConsistencyValidator::new(dest)
            .check(&dataset(), 2)
            .await
            .unwrap();

        assert_eq!(report.actual, 3);
        assert_eq!(report.duplicates, 1);
        assert!(!report.is_consistent());
    }

    #[tokio::test]
    async fn clean_table_passes() {
        let dest = Arc::new(MemDestination::new());
        dest.seed("dw_orders", vec![id_row(1, "a"), id_row(2, "b")])
            .await;

        let report = ConsistencyValidator::new(dest)
            .check(&dataset(), 2)
            .await
            .unwrap();
        assert!(report.is_consistent());
    }
}

use crate::{
    context::SyncContext,
    error::SyncError,
    strategy::{
        common::{base_request, persist_job, write_batch},
        full_refresh::FullRefresh,
    },
    transform::{dest_column, transform_rows},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use connectors::{dest::DeletePredicate, request::RowFilter, source::SourceAdapter};
use model::{
    connection::SourceKind,
    dataset::{DatasetDescriptor, PartitionGranularity},
    job::SyncJob,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Partition-targeted repair: rewrite only the calendar-date partitions
/// that were actually touched since the last run, plus a short trailing
/// window as a safety net.
pub struct PartitionWindow {
    ctx: Arc<SyncContext>,
    fallback: FullRefresh,
}

impl PartitionWindow {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        PartitionWindow {
            fallback: FullRefresh::new(ctx.clone()),
            ctx,
        }
    }

    pub async fn execute(
        &self,
        dataset: &DatasetDescriptor,
        source: &dyn SourceAdapter,
        job: &mut SyncJob,
    ) -> Result<u64, SyncError> {
        let Some(part_col) = dataset.partition_column.clone() else {
            warn!(
                dataset_id = %dataset.id,
                "partition sync without partition column, falling back to full refresh"
            );
            return self.fallback.execute(dataset, source, job).await;
        };
        // Modified-date pushdown only exists for the mysql adapter.
        if source.kind() != SourceKind::MySql {
            warn!(
                dataset_id = %dataset.id,
                source = %source.kind(),
                "partition sync needs modified-date pushdown, falling back to full refresh"
            );
            return self.fallback.execute(dataset, source, job).await;
        }

        let ctx = &self.ctx;
        self.check_partition_key(dataset).await;

        let dates = self.affected_dates(dataset, source, &part_col).await?;
        let dest_part = dest_column(dataset, &part_col);

        info!(
            dataset_id = %dataset.id,
            partitions = dates.len(),
            "starting partition-window sync"
        );

        let mut total = 0u64;

        for date in dates {
            if ctx.should_stop(&job.id).await {
                info!(dataset_id = %dataset.id, rows = total, "partition sync cancelled");
                return Ok(total);
            }

            let written = self
                .rewrite_partition(dataset, source, job, &part_col, &dest_part, date)
                .await?;
            total += written;

            job.advance(written);
            job.note(format!("partition {date}: {written} rows"));
            persist_job(ctx, job).await;
        }

        ctx.dest.optimize(&dataset.dest_table).await?;

        info!(dataset_id = %dataset.id, rows = total, "partition-window sync finished");
        Ok(total)
    }

    /// Dates touched since the last run, plus the trailing safety window.
    async fn affected_dates(
        &self,
        dataset: &DatasetDescriptor,
        source: &dyn SourceAdapter,
        part_col: &str,
    ) -> Result<BTreeSet<NaiveDate>, SyncError> {
        let since = self.last_synced_at(dataset).await?;
        let relation = dataset.source_relation();

        let modified = match (&dataset.modified_column, since) {
            (Some(col), Some(ts)) => Some((col.as_str(), ts)),
            _ => None,
        };
        let mut dates: BTreeSet<NaiveDate> = source
            .distinct_dates(&relation, part_col, modified)
            .await?
            .into_iter()
            .collect();

        let today = Utc::now().date_naive();
        for back in 0..=self.ctx.config.refresh_window_days {
            dates.insert(today - Duration::days(back as i64));
        }
        Ok(dates)
    }

    async fn last_synced_at(
        &self,
        dataset: &DatasetDescriptor,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        if let Some(ts) = self.ctx.state.last_synced(&dataset.id).await? {
            return Ok(Some(ts));
        }
        Ok(dataset.last_sync_at)
    }

    async fn rewrite_partition(
        &self,
        dataset: &DatasetDescriptor,
        source: &dyn SourceAdapter,
        job: &SyncJob,
        part_col: &str,
        dest_part: &str,
        date: NaiveDate,
    ) -> Result<u64, SyncError> {
        let ctx = &self.ctx;

        ctx.dest
            .delete_where(
                &dataset.dest_table,
                &DeletePredicate::DateEq {
                    column: dest_part.to_string(),
                    date,
                },
            )
            .await?;

        let mut offset = 0usize;
        let mut written_total = 0u64;
        let batch_size = ctx.config.batch_size;

        loop {
            if ctx.governor.throttle(written_total).await {
                ctx.metrics.add_throttle_pause();
            }
            if ctx.should_stop(&job.id).await {
                return Ok(written_total);
            }

            let request = base_request(dataset)
                .filter(RowFilter::DateEq(part_col.to_string(), date))
                .limit(batch_size)
                .offset(offset);
            let rows = source.fetch_rows(&request).await?;
            if rows.is_empty() {
                break;
            }

            let fetched = rows.len();
            ctx.metrics.add_rows_read(fetched as u64);

            let transformed = transform_rows(dataset, rows);
            written_total += write_batch(ctx, &dataset.dest_table, &transformed).await;

            if fetched < batch_size {
                break;
            }
            offset += batch_size;
        }

        Ok(written_total)
    }

    /// Warns when the physical partition key does not match the declared
    /// granularity. Advisory only: a mismatch makes partition rewrites
    /// slow, not wrong.
    async fn check_partition_key(&self, dataset: &DatasetDescriptor) {
        let Some(granularity) = dataset.partition_granularity else {
            return;
        };
        let key = match self.ctx.dest.partition_key(&dataset.dest_table).await {
            Ok(Some(key)) => key,
            Ok(None) => {
                warn!(
                    dataset_id = %dataset.id,
                    dest_table = %dataset.dest_table,
                    "destination table is not partitioned"
                );
                return;
            }
            Err(e) => {
                warn!(dataset_id = %dataset.id, error = %e, "could not read partition key");
                return;
            }
        };

        let expected = match granularity {
            PartitionGranularity::Daily => "toDate",
            PartitionGranularity::Monthly => "toYYYYMM",
        };
        if !key.contains(expected) {
            warn!(
                dataset_id = %dataset.id,
                partition_key = %key,
                expected = %expected,
                "partition key does not match declared granularity"
            );
        }
    }
}

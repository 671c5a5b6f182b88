use crate::{
    context::SyncContext,
    error::SyncError,
    strategy::{
        common::{base_request, batch_limit, persist_job, write_batch},
        full_refresh::FullRefresh,
    },
    transform::{dest_column, transform_rows},
};
use chrono::{DateTime, Utc};
use connectors::{request::RowFilter, source::SourceAdapter};
use model::{
    core::value::Value, cursor::SyncCursor, dataset::DatasetDescriptor, job::SyncJob,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Incremental sync over a temporal reference column.
///
/// The low-water mark is the persisted cursor, or the destination's current
/// maximum when no cursor exists yet. After the run the new cursor is
/// recomputed from the destination rather than the in-memory batch, so it
/// stays correct under concurrent writers elsewhere.
pub struct TimestampIncrement {
    ctx: Arc<SyncContext>,
    fallback: FullRefresh,
}

impl TimestampIncrement {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        TimestampIncrement {
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
        let Some(ref_col) = dataset.reference_column.clone() else {
            warn!(
                dataset_id = %dataset.id,
                "timestamp sync without reference column, falling back to full refresh"
            );
            return self.fallback.execute(dataset, source, job).await;
        };

        let ctx = &self.ctx;
        let dest_ref = dest_column(dataset, &ref_col);
        let mark = self.low_water_mark(dataset, &dest_ref).await?;

        info!(
            dataset_id = %dataset.id,
            reference_column = %ref_col,
            mark = %mark.to_rfc3339(),
            "starting timestamp-incremental sync"
        );

        let mut offset = 0usize;
        let mut total = 0u64;

        loop {
            if ctx.governor.throttle(total).await {
                ctx.metrics.add_throttle_pause();
            }
            if ctx.should_stop(&job.id).await {
                info!(dataset_id = %dataset.id, rows = total, "timestamp sync cancelled");
                return Ok(total);
            }

            let limit = batch_limit(ctx.config.batch_size, dataset.row_limit, total);
            if limit == 0 {
                break;
            }

            let request = base_request(dataset)
                .filter(RowFilter::Gt(ref_col.clone(), Value::Timestamp(mark)))
                .order_by(&ref_col)
                .limit(limit)
                .offset(offset);
            let rows = source.fetch_rows(&request).await?;
            if rows.is_empty() {
                break;
            }

            let fetched = rows.len();
            ctx.metrics.add_rows_read(fetched as u64);

            let transformed = transform_rows(dataset, rows);
            let written = write_batch(ctx, &dataset.dest_table, &transformed).await;

            total += written;
            job.advance(written);
            job.note(format!("{total} rows after {}", mark.to_rfc3339()));
            persist_job(ctx, job).await;

            if fetched < limit {
                break;
            }
            offset += fetched;
        }

        // New cursor from the destination, not the last batch.
        if let Some(new_max) = ctx
            .dest
            .max_value(&dataset.dest_table, &dest_ref)
            .await?
            .and_then(|v| v.as_timestamp())
        {
            ctx.state
                .save_cursor(&dataset.id, &SyncCursor::Timestamp(new_max))
                .await?;
        }

        ctx.dest.optimize(&dataset.dest_table).await?;

        info!(dataset_id = %dataset.id, rows = total, "timestamp-incremental sync finished");
        Ok(total)
    }

    /// Persisted cursor, the dataset's opaque cursor, or the destination
    /// max, in that order; datasets with none of those start at the epoch.
    async fn low_water_mark(
        &self,
        dataset: &DatasetDescriptor,
        dest_ref: &str,
    ) -> Result<DateTime<Utc>, SyncError> {
        if let Some(ts) = self
            .ctx
            .state
            .load_cursor(&dataset.id)
            .await?
            .as_timestamp()
        {
            return Ok(ts);
        }
        if let Some(ts) =
            SyncCursor::parse(dataset.last_sync_cursor.as_deref()).as_timestamp()
        {
            return Ok(ts);
        }

        let dest_max = self
            .ctx
            .dest
            .max_value(&dataset.dest_table, dest_ref)
            .await?
            .and_then(|v| v.as_timestamp());
        Ok(dest_max.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }
}

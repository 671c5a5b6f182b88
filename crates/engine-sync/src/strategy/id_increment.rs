use crate::{
    context::SyncContext,
    error::SyncError,
    strategy::{
        common::{base_request, batch_limit, persist_job, write_batch},
        full_refresh::FullRefresh,
    },
    transform::{dest_column, transform_rows},
};
use connectors::{request::RowFilter, source::SourceAdapter};
use model::{
    core::value::Value, cursor::SyncCursor, dataset::DatasetDescriptor, job::SyncJob,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Incremental sync over a monotonically increasing numeric key.
///
/// The cursor is saved after every batch, so an interrupted run resumes
/// from the last completed batch instead of re-reading the whole tail.
pub struct IdIncrement {
    ctx: Arc<SyncContext>,
    fallback: FullRefresh,
}

impl IdIncrement {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        IdIncrement {
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
                "id sync without reference column, falling back to full refresh"
            );
            return self.fallback.execute(dataset, source, job).await;
        };

        let ctx = &self.ctx;
        let dest_ref = dest_column(dataset, &ref_col);
        let mut cursor = self.low_water_mark(dataset, &dest_ref).await?;

        info!(
            dataset_id = %dataset.id,
            reference_column = %ref_col,
            cursor,
            "starting id-incremental sync"
        );

        let mut total = 0u64;

        loop {
            if ctx.governor.throttle(total).await {
                ctx.metrics.add_throttle_pause();
            }
            if ctx.should_stop(&job.id).await {
                info!(dataset_id = %dataset.id, rows = total, "id sync cancelled");
                return Ok(total);
            }

            let limit = batch_limit(ctx.config.batch_size, dataset.row_limit, total);
            if limit == 0 {
                break;
            }

            let request = base_request(dataset)
                .filter(RowFilter::Gt(ref_col.clone(), Value::Int(cursor)))
                .order_by(&ref_col)
                .limit(limit);
            let rows = source.fetch_rows(&request).await?;
            if rows.is_empty() {
                break;
            }

            let fetched = rows.len();
            ctx.metrics.add_rows_read(fetched as u64);

            if let Some(last) = rows.last().and_then(|r| r.get_value(&ref_col).as_i64()) {
                cursor = last;
            }

            let transformed = transform_rows(dataset, rows);
            let written = write_batch(ctx, &dataset.dest_table, &transformed).await;

            total += written;
            job.advance(written);
            job.note(format!("{total} rows, cursor at {cursor}"));
            persist_job(ctx, job).await;

            ctx.state
                .save_cursor(&dataset.id, &SyncCursor::Id(cursor))
                .await?;

            if fetched < limit {
                break;
            }
        }

        ctx.dest.optimize(&dataset.dest_table).await?;

        info!(dataset_id = %dataset.id, rows = total, cursor, "id-incremental sync finished");
        Ok(total)
    }

    async fn low_water_mark(
        &self,
        dataset: &DatasetDescriptor,
        dest_ref: &str,
    ) -> Result<i64, SyncError> {
        if let Some(id) = self.ctx.state.load_cursor(&dataset.id).await?.as_id() {
            return Ok(id);
        }
        if let Some(id) = SyncCursor::parse(dataset.last_sync_cursor.as_deref()).as_id() {
            return Ok(id);
        }

        let dest_max = self
            .ctx
            .dest
            .max_value(&dataset.dest_table, dest_ref)
            .await?
            .and_then(|v| v.as_i64());
        Ok(dest_max.unwrap_or(0))
    }
}

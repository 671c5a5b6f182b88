use crate::{
    context::SyncContext,
    error::SyncError,
    strategy::common::{base_request, persist_job, write_batch},
    transform::transform_rows,
};
use connectors::source::SourceAdapter;
use model::{dataset::DatasetDescriptor, job::SyncJob};
use std::sync::Arc;
use tracing::info;

/// Truncate-and-reload. The universal fallback whenever an incremental
/// strategy's required column is missing.
pub struct FullRefresh {
    ctx: Arc<SyncContext>,
}

impl FullRefresh {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        FullRefresh { ctx }
    }

    pub async fn execute(
        &self,
        dataset: &DatasetDescriptor,
        source: &dyn SourceAdapter,
        job: &mut SyncJob,
    ) -> Result<u64, SyncError> {
        let ctx = &self.ctx;
        let batch_size = ctx.config.batch_size;

        info!(
            dataset_id = %dataset.id,
            dest_table = %dataset.dest_table,
            "starting full refresh"
        );

        ctx.dest.truncate(&dataset.dest_table).await?;

        let mut offset = 0usize;
        let mut total = 0u64;

        loop {
            if ctx.governor.throttle(total).await {
                ctx.metrics.add_throttle_pause();
            }
            if ctx.should_stop(&job.id).await {
                info!(dataset_id = %dataset.id, rows = total, "full refresh cancelled");
                return Ok(total);
            }

            let request = base_request(dataset).limit(batch_size).offset(offset);
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
            job.note(format!("{total} rows refreshed"));
            persist_job(ctx, job).await;

            if fetched < batch_size {
                break;
            }
            offset += batch_size;
        }

        ctx.dest.optimize(&dataset.dest_table).await?;

        info!(dataset_id = %dataset.id, rows = total, "full refresh finished");
        Ok(total)
    }
}

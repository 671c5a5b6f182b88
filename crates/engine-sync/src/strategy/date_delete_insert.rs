use crate::{
    context::SyncContext,
    error::SyncError,
    strategy::{
        common::{base_request, persist_job, write_batch},
        full_refresh::FullRefresh,
    },
    transform::{dest_column, transform_rows},
};
use chrono::{Duration, Utc};
use connectors::{dest::DeletePredicate, request::RowFilter, source::SourceAdapter};
use model::{connection::SourceKind, dataset::DatasetDescriptor, job::SyncJob};
use std::sync::Arc;
use tracing::{info, warn};

/// Rolling-window repair: delete the trailing N days on the destination
/// and re-pull them from the source. Catches late updates to recent rows
/// that a pure incremental strategy would miss.
pub struct DateDeleteInsert {
    ctx: Arc<SyncContext>,
    fallback: FullRefresh,
}

impl DateDeleteInsert {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        DateDeleteInsert {
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
        let Some(date_col) = dataset.reference_column.clone() else {
            warn!(
                dataset_id = %dataset.id,
                "date-window sync without reference column, falling back to full refresh"
            );
            return self.fallback.execute(dataset, source, job).await;
        };
        // The API source cannot express a calendar-date window.
        if source.kind() == SourceKind::HttpApi {
            warn!(
                dataset_id = %dataset.id,
                "date-window sync not supported for http sources, falling back to full refresh"
            );
            return self.fallback.execute(dataset, source, job).await;
        }

        let ctx = &self.ctx;
        let to = Utc::now().date_naive();
        let from = to - Duration::days(dataset.delete_days as i64);
        let dest_ref = dest_column(dataset, &date_col);

        info!(
            dataset_id = %dataset.id,
            from = %from,
            to = %to,
            "starting date-window sync"
        );

        let predicate = DeletePredicate::DateWithin {
            column: dest_ref,
            from,
            to,
        };
        match ctx.dest.count_where(&dataset.dest_table, &predicate).await {
            Ok(stale) => {
                ctx.metrics.add_rows_deleted(stale);
                info!(dataset_id = %dataset.id, rows = stale, "deleting window rows");
            }
            Err(e) => warn!(dataset_id = %dataset.id, error = %e, "could not count window rows"),
        }
        ctx.dest.delete_where(&dataset.dest_table, &predicate).await?;

        let mut offset = 0usize;
        let mut total = 0u64;
        let batch_size = ctx.config.batch_size;

        loop {
            if ctx.governor.throttle(total).await {
                ctx.metrics.add_throttle_pause();
            }
            if ctx.should_stop(&job.id).await {
                info!(dataset_id = %dataset.id, rows = total, "date-window sync cancelled");
                return Ok(total);
            }

            let request = base_request(dataset)
                .filter(RowFilter::DateBetween(date_col.clone(), from, to))
                .limit(batch_size)
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
            job.note(format!("{total} rows repulled for {from}..{to}"));
            persist_job(ctx, job).await;

            if fetched < batch_size {
                break;
            }
            offset += batch_size;
        }

        ctx.dest.optimize(&dataset.dest_table).await?;

        info!(dataset_id = %dataset.id, rows = total, "date-window sync finished");
        Ok(total)
    }
}

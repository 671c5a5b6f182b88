use crate::{
    context::SyncContext,
    error::SyncError,
    strategy::common::{base_request, batch_limit, persist_job, write_batch},
    transform::transform_rows,
};
use connectors::{request::RowFilter, source::SourceAdapter};
use model::{core::value::Value, cursor::SyncCursor, dataset::DatasetDescriptor, job::SyncJob};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a tail run: rows appended plus the key the next run should
/// start after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailOutcome {
    pub rows: u64,
    pub last_id: i64,
}

/// Pure append from a known key onward. Unlike the id-incremental
/// strategy it takes its starting point as an argument, so an operator
/// can replay an arbitrary tail; very large appends skip compaction and
/// leave it to the background merges.
pub struct TailAppend {
    ctx: Arc<SyncContext>,
}

impl TailAppend {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        TailAppend { ctx }
    }

    pub async fn execute(
        &self,
        dataset: &DatasetDescriptor,
        source: &dyn SourceAdapter,
        job: &mut SyncJob,
        after_id: i64,
        row_limit: Option<u64>,
    ) -> Result<TailOutcome, SyncError> {
        let Some(ref_col) = dataset.reference_column.clone() else {
            return Err(SyncError::Configuration(format!(
                "dataset {} has no reference column for tail append",
                dataset.id
            )));
        };

        let ctx = &self.ctx;
        let cap = row_limit.or(dataset.row_limit);
        let mut current = after_id;
        let mut total = 0u64;
        let mut batch_no = 0u32;

        info!(
            dataset_id = %dataset.id,
            after_id,
            "starting tail append"
        );

        loop {
            if ctx.governor.throttle(total).await {
                ctx.metrics.add_throttle_pause();
            }
            if ctx.should_stop(&job.id).await {
                info!(dataset_id = %dataset.id, rows = total, "tail append cancelled");
                return Ok(TailOutcome { rows: total, last_id: current });
            }

            let limit = batch_limit(ctx.config.batch_size, cap, total);
            if limit == 0 {
                break;
            }

            let request = base_request(dataset)
                .filter(RowFilter::Gt(ref_col.clone(), Value::Int(current)))
                .order_by(&ref_col)
                .limit(limit);
            let rows = source.fetch_rows(&request).await?;
            if rows.is_empty() {
                break;
            }

            let fetched = rows.len();
            batch_no += 1;
            ctx.metrics.add_rows_read(fetched as u64);

            match rows.last().and_then(|r| r.get_value(&ref_col).as_i64()) {
                Some(last) => current = last,
                None => {
                    warn!(
                        dataset_id = %dataset.id,
                        column = %ref_col,
                        "tail rows carry no usable key, stopping"
                    );
                    break;
                }
            }

            let transformed = transform_rows(dataset, rows);
            let written = write_batch(ctx, &dataset.dest_table, &transformed).await;

            total += written;
            job.advance(written);
            job.note(format!("batch {batch_no}: {written} rows, key at {current}"));
            persist_job(ctx, job).await;

            ctx.state
                .save_cursor(&dataset.id, &SyncCursor::Id(current))
                .await?;

            if fetched < limit {
                break;
            }
        }

        // Huge appends leave compaction to the background merges.
        if total <= ctx.config.optimize_skip_rows {
            ctx.dest.optimize(&dataset.dest_table).await?;
        } else {
            info!(
                dataset_id = %dataset.id,
                rows = total,
                "skipping compaction after large append"
            );
        }

        info!(dataset_id = %dataset.id, rows = total, last_id = current, "tail append finished");
        Ok(TailOutcome { rows: total, last_id: current })
    }
}

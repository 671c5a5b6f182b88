use crate::context::SyncContext;
use connectors::request::FetchRequest;
use engine_core::retry::RetryDisposition;
use model::{dataset::DatasetDescriptor, job::SyncJob, records::row::RowData};
use tracing::warn;

/// Base fetch request for a dataset: its relation plus the mapped source
/// columns as projection (all columns when unmapped).
pub(crate) fn base_request(dataset: &DatasetDescriptor) -> FetchRequest {
    let mut request = FetchRequest::relation(dataset.source_relation());
    request.columns = dataset
        .column_mappings
        .iter()
        .map(|m| m.source.clone())
        .collect();
    request
}

/// Writes one batch with retry on transient destination failures.
///
/// A batch that exhausts its retries is logged and skipped so one bad
/// batch does not abort the remaining batches of a multi-hour run; the
/// returned count is 0 in that case.
pub(crate) async fn write_batch(ctx: &SyncContext, table: &str, rows: &[RowData]) -> u64 {
    if rows.is_empty() {
        return 0;
    }

    let result = ctx
        .retry
        .run(
            || ctx.dest.insert_rows(table, rows),
            |e| {
                if e.is_transient() {
                    RetryDisposition::Retry
                } else {
                    RetryDisposition::Stop
                }
            },
        )
        .await;

    match result {
        Ok(written) => {
            ctx.metrics.add_batch();
            ctx.metrics.add_rows_written(written);
            written
        }
        Err(err) => {
            warn!(
                table = %table,
                rows = rows.len(),
                error = %err.into_inner(),
                "batch write failed after retries, continuing with next batch"
            );
            ctx.metrics.add_failed_batch();
            0
        }
    }
}

/// Job-row updates are observability, not correctness: failures are
/// logged and the run continues.
pub(crate) async fn persist_job(ctx: &SyncContext, job: &SyncJob) {
    if let Err(e) = ctx.state.upsert_job(job).await {
        warn!(job_id = %job.id, error = %e, "failed to persist job progress");
    }
}

/// Remaining row budget for this request given an optional dataset cap.
pub(crate) fn batch_limit(batch_size: usize, row_limit: Option<u64>, done: u64) -> usize {
    match row_limit {
        Some(cap) => {
            let remaining = cap.saturating_sub(done);
            batch_size.min(remaining as usize)
        }
        None => batch_size,
    }
}

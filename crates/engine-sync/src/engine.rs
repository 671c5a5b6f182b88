use crate::{
    context::SyncContext,
    error::SyncError,
    strategy::{
        common::persist_job,
        date_delete_insert::DateDeleteInsert,
        full_refresh::FullRefresh,
        id_increment::IdIncrement,
        missing_ranges::MissingRanges,
        partition_window::PartitionWindow,
        tail_append::TailAppend,
        timestamp::TimestampIncrement,
    },
    transform::dest_column,
    validate::ConsistencyValidator,
};
use chrono::Utc;
use connectors::{connector::SourceConnector, source::SourceAdapter};
use model::{
    connection::ConnectionDescriptor,
    cursor::SyncCursor,
    dataset::{DatasetDescriptor, IdRange, SyncStrategyKind},
    events::SyncEvent,
    job::SyncJob,
};
use std::sync::Arc;
use tracing::{info, warn};

/// What a caller asks the engine to do for one dataset.
#[derive(Debug, Clone)]
pub enum SyncRequest {
    /// Run the dataset's configured strategy.
    Standard,
    /// Backfill explicit primary-key gaps found by an external diff.
    Repair {
        ranges: Vec<IdRange>,
        pk_column: String,
    },
    /// Append from a known key onward; `None` derives the starting key
    /// from the persisted cursor or the destination maximum.
    Tail {
        after_id: Option<i64>,
        row_limit: Option<u64>,
    },
}

#[derive(Debug)]
pub enum SyncOutcome {
    Completed { job: SyncJob, rows: u64 },
    Cancelled { job: SyncJob, rows: u64 },
    /// Another worker holds the dataset lock; nothing ran.
    Skipped,
}

/// Entry point for one synchronization run: lock, job lifecycle, strategy
/// dispatch, advisory validation, event publication, unlock.
pub struct SyncEngine {
    ctx: Arc<SyncContext>,
}

impl SyncEngine {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        SyncEngine { ctx }
    }

    pub fn context(&self) -> Arc<SyncContext> {
        self.ctx.clone()
    }

    pub async fn run(
        &self,
        dataset: &DatasetDescriptor,
        conn: &ConnectionDescriptor,
        request: SyncRequest,
    ) -> Result<SyncOutcome, SyncError> {
        let connector = SourceConnector::connect(conn).await?;
        self.run_with_source(dataset, connector.adapter(), request)
            .await
    }

    pub async fn run_with_source(
        &self,
        dataset: &DatasetDescriptor,
        source: &dyn SourceAdapter,
        request: SyncRequest,
    ) -> Result<SyncOutcome, SyncError> {
        let ctx = &self.ctx;

        if !ctx.locks.acquire(&dataset.id).await {
            return Ok(SyncOutcome::Skipped);
        }

        let mut job = SyncJob::new(&dataset.id);
        job.start();
        persist_job(ctx, &job).await;

        info!(
            dataset_id = %dataset.id,
            job_id = %job.id,
            strategy = %dataset.strategy,
            "sync run starting"
        );

        let result = self.dispatch(dataset, source, &mut job, request).await;

        let outcome = match result {
            Ok(rows) => {
                let cancelled = ctx.should_stop(&job.id).await;
                if cancelled {
                    job.cancel();
                    ctx.events.publish(SyncEvent::Cancelled {
                        dataset_id: dataset.id.clone(),
                        job_id: job.id.clone(),
                        rows,
                    });
                } else {
                    self.validate(dataset, rows).await;
                    if let Err(e) = ctx.state.mark_synced(&dataset.id, Utc::now()).await {
                        warn!(dataset_id = %dataset.id, error = %e, "failed to record sync time");
                    }
                    job.complete();
                    ctx.events.publish(SyncEvent::Completed {
                        dataset_id: dataset.id.clone(),
                        job_id: job.id.clone(),
                        rows,
                    });
                }
                persist_job(ctx, &job).await;
                if cancelled {
                    Ok(SyncOutcome::Cancelled { job, rows })
                } else {
                    Ok(SyncOutcome::Completed { job, rows })
                }
            }
            Err(err) => {
                job.fail(err.to_string());
                ctx.events.publish(SyncEvent::Failed {
                    dataset_id: dataset.id.clone(),
                    job_id: job.id.clone(),
                    error: err.to_string(),
                });
                persist_job(ctx, &job).await;
                Err(err)
            }
        };

        ctx.locks.release(&dataset.id).await;
        outcome
    }

    async fn dispatch(
        &self,
        dataset: &DatasetDescriptor,
        source: &dyn SourceAdapter,
        job: &mut SyncJob,
        request: SyncRequest,
    ) -> Result<u64, SyncError> {
        let ctx = self.ctx.clone();
        match request {
            SyncRequest::Repair { ranges, pk_column } => {
                MissingRanges::new(ctx)
                    .execute(dataset, source, job, &ranges, &pk_column)
                    .await
            }
            SyncRequest::Tail { after_id, row_limit } => {
                let start = match after_id {
                    Some(id) => id,
                    None => self.tail_start(dataset).await?,
                };
                TailAppend::new(ctx)
                    .execute(dataset, source, job, start, row_limit)
                    .await
                    .map(|o| o.rows)
            }
            SyncRequest::Standard => match dataset.strategy {
                SyncStrategyKind::FullRefresh => {
                    FullRefresh::new(ctx).execute(dataset, source, job).await
                }
                SyncStrategyKind::TimestampIncrement => {
                    TimestampIncrement::new(ctx)
                        .execute(dataset, source, job)
                        .await
                }
                SyncStrategyKind::IdIncrement => {
                    IdIncrement::new(ctx).execute(dataset, source, job).await
                }
                SyncStrategyKind::DateDeleteInsert => {
                    DateDeleteInsert::new(ctx)
                        .execute(dataset, source, job)
                        .await
                }
                SyncStrategyKind::PartitionWindow => {
                    PartitionWindow::new(ctx)
                        .execute(dataset, source, job)
                        .await
                }
                SyncStrategyKind::TailAppend => {
                    let start = self.tail_start(dataset).await?;
                    TailAppend::new(ctx)
                        .execute(dataset, source, job, start, None)
                        .await
                        .map(|o| o.rows)
                }
                SyncStrategyKind::MissingRanges => Err(SyncError::Configuration(format!(
                    "dataset {} uses missing_ranges; trigger it as a repair run with explicit ranges",
                    dataset.id
                ))),
            },
        }
    }

    /// Starting key for a tail run: persisted cursor, the dataset's opaque
    /// cursor, destination max, then 0.
    async fn tail_start(&self, dataset: &DatasetDescriptor) -> Result<i64, SyncError> {
        let ctx = &self.ctx;
        if let Some(id) = ctx.state.load_cursor(&dataset.id).await?.as_id() {
            return Ok(id);
        }
        if let Some(id) = SyncCursor::parse(dataset.last_sync_cursor.as_deref()).as_id() {
            return Ok(id);
        }
        if let Some(ref_col) = dataset.reference_column.as_deref() {
            let col = dest_column(dataset, ref_col);
            if let Some(id) = ctx
                .dest
                .max_value(&dataset.dest_table, &col)
                .await?
                .and_then(|v| v.as_i64())
            {
                return Ok(id);
            }
        }
        Ok(0)
    }

    async fn validate(&self, dataset: &DatasetDescriptor, rows: u64) {
        let validator = ConsistencyValidator::new(self.ctx.dest.clone());
        if let Err(e) = validator.check(dataset, rows).await {
            warn!(dataset_id = %dataset.id, error = %e, "post-run validation unavailable");
        }
    }
}

use crate::{
    engine::{SyncEngine, SyncRequest},
    error::SyncError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use model::{connection::ConnectionDescriptor, dataset::DatasetDescriptor};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One dataset's recurrence, owned by the external CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleRecord {
    pub dataset_id: String,
    /// Human-entered expression: "every N minutes", "every N hours",
    /// or "daily at H".
    pub expression: String,
    pub next_run_at: DateTime<Utc>,
    pub enabled: bool,
}

/// Where schedules live. Backends log their own I/O trouble; a failing
/// store simply yields no due work.
#[async_trait]
pub trait ScheduleBackend: Send + Sync {
    /// Enabled schedules whose next run is at or before `now`.
    async fn due(&self, now: DateTime<Utc>) -> Vec<ScheduleRecord>;

    async fn set_next_run(&self, dataset_id: &str, at: DateTime<Utc>);
}

/// Sled-backed schedule store, one record per dataset under a
/// `schedule:` key prefix.
pub struct SledScheduleBackend {
    db: sled::Db,
}

impl SledScheduleBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn key(dataset_id: &str) -> String {
        format!("schedule:{dataset_id}")
    }

    pub fn upsert(&self, record: &ScheduleRecord) {
        match bincode::serialize(record) {
            Ok(bytes) => {
                if let Err(e) = self.db.insert(Self::key(&record.dataset_id), bytes) {
                    warn!(dataset_id = %record.dataset_id, error = %e, "failed to store schedule");
                }
            }
            Err(e) => {
                warn!(dataset_id = %record.dataset_id, error = %e, "failed to encode schedule")
            }
        }
    }
}

#[async_trait]
impl ScheduleBackend for SledScheduleBackend {
    async fn due(&self, now: DateTime<Utc>) -> Vec<ScheduleRecord> {
        let mut due = Vec::new();
        for entry in self.db.scan_prefix("schedule:") {
            let bytes = match entry {
                Ok((_, bytes)) => bytes,
                Err(e) => {
                    warn!(error = %e, "failed to scan schedules");
                    break;
                }
            };
            match bincode::deserialize::<ScheduleRecord>(&bytes) {
                Ok(record) if record.enabled && record.next_run_at <= now => due.push(record),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping undecodable schedule record"),
            }
        }
        due
    }

    async fn set_next_run(&self, dataset_id: &str, at: DateTime<Utc>) {
        let found = self.db.get(Self::key(dataset_id)).ok().flatten();
        let Some(bytes) = found else {
            warn!(dataset_id = %dataset_id, "cannot reschedule a missing schedule record");
            return;
        };
        match bincode::deserialize::<ScheduleRecord>(&bytes) {
            Ok(mut record) => {
                record.next_run_at = at;
                self.upsert(&record);
            }
            Err(e) => warn!(dataset_id = %dataset_id, error = %e, "failed to decode schedule"),
        }
    }
}

/// Resolves a schedule's dataset to its full configuration.
#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    async fn dataset(
        &self,
        dataset_id: &str,
    ) -> Option<(DatasetDescriptor, ConnectionDescriptor)>;
}

/// The one engine call the scheduler makes, behind a trait so ticking can
/// be exercised without live source connections.
#[async_trait]
pub trait SyncDispatch: Send + Sync {
    async fn sync(
        &self,
        dataset: &DatasetDescriptor,
        conn: &ConnectionDescriptor,
    ) -> Result<(), SyncError>;
}

#[async_trait]
impl SyncDispatch for SyncEngine {
    async fn sync(
        &self,
        dataset: &DatasetDescriptor,
        conn: &ConnectionDescriptor,
    ) -> Result<(), SyncError> {
        self.run(dataset, conn, SyncRequest::Standard).await.map(|_| ())
    }
}

/// Polls for due schedules and runs them through the engine, one failure
/// never blocking the others.
pub struct Scheduler {
    engine: Arc<dyn SyncDispatch>,
    schedules: Arc<dyn ScheduleBackend>,
    catalog: Arc<dyn DatasetCatalog>,
    poll_interval: std::time::Duration,
}

impl Scheduler {
    pub fn new(
        engine: Arc<dyn SyncDispatch>,
        schedules: Arc<dyn ScheduleBackend>,
        catalog: Arc<dyn DatasetCatalog>,
    ) -> Self {
        Scheduler {
            engine,
            schedules,
            catalog,
            poll_interval: std::time::Duration::from_secs(30),
        }
    }

    pub fn with_poll_interval(mut self, interval: std::time::Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(poll_secs = self.poll_interval.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("scheduler stopping");
                    break;
                }
                _ = ticker.tick() => self.tick(Utc::now()).await,
            }
        }
    }

    pub async fn tick(&self, now: DateTime<Utc>) {
        for record in self.schedules.due(now).await {
            // Reschedule before running so a crash mid-run cannot
            // re-trigger the same dataset in a tight loop.
            let next = next_run_after(&record.expression, now);
            self.schedules.set_next_run(&record.dataset_id, next).await;

            let Some((dataset, conn)) = self.catalog.dataset(&record.dataset_id).await else {
                warn!(
                    dataset_id = %record.dataset_id,
                    "scheduled dataset no longer exists, skipping"
                );
                continue;
            };

            info!(
                dataset_id = %record.dataset_id,
                next_run = %next.to_rfc3339(),
                "running scheduled sync"
            );
            if let Err(e) = self.engine.sync(&dataset, &conn).await {
                error!(dataset_id = %record.dataset_id, error = %e, "scheduled sync failed");
            }
        }
    }
}

/// Next occurrence after `now` for a schedule expression. Unrecognized
/// expressions defer a full day rather than firing repeatedly.
pub fn next_run_after(expression: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let expr = expression.trim().to_ascii_lowercase();
    let words: Vec<&str> = expr.split_whitespace().collect();

    match words.as_slice() {
        ["every", n, unit] => {
            if let Ok(n) = n.parse::<i64>() {
                if n > 0 {
                    match *unit {
                        "minute" | "minutes" => return now + Duration::minutes(n),
                        "hour" | "hours" => return now + Duration::hours(n),
                        _ => {}
                    }
                }
            }
        }
        ["daily", "at", h] => {
            if let Ok(hour) = h.parse::<u32>() {
                if let Some(at) = now.date_naive().and_hms_opt(hour, 0, 0) {
                    let candidate = Utc.from_utc_datetime(&at);
                    return if candidate > now {
                        candidate
                    } else {
                        candidate + Duration::days(1)
                    };
                }
            }
        }
        _ => {}
    }

    warn!(expression = %expression, "unrecognized schedule expression, deferring one day");
    now + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use model::{
        connection::{Secret, SourceKind},
        dataset::SyncStrategyKind,
    };
    use tempfile::tempdir;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 11, h, m, 0).unwrap()
    }

    fn record(dataset_id: &str, next_run_at: DateTime<Utc>, enabled: bool) -> ScheduleRecord {
        ScheduleRecord {
            dataset_id: dataset_id.into(),
            expression: "every 15 minutes".into(),
            next_run_at,
            enabled,
        }
    }

    fn descriptor(dataset_id: &str) -> DatasetDescriptor {
        DatasetDescriptor {
            id: dataset_id.into(),
            name: dataset_id.into(),
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
            column_mappings: vec![],
            last_sync_cursor: None,
            last_sync_at: None,
        }
    }

    fn connection() -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: "c1".into(),
            kind: SourceKind::MySql,
            host: "db.internal".into(),
            port: 3306,
            database: "orders".into(),
            username: "sync".into(),
            password: Secret::new("pw"),
            base_url: None,
            api_token: None,
        }
    }

    /// Fails for `ds-a`, succeeds otherwise, recording every attempt.
    #[derive(Default)]
    struct FlakyDispatch {
        calls: tokio::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SyncDispatch for FlakyDispatch {
        async fn sync(
            &self,
            dataset: &DatasetDescriptor,
            _conn: &ConnectionDescriptor,
        ) -> Result<(), SyncError> {
            self.calls.lock().await.push(dataset.id.clone());
            if dataset.id == "ds-a" {
                Err(SyncError::Configuration("simulated failure".into()))
            } else {
                Ok(())
            }
        }
    }

    struct StaticCatalog;

    #[async_trait]
    impl DatasetCatalog for StaticCatalog {
        async fn dataset(
            &self,
            dataset_id: &str,
        ) -> Option<(DatasetDescriptor, ConnectionDescriptor)> {
            Some((descriptor(dataset_id), connection()))
        }
    }

    #[tokio::test]
    async fn sled_backend_returns_only_due_enabled_schedules() {
        let dir = tempdir().unwrap();
        let backend = SledScheduleBackend::open(dir.path()).unwrap();
        let now = at(8, 0);

        backend.upsert(&record("ds-due", now - Duration::minutes(5), true));
        backend.upsert(&record("ds-future", now + Duration::hours(1), true));
        backend.upsert(&record("ds-off", now - Duration::minutes(5), false));

        let due = backend.due(now).await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].dataset_id, "ds-due");

        backend.set_next_run("ds-due", now + Duration::minutes(15)).await;
        assert!(backend.due(now).await.is_empty());
    }

    #[tokio::test]
    async fn one_failing_dataset_does_not_abort_the_tick() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(SledScheduleBackend::open(dir.path()).unwrap());
        let now = at(8, 0);
        backend.upsert(&record("ds-a", now, true));
        backend.upsert(&record("ds-b", now, true));

        let dispatch = Arc::new(FlakyDispatch::default());
        let scheduler = Scheduler::new(
            dispatch.clone(),
            backend.clone(),
            Arc::new(StaticCatalog),
        );

        scheduler.tick(now).await;

        // ds-a failed, ds-b still ran.
        assert_eq!(
            *dispatch.calls.lock().await,
            vec!["ds-a".to_string(), "ds-b".to_string()]
        );
        // Both were rescheduled past the tick instant.
        assert!(backend.due(now).await.is_empty());
    }

    #[test]
    fn interval_expressions() {
        let now = at(8, 0);
        assert_eq!(next_run_after("every 15 minutes", now), at(8, 15));
        assert_eq!(next_run_after("every 2 hours", now), at(10, 0));
        assert_eq!(next_run_after("  Every 1 Hour ", now), at(9, 0));
    }

    #[test]
    fn daily_rolls_to_tomorrow_once_passed() {
        let now = at(8, 0);
        assert_eq!(next_run_after("daily at 23", now), at(23, 0));

        let late = at(23, 30);
        assert_eq!(
            next_run_after("daily at 23", late),
            Utc.with_ymd_and_hms(2024, 1, 12, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn garbage_defers_one_day() {
        let now = at(8, 0);
        assert_eq!(next_run_after("whenever you feel like it", now), now + Duration::days(1));
        assert_eq!(next_run_after("every -3 hours", now), now + Duration::days(1));
        assert_eq!(next_run_after("daily at 99", now), now + Duration::days(1));
    }
}

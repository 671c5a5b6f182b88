use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// The job row created by a trigger and mutated by the running strategy.
///
/// Survives restarts only via its persisted form; in-memory progress is
/// lost on crash, the dataset cursor is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    pub dataset_id: String,
    pub status: JobStatus,
    pub rows_processed: u64,
    pub progress: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    pub fn new(dataset_id: &str) -> Self {
        SyncJob {
            id: Uuid::new_v4().to_string(),
            dataset_id: dataset_id.to_string(),
            status: JobStatus::Pending,
            rows_processed: 0,
            progress: None,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Utc::now();
    }

    pub fn advance(&mut self, rows: u64) {
        self.rows_processed += rows;
    }

    pub fn note(&mut self, progress: impl Into<String>) {
        self.progress = Some(progress.into());
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(message.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

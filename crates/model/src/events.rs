use serde::{Deserialize, Serialize};

/// Published after a run finishes so a notification layer can trigger a
/// live UI refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    Completed {
        dataset_id: String,
        job_id: String,
        rows: u64,
    },
    Failed {
        dataset_id: String,
        job_id: String,
        error: String,
    },
    Cancelled {
        dataset_id: String,
        job_id: String,
        rows: u64,
    },
}

impl SyncEvent {
    pub fn dataset_id(&self) -> &str {
        match self {
            SyncEvent::Completed { dataset_id, .. } => dataset_id,
            SyncEvent::Failed { dataset_id, .. } => dataset_id,
            SyncEvent::Cancelled { dataset_id, .. } => dataset_id,
        }
    }
}

use crate::error::StateError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{cursor::SyncCursor, job::SyncJob};
use std::path::Path;

/// Persistence for the engine's durable state: the per-dataset resume
/// cursor and the job rows a UI polls.
///
/// The cursor must survive crashes; in-memory job progress may not.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn save_cursor(&self, dataset_id: &str, cursor: &SyncCursor) -> Result<(), StateError>;

    async fn load_cursor(&self, dataset_id: &str) -> Result<SyncCursor, StateError>;

    async fn mark_synced(&self, dataset_id: &str, at: DateTime<Utc>) -> Result<(), StateError>;

    async fn last_synced(&self, dataset_id: &str) -> Result<Option<DateTime<Utc>>, StateError>;

    async fn upsert_job(&self, job: &SyncJob) -> Result<(), StateError>;

    async fn load_job(&self, job_id: &str) -> Result<Option<SyncJob>, StateError>;
}

/// Sled-backed state records, bincode-encoded under prefixed keys.
pub struct SledStateBackend {
    db: sled::Db,
}

impl SledStateBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn cursor_key(dataset_id: &str) -> String {
        format!("cursor:{dataset_id}")
    }

    fn synced_key(dataset_id: &str) -> String {
        format!("synced:{dataset_id}")
    }

    fn job_key(job_id: &str) -> String {
        format!("job:{job_id}")
    }
}

#[async_trait]
impl StateBackend for SledStateBackend {
    async fn save_cursor(&self, dataset_id: &str, cursor: &SyncCursor) -> Result<(), StateError> {
        let bytes = bincode::serialize(cursor).map_err(|e| StateError::SaveCursor {
            dataset_id: dataset_id.to_string(),
            message: e.to_string(),
        })?;
        self.db
            .insert(Self::cursor_key(dataset_id), bytes)
            .map_err(|e| StateError::SaveCursor {
                dataset_id: dataset_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn load_cursor(&self, dataset_id: &str) -> Result<SyncCursor, StateError> {
        let found = self
            .db
            .get(Self::cursor_key(dataset_id))
            .map_err(|e| StateError::LoadCursor {
                dataset_id: dataset_id.to_string(),
                message: e.to_string(),
            })?;

        match found {
            Some(bytes) => bincode::deserialize(&bytes).map_err(|e| StateError::LoadCursor {
                dataset_id: dataset_id.to_string(),
                message: e.to_string(),
            }),
            None => Ok(SyncCursor::None),
        }
    }

    async fn mark_synced(&self, dataset_id: &str, at: DateTime<Utc>) -> Result<(), StateError> {
        self.db
            .insert(
                Self::synced_key(dataset_id),
                at.to_rfc3339().as_bytes().to_vec(),
            )
            .map_err(|e| StateError::SaveCursor {
                dataset_id: dataset_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn last_synced(&self, dataset_id: &str) -> Result<Option<DateTime<Utc>>, StateError> {
        let found = self
            .db
            .get(Self::synced_key(dataset_id))
            .map_err(|e| StateError::LoadCursor {
                dataset_id: dataset_id.to_string(),
                message: e.to_string(),
            })?;

        Ok(found.and_then(|bytes| {
            std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        }))
    }

    async fn upsert_job(&self, job: &SyncJob) -> Result<(), StateError> {
        let bytes = bincode::serialize(job).map_err(|e| StateError::SaveJob {
            job_id: job.id.clone(),
            message: e.to_string(),
        })?;
        self.db
            .insert(Self::job_key(&job.id), bytes)
            .map_err(|e| StateError::SaveJob {
                job_id: job.id.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn load_job(&self, job_id: &str) -> Result<Option<SyncJob>, StateError> {
        let found = self
            .db
            .get(Self::job_key(job_id))
            .map_err(|e| StateError::LoadJob {
                job_id: job_id.to_string(),
                message: e.to_string(),
            })?;

        match found {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| StateError::LoadJob {
                    job_id: job_id.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[tokio::test]
    async fn cursor_round_trips_and_defaults_to_none() {
        let dir = tempdir().unwrap();
        let state = SledStateBackend::open(dir.path()).unwrap();

        assert_eq!(state.load_cursor("ds-1").await.unwrap(), SyncCursor::None);

        state
            .save_cursor("ds-1", &SyncCursor::Id(42_000))
            .await
            .unwrap();
        assert_eq!(
            state.load_cursor("ds-1").await.unwrap(),
            SyncCursor::Id(42_000)
        );
    }

    #[tokio::test]
    async fn job_rows_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let job = {
            let state = SledStateBackend::open(dir.path()).unwrap();
            let mut job = SyncJob::new("ds-1");
            job.start();
            job.advance(5000);
            state.upsert_job(&job).await.unwrap();
            job
        };

        let state = SledStateBackend::open(dir.path()).unwrap();
        let loaded = state.load_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.rows_processed, 5000);
    }

    #[tokio::test]
    async fn last_synced_round_trips() {
        let dir = tempdir().unwrap();
        let state = SledStateBackend::open(dir.path()).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 11, 8, 0, 0).unwrap();

        assert_eq!(state.last_synced("ds-1").await.unwrap(), None);
        state.mark_synced("ds-1", at).await.unwrap();
        assert_eq!(state.last_synced("ds-1").await.unwrap(), Some(at));
    }
}

use crate::store::SharedStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

/// What a lock entry records about its holder.
#[derive(Debug, Serialize, Deserialize)]
struct LockValue {
    holder: String,
    acquired_at: chrono::DateTime<Utc>,
}

/// Per-dataset mutual exclusion plus cooperative cancellation flags, both
/// living in the shared TTL store.
///
/// Store I/O failures degrade to "continue": a transient outage of the
/// shared store must not halt a multi-hour synchronization.
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn SharedStore>,
    holder: String,
    lock_ttl: Duration,
    cancel_ttl: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn SharedStore>, lock_ttl: Duration, cancel_ttl: Duration) -> Self {
        LockManager {
            store,
            holder: format!("worker-{}", Uuid::new_v4()),
            lock_ttl,
            cancel_ttl,
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    fn lock_key(dataset_id: &str) -> String {
        format!("lock:{dataset_id}")
    }

    fn cancel_key(job_id: &str) -> String {
        format!("cancel:{job_id}")
    }

    /// Non-blocking: `false` means another worker holds the dataset and the
    /// caller should skip this run, not queue behind it.
    pub async fn acquire(&self, dataset_id: &str) -> bool {
        let key = Self::lock_key(dataset_id);
        let value = serde_json::to_string(&LockValue {
            holder: self.holder.clone(),
            acquired_at: Utc::now(),
        })
        .unwrap_or_default();

        match self.store.put_if_absent(&key, &value, self.lock_ttl).await {
            Ok(true) => true,
            Ok(false) => {
                let holder = match self.store.get(&key).await {
                    Ok(Some(raw)) => serde_json::from_str::<LockValue>(&raw)
                        .map(|v| v.holder)
                        .unwrap_or(raw),
                    _ => "unknown".to_string(),
                };
                info!(
                    dataset_id = %dataset_id,
                    held_by = %holder,
                    "dataset is already being synchronized, skipping"
                );
                false
            }
            Err(e) => {
                // Fail open: better to risk a duplicate run than to stall
                // every dataset on a store outage.
                warn!(dataset_id = %dataset_id, error = %e, "lock store unavailable, proceeding without lock");
                true
            }
        }
    }

    pub async fn release(&self, dataset_id: &str) {
        if let Err(e) = self.store.delete(&Self::lock_key(dataset_id)).await {
            warn!(dataset_id = %dataset_id, error = %e, "failed to release dataset lock");
        }
    }

    /// Flags a running job for cooperative cancellation. The flag is only
    /// honored at batch boundaries.
    pub async fn send_cancel(&self, job_id: &str) {
        if let Err(e) = self
            .store
            .put(&Self::cancel_key(job_id), "1", self.cancel_ttl)
            .await
        {
            warn!(job_id = %job_id, error = %e, "failed to set cancellation flag");
        }
    }

    pub async fn is_cancelled(&self, job_id: &str) -> bool {
        match self.store.get(&Self::cancel_key(job_id)).await {
            Ok(flag) => flag.is_some(),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "cancellation check failed, continuing");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sled_store::SledSharedStore;
    use tempfile::tempdir;

    fn manager(dir: &std::path::Path) -> LockManager {
        let store = Arc::new(SledSharedStore::open(dir).unwrap());
        LockManager::new(store, Duration::from_secs(60), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        assert!(locks.acquire("ds-1").await);
        assert!(!locks.acquire("ds-1").await);

        locks.release("ds-1").await;
        assert!(locks.acquire("ds-1").await);
    }

    #[tokio::test]
    async fn cancel_flag_visible_only_after_send() {
        let dir = tempdir().unwrap();
        let locks = manager(dir.path());

        assert!(!locks.is_cancelled("job-1").await);
        locks.send_cancel("job-1").await;
        assert!(locks.is_cancelled("job-1").await);
        // An unrelated job stays uncancelled.
        assert!(!locks.is_cancelled("job-2").await);
    }
}

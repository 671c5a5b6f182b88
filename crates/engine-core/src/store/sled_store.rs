use crate::{error::StoreError, store::SharedStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Sled has no native TTL, so every entry carries its own expiry and
/// expired entries read as vacant.
#[derive(Serialize, Deserialize, Debug)]
struct Entry {
    value: String,
    expires_at_ms: i64,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        Entry {
            value: value.to_string(),
            expires_at_ms: Utc::now().timestamp_millis() + ttl.as_millis() as i64,
        }
    }

    fn is_live(&self) -> bool {
        self.expires_at_ms > Utc::now().timestamp_millis()
    }
}

pub struct SledSharedStore {
    db: sled::Db,
}

impl SledSharedStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn encode(entry: &Entry) -> Result<Vec<u8>, StoreError> {
        bincode::serialize(entry).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Entry, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SharedStore for SledSharedStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let bytes = Self::encode(&Entry::new(value, ttl))?;
        self.db.insert(key, bytes)?;
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let current = self.db.get(key)?;

        if let Some(bytes) = &current {
            let entry = Self::decode(bytes)?;
            if entry.is_live() {
                return Ok(false);
            }
        }

        // Conditional swap so a racing holder cannot be overwritten: the
        // previous value must still be what we just read (live check above
        // treats an expired entry as vacant but still swaps against it).
        let new_bytes = Self::encode(&Entry::new(value, ttl))?;
        let swapped = self
            .db
            .compare_and_swap(key, current, Some(new_bytes))?
            .is_ok();
        Ok(swapped)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.db.get(key)? {
            Some(bytes) => {
                let entry = Self::decode(&bytes)?;
                if entry.is_live() {
                    Ok(Some(entry.value))
                } else {
                    // Lazy cleanup of the stale entry.
                    let _ = self.db.remove(key);
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.db.remove(key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn put_if_absent_is_exclusive_until_deleted() {
        let dir = tempdir().unwrap();
        let store = SledSharedStore::open(dir.path()).unwrap();

        assert!(store.put_if_absent("lock:ds-1", "holder-a", TTL).await.unwrap());
        assert!(!store.put_if_absent("lock:ds-1", "holder-b", TTL).await.unwrap());
        assert_eq!(
            store.get("lock:ds-1").await.unwrap().as_deref(),
            Some("holder-a")
        );

        store.delete("lock:ds-1").await.unwrap();
        assert!(store.put_if_absent("lock:ds-1", "holder-b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn expired_entries_read_as_vacant() {
        let dir = tempdir().unwrap();
        let store = SledSharedStore::open(dir.path()).unwrap();

        store
            .put("cancel:job-1", "1", Duration::from_millis(0))
            .await
            .unwrap();
        assert_eq!(store.get("cancel:job-1").await.unwrap(), None);

        // A dead holder's lock can be taken over.
        store
            .put("lock:ds-2", "crashed", Duration::from_millis(0))
            .await
            .unwrap();
        assert!(store.put_if_absent("lock:ds-2", "next", TTL).await.unwrap());
    }
}

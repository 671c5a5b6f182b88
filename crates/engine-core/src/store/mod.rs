pub mod sled_store;

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Shared TTL-keyed store backing locks and cancellation flags.
///
/// Key conventions: `lock:<dataset_id>`, `cancel:<job_id>`. Entries past
/// their TTL behave as absent, so a crashed lock holder frees itself.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomic conditional write: returns `false` (leaving the existing
    /// value in place) when a live entry already holds the key.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

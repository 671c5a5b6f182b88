use crate::config::SyncConfig;
use connectors::dest::Destination;
use engine_core::{
    events::EventBus, lock::LockManager, memory::MemoryGovernor, metrics::SyncMetrics,
    retry::RetryPolicy, state::StateBackend,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators every strategy runs against, injected once at startup.
pub struct SyncContext {
    pub dest: Arc<dyn Destination>,
    pub locks: LockManager,
    pub state: Arc<dyn StateBackend>,
    pub governor: MemoryGovernor,
    pub metrics: SyncMetrics,
    pub events: EventBus,
    pub retry: RetryPolicy,
    pub config: SyncConfig,
    /// Process-level shutdown; checked alongside the per-job cancel flag.
    pub shutdown: CancellationToken,
}

impl SyncContext {
    pub fn new(
        dest: Arc<dyn Destination>,
        locks: LockManager,
        state: Arc<dyn StateBackend>,
        config: SyncConfig,
    ) -> Self {
        SyncContext {
            dest,
            locks,
            state,
            governor: MemoryGovernor::default(),
            metrics: SyncMetrics::new(),
            events: EventBus::default(),
            retry: RetryPolicy::for_destination(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cooperative stop check, honored at batch boundaries only.
    pub async fn should_stop(&self, job_id: &str) -> bool {
        self.shutdown.is_cancelled() || self.locks.is_cancelled(job_id).await
    }
}

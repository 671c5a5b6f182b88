use std::time::Duration;

/// Engine-wide tuning knobs shared by all strategies.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rows per source fetch and destination insert.
    pub batch_size: usize,
    /// Trailing calendar days the partition strategy always re-syncs.
    pub refresh_window_days: u32,
    /// Skip end-of-run compaction when a single run inserted more rows
    /// than this, trading tidiness for run time on very large catch-ups.
    pub optimize_skip_rows: u64,
    pub lock_ttl: Duration,
    pub cancel_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            batch_size: 5000,
            refresh_window_days: 3,
            optimize_skip_rows: 1_000_000,
            lock_ttl: Duration::from_secs(6 * 3600),
            cancel_ttl: Duration::from_secs(3600),
        }
    }
}

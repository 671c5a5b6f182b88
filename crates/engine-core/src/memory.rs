use std::time::Duration;
use tracing::{debug, warn};

/// Caps peak memory by pausing between batches.
///
/// Checks resident set size before each batch and pauses above the ceiling
/// so the allocator and OS can reclaim; additionally pauses unconditionally
/// every `force_every_rows` processed rows, trading CPU time for bounded
/// peak memory on datasets larger than available RAM.
#[derive(Debug, Clone)]
pub struct MemoryGovernor {
    ceiling_bytes: u64,
    pause: Duration,
    force_every_rows: u64,
}

impl Default for MemoryGovernor {
    fn default() -> Self {
        MemoryGovernor {
            ceiling_bytes: 1_500 * 1024 * 1024,
            pause: Duration::from_millis(200),
            force_every_rows: 500_000,
        }
    }
}

impl MemoryGovernor {
    pub fn new(ceiling_bytes: u64, pause: Duration, force_every_rows: u64) -> Self {
        MemoryGovernor {
            ceiling_bytes,
            pause,
            force_every_rows: force_every_rows.max(1),
        }
    }

    /// Current resident set size. Non-Linux platforms report 0, which
    /// disables pressure-based throttling but keeps the periodic pause.
    pub fn rss_bytes(&self) -> u64 {
        rss_bytes_linux().unwrap_or(0)
    }

    /// Called before each batch with the total rows processed so far.
    /// Returns `true` when a pause was taken (exposed for tests/metrics).
    pub async fn throttle(&self, rows_done: u64) -> bool {
        let rss = self.rss_bytes();
        if rss > self.ceiling_bytes {
            warn!(
                rss_mb = rss / (1024 * 1024),
                ceiling_mb = self.ceiling_bytes / (1024 * 1024),
                "memory pressure, pausing before next batch"
            );
            tokio::task::yield_now().await;
            tokio::time::sleep(self.pause).await;
            return true;
        }

        // Mandatory pause cadence regardless of measured pressure.
        if rows_done > 0 && rows_done % self.force_every_rows == 0 {
            debug!(rows_done = rows_done, "periodic pause");
            tokio::task::yield_now().await;
            tokio::time::sleep(self.pause).await;
            return true;
        }

        false
    }
}

#[cfg(target_os = "linux")]
fn rss_bytes_linux() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn rss_bytes_linux() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pauses_above_ceiling() {
        // Ceiling of zero: any live process is above it.
        let governor = MemoryGovernor::new(0, Duration::from_millis(1), 1_000_000);
        if governor.rss_bytes() > 0 {
            assert!(governor.throttle(10).await);
        }
    }

    #[tokio::test]
    async fn periodic_pause_fires_on_cadence() {
        let governor = MemoryGovernor::new(u64::MAX, Duration::from_millis(1), 100);
        assert!(!governor.throttle(50).await);
        assert!(governor.throttle(200).await);
        assert!(!governor.throttle(0).await);
    }
}

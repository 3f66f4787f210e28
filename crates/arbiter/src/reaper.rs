//! Crash recovery and teardown accounting

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::isolate::{BoxPool, IsolateAction, run_action};

/// Counts sandboxes created and torn down
#[derive(Debug, Default)]
pub struct TeardownLedger {
    acquired: AtomicU64,
    released: AtomicU64,
}

impl TeardownLedger {
    pub fn record_acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Sandboxes acquired and not yet released
    pub fn live(&self) -> u64 {
        self.acquired().saturating_sub(self.released())
    }
}

/// Clean up every box id the pool owns.
///
/// Run at startup, before anything is acquired, to remove boxes a crashed
/// process left behind. Returns the number of ids cleaned without error.
#[instrument(skip(pool))]
pub async fn sweep(pool: &BoxPool) -> u32 {
    let mut cleaned = 0;

    for id in pool.box_ids() {
        match run_action(pool.isolate_path(), id, pool.cgroup(), IsolateAction::Cleanup).await {
            Ok(output) if output.status.success() => {
                cleaned += 1;
                debug!(id, "swept box");
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(id, stderr = %stderr.trim(), "sweep cleanup failed");
            }
            Err(e) => {
                warn!(id, error = %e, "sweep could not run isolate");
                // Every other id would fail the same way
                break;
            }
        }
    }

    info!(cleaned, total = pool.capacity(), "startup sweep finished");
    cleaned
}

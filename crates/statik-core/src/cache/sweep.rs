//! Periodic background maintenance.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::ValidatingCache;

/// Run [`ValidatingCache::sweep`] every `period` on the current tokio
/// runtime, dropping entries idle for `idle_windows` staleness windows.
/// Abort the returned handle to stop.
pub fn spawn_sweeper(cache: Arc<ValidatingCache>, period: Duration, idle_windows: u32) -> JoinHandle<()> {
    let idle = cache.settings().stale_window.saturating_mul(idle_windows.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            cache.sweep(idle);
        }
    })
}

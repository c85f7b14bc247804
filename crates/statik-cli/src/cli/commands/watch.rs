//! `statik watch` – poll a path through the cache and report what changes.

use std::time::Duration;

use anyhow::Result;
use statik_core::config::StatikConfig;
use statik_core::StaticFiles;
use tokio::time::MissedTickBehavior;

pub async fn run_watch(cfg: &StatikConfig, path: &str, interval_ms: u64, count: u64) -> Result<()> {
    let files = StaticFiles::from_config(cfg)?;
    let sweeper = files.spawn_sweeper();

    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last: Option<String> = None;
    let mut polls = 0u64;
    loop {
        ticker.tick().await;
        let seen = match files.resolve(path)? {
            Some(d) => format!("{} len={} etag={}", d.path(), d.len(), d.etag()),
            None => format!("{path} missing"),
        };
        if last.as_deref() != Some(seen.as_str()) {
            println!("{seen}");
            last = Some(seen);
        }
        polls += 1;
        if count != 0 && polls >= count {
            break;
        }
    }

    if let Some(handle) = sweeper {
        handle.abort();
    }
    println!("{}", serde_json::to_string(&files.cache().stats())?);
    Ok(())
}

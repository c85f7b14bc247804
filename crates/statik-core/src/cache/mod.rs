//! Validating content cache.
//!
//! [`ValidatingCache`] is the outermost resolver. Entries are served as-is
//! while younger than the staleness window; older entries are re-checked
//! against storage (length and modification time only) and either
//! re-stamped or reloaded through the inner resolver. Misses are cached the
//! same way. The cache is process-local and bounded by a byte budget and an
//! entry count; the least recently validated entry is evicted first.

mod budget;
mod entry;
mod sweep;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::content::{ContentResolver, Descriptor};
use crate::error::{guard, sanitize_fault, ResolveError};
use crate::location::{encode_key, normalize, Location, Storage};

pub use budget::Budget;
pub use entry::{CacheEntry, ENTRY_OVERHEAD};
pub use sweep::spawn_sweeper;

/// Tunables for [`ValidatingCache`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub stale_window: Duration,
    pub max_bytes: usize,
    pub max_entries: usize,
    /// Filesystem files up to this size are held in memory.
    pub max_buffered_file_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            stale_window: Duration::from_millis(1000),
            max_bytes: 256 * 1024 * 1024,
            max_entries: 2048,
            max_buffered_file_bytes: 128 * 1024,
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Served from a fresh entry.
    pub hits: u64,
    /// No entry; inner resolver consulted.
    pub misses: u64,
    /// Stale entry found unchanged and re-stamped.
    pub revalidations: u64,
    /// Stale entry found changed and reloaded.
    pub reloads: u64,
    pub evictions: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    revalidations: AtomicU64,
    reloads: AtomicU64,
    evictions: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Caching resolver with bounded staleness.
#[derive(Debug)]
pub struct ValidatingCache {
    inner: Arc<dyn ContentResolver>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
    entries: DashMap<String, Arc<CacheEntry>>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    budget: Budget,
    seq: AtomicU64,
    counters: Counters,
}

impl ValidatingCache {
    /// `storage` must be the backend `inner` ultimately resolves against; it
    /// is consulted directly for cheap re-checks.
    pub fn new(
        inner: Arc<dyn ContentResolver>,
        storage: Arc<dyn Storage>,
        settings: CacheSettings,
    ) -> Self {
        Self::with_clock(inner, storage, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        inner: Arc<dyn ContentResolver>,
        storage: Arc<dyn Storage>,
        settings: CacheSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let budget = Budget::new(settings.max_bytes, settings.max_entries);
        Self {
            inner,
            storage,
            clock,
            settings,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            budget,
            seq: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Number of cached entries, negative ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently accounted against the budget.
    pub fn weight(&self) -> usize {
        self.budget.bytes()
    }

    /// Whether the normalized form of `path` has an entry.
    pub fn contains(&self, path: &str) -> bool {
        matches!(normalize(path), Ok(Some(rel)) if self.entries.contains_key(&rel.key()))
    }

    /// Drop the entry for `path`, if any.
    pub fn invalidate(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(Some(rel)) => self.discard(&rel.key()),
            _ => false,
        }
    }

    pub fn clear(&self) {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.discard(&key);
        }
    }

    /// Drop entries not validated within `idle`, then re-apply the budget.
    /// Returns how many entries were dropped.
    pub fn sweep(&self, idle: Duration) -> usize {
        let now = self.clock.now();
        let idle_keys: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|e| now.saturating_duration_since(e.validated_at) >= idle)
            .map(|e| (e.key().clone(), e.seq))
            .collect();
        let mut dropped = 0;
        for (key, seq) in idle_keys {
            if let Some((_, old)) = self.entries.remove_if(&key, |_, e| e.seq == seq) {
                self.budget.release(old.weight);
                dropped += 1;
            }
        }
        self.enforce_budget(None);
        if dropped > 0 {
            tracing::debug!(dropped, remaining = self.entries.len(), "cache sweep");
        }
        dropped
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        self.clock.now().saturating_duration_since(entry.validated_at) < self.settings.stale_window
    }

    fn current(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.entries.get(key).map(|e| Arc::clone(e.value()))
    }

    fn fresh(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.current(key).filter(|e| self.is_fresh(e))
    }

    fn gate(&self, key: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Stale path: cheap re-check, then re-stamp or reload.
    fn revalidate(
        &self,
        path: &str,
        key: &str,
        entry: Arc<CacheEntry>,
    ) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        let unchanged = match guard(path, || self.unchanged(key, &entry)) {
            Ok(v) => v,
            Err(err) => {
                self.discard(key);
                return Err(err);
            }
        };
        if unchanged {
            Counters::bump(&self.counters.revalidations);
            tracing::debug!(key, "cache entry revalidated");
            let restamped = entry.restamped(self.clock.now(), self.next_seq());
            self.install(key, restamped);
            return Ok(entry.descriptor.clone());
        }
        Counters::bump(&self.counters.reloads);
        tracing::debug!(key, "cache entry changed; reloading");
        self.discard(key);
        self.load(path, key)
    }

    /// Length and modification time of the entry (and its variants) still
    /// match storage.
    fn unchanged(&self, key: &str, entry: &CacheEntry) -> Result<bool> {
        let now = self.storage.resolve(&encode_key(key))?;
        let Some(d) = &entry.descriptor else {
            return Ok(!now.exists());
        };
        if !now.same_snapshot(d.location()) {
            return Ok(false);
        }
        for (_, variant) in d.variants() {
            let v: Location = self.storage.resolve(&encode_key(variant.path()))?;
            if !v.same_snapshot(variant.location()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Uncached path: ask the inner resolver and insert the outcome.
    fn load(&self, path: &str, key: &str) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        let found = match self.inner.resolve(path) {
            Ok(found) => found.map(|d| self.buffered(d)),
            Err(err) => {
                self.discard(key);
                return Err(err);
            }
        };
        let entry = CacheEntry::new(found.clone(), self.clock.now(), self.next_seq());
        if !self.budget.admits(entry.weight) {
            tracing::debug!(key, weight = entry.weight, "entry exceeds cache budget; not cached");
            self.discard(key);
            return Ok(found);
        }
        self.install(key, entry);
        self.enforce_budget(Some(key));
        Ok(found)
    }

    /// Hold the bytes of small filesystem files in memory.
    fn buffered(&self, d: Arc<Descriptor>) -> Arc<Descriptor> {
        if !d.is_fs_file()
            || d.is_mapped()
            || d.buffer().is_some()
            || d.len() > self.settings.max_buffered_file_bytes
        {
            return d;
        }
        match d.location().read_all() {
            Ok(bytes) if bytes.len() as u64 == d.len() => {
                Arc::new(Arc::unwrap_or_clone(d).with_buffer(Arc::from(bytes)))
            }
            Ok(_) => {
                tracing::debug!(path = %d.path(), "file changed while buffering; left unbuffered");
                d
            }
            Err(err) => {
                tracing::debug!(path = %d.path(), error = %format!("{err:#}"), "buffering failed");
                d
            }
        }
    }

    /// Insert or replace `key`; the newest write wins.
    fn install(&self, key: &str, entry: CacheEntry) {
        let weight = entry.weight;
        match self.entries.insert(key.to_string(), Arc::new(entry)) {
            Some(old) => self.budget.replace(old.weight, weight),
            None => self.budget.charge(weight),
        }
    }

    fn discard(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, old)) => {
                self.budget.release(old.weight);
                true
            }
            None => false,
        }
    }

    /// Evict least recently validated entries until within budget. `keep` is
    /// never chosen.
    fn enforce_budget(&self, keep: Option<&str>) {
        while self.budget.over() {
            let victim = self
                .entries
                .iter()
                .filter(|e| Some(e.key().as_str()) != keep)
                .min_by_key(|e| e.seq)
                .map(|e| (e.key().clone(), e.seq));
            let Some((key, seq)) = victim else {
                break;
            };
            if let Some((_, old)) = self.entries.remove_if(&key, |_, e| e.seq == seq) {
                self.budget.release(old.weight);
                Counters::bump(&self.counters.evictions);
                tracing::debug!(key = %key, weight = old.weight, total = self.budget.bytes(), "cache eviction");
            }
        }
    }
}

impl ContentResolver for ValidatingCache {
    fn resolve(&self, path_in_context: &str) -> Result<Option<Arc<Descriptor>>, ResolveError> {
        let key = match normalize(path_in_context) {
            Ok(Some(rel)) => rel.key(),
            Ok(None) => return Ok(None),
            Err(fault) => return Err(sanitize_fault(path_in_context, fault)),
        };

        if let Some(hit) = self.fresh(&key) {
            Counters::bump(&self.counters.hits);
            return Ok(hit.descriptor.clone());
        }

        let gate = self.gate(&key);
        let result = {
            let _held = gate.lock().unwrap_or_else(|e| e.into_inner());
            match self.current(&key) {
                // Someone else refreshed it while we waited.
                Some(entry) if self.is_fresh(&entry) => {
                    Counters::bump(&self.counters.hits);
                    Ok(entry.descriptor.clone())
                }
                Some(entry) => self.revalidate(path_in_context, &key, entry),
                None => {
                    Counters::bump(&self.counters.misses);
                    self.load(path_in_context, &key)
                }
            }
        };
        // Ours plus the map's reference means nobody is waiting.
        self.in_flight
            .remove_if(&key, |_, g| Arc::strong_count(g) <= 2);
        result
    }
}

#[cfg(test)]
mod tests;

//! Byte and entry-count budget shared by all cache shards.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Running totals checked against the configured ceilings. Charges may
/// briefly overshoot; the cache evicts until [`Budget::over`] is false.
#[derive(Debug)]
pub struct Budget {
    max_bytes: usize,
    max_entries: usize,
    bytes: AtomicUsize,
    entries: AtomicUsize,
}

impl Budget {
    pub fn new(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            max_bytes,
            max_entries: max_entries.max(1),
            bytes: AtomicUsize::new(0),
            entries: AtomicUsize::new(0),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Bytes currently accounted.
    pub fn bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn entries(&self) -> usize {
        self.entries.load(Ordering::Relaxed)
    }

    /// Would a single entry of `weight` ever fit?
    pub fn admits(&self, weight: usize) -> bool {
        weight <= self.max_bytes
    }

    pub fn over(&self) -> bool {
        self.bytes() > self.max_bytes || self.entries() > self.max_entries
    }

    /// Account a newly inserted entry.
    pub fn charge(&self, weight: usize) {
        self.bytes.fetch_add(weight, Ordering::AcqRel);
        self.entries.fetch_add(1, Ordering::AcqRel);
    }

    /// Swap the weight of a replaced entry without changing the count.
    pub fn replace(&self, old: usize, new: usize) {
        self.bytes.fetch_add(new, Ordering::AcqRel);
        self.release_bytes(old);
    }

    /// Account a removed entry.
    pub fn release(&self, weight: usize) {
        self.release_bytes(weight);
        let _ = self
            .entries
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }

    fn release_bytes(&self, weight: usize) {
        let _ = self
            .bytes
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| Some(n.saturating_sub(weight)));
    }
}

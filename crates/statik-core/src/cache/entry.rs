//! Immutable cache entries.

use std::sync::Arc;
use std::time::Instant;

use crate::content::Descriptor;

/// Fixed accounting for an entry's metadata; all a negative or mapped entry
/// costs.
pub const ENTRY_OVERHEAD: usize = 256;

/// One cached outcome. Never edited; re-validation installs a new entry.
#[derive(Debug)]
pub struct CacheEntry {
    /// `None` records a confirmed miss.
    pub descriptor: Option<Arc<Descriptor>>,
    pub validated_at: Instant,
    /// Validation order; smaller means validated longer ago.
    pub seq: u64,
    pub weight: usize,
}

impl CacheEntry {
    pub fn new(descriptor: Option<Arc<Descriptor>>, validated_at: Instant, seq: u64) -> Self {
        let weight = weigh(descriptor.as_deref());
        Self {
            descriptor,
            validated_at,
            seq,
            weight,
        }
    }

    /// Same outcome, validated again at `now`.
    pub fn restamped(&self, now: Instant, seq: u64) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            validated_at: now,
            seq,
            weight: self.weight,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.descriptor.is_none()
    }
}

/// Budget weight: metadata overhead plus content length, except for mapped
/// content which is served from the page cache.
pub fn weigh(descriptor: Option<&Descriptor>) -> usize {
    let Some(d) = descriptor else {
        return ENTRY_OVERHEAD;
    };
    let own = if d.is_mapped() { 0 } else { d.len() as usize };
    let variants: usize = d
        .variants()
        .iter()
        .map(|(_, v)| ENTRY_OVERHEAD + if v.is_mapped() { 0 } else { v.len() as usize })
        .sum();
    ENTRY_OVERHEAD.saturating_add(own).saturating_add(variants)
}

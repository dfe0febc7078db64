//! Cache entry, statistics and invalidation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::key::Dependencies;
use crate::clock::elapsed;

/// A cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The cached data.
    pub data: V,
    /// When the entry was stored.
    pub timestamp: DateTime<Utc>,
    /// Tags this entry depends on.
    pub dependencies: Dependencies,
    /// Number of hits served from this entry.
    pub access_count: u64,
    /// When the entry was last stored or hit.
    pub last_accessed: DateTime<Utc>,
    /// Lifetime measured from `timestamp`.
    pub ttl: Duration,
    /// Monotonic recency counter; breaks ties between equal `last_accessed`.
    pub(crate) access_tick: u64,
}

impl<V> CacheEntry<V> {
    /// Expired once `now - timestamp >= ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        elapsed(self.timestamp, now) >= self.ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Live entries, including ones not yet swept.
    pub entries: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room.
    pub evictions: u64,
    /// Entries removed because their TTL ran out.
    pub expirations: u64,
    /// Entries removed by explicit or dependency invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Hits over lookups, 0.0 when nothing was looked up.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Something that can drop entries by dependency tag.
///
/// The engine notifies every registered sink after a write so caches layered
/// above the store stay coherent without knowing which keys exist.
pub trait InvalidationSink: Send + Sync {
    /// Remove every entry depending on `tag`; returns how many were removed.
    fn invalidate_tag(&self, tag: &str) -> usize;

    /// Remove everything.
    fn invalidate_all(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.hits = 3;
        stats.misses = 1;
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}

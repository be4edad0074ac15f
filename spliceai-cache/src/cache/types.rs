//! Core type definitions for the cache system

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache key type - canonical string identity of a (variant, context, parameters) tuple
pub type CacheKey = String;

/// Cached value type - one annotation string per alternate allele, possibly empty
pub type CachedResult = Vec<String>;

/// Statistics and metrics for cache performance monitoring
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the store
    pub hits: u64,

    /// Lookups that fell through to computation
    pub misses: u64,

    /// Number of times the compute callback ran
    pub computes: u64,

    /// Store reads that failed and were treated as misses
    pub read_fallbacks: u64,

    /// Store writes that failed after a computation
    pub write_failures: u64,

    /// Stored values that could not be decoded
    pub decode_failures: u64,

    /// Keys removed through invalidation
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate cache hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Calculate miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }

    /// Total number of lookups
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Counter-wise difference against an earlier snapshot
    pub fn since(&self, earlier: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits.saturating_sub(earlier.hits),
            misses: self.misses.saturating_sub(earlier.misses),
            computes: self.computes.saturating_sub(earlier.computes),
            read_fallbacks: self.read_fallbacks.saturating_sub(earlier.read_fallbacks),
            write_failures: self.write_failures.saturating_sub(earlier.write_failures),
            decode_failures: self.decode_failures.saturating_sub(earlier.decode_failures),
            invalidations: self.invalidations.saturating_sub(earlier.invalidations),
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ hits: {}, misses: {}, hit_rate: {:.2}%, computes: {}, read_fallbacks: {}, write_failures: {}, decode_failures: {} }}",
            self.hits,
            self.misses,
            self.hit_rate(),
            self.computes,
            self.read_fallbacks,
            self.write_failures,
            self.decode_failures
        )
    }
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub computes: AtomicU64,
    pub read_fallbacks: AtomicU64,
    pub write_failures: AtomicU64,
    pub decode_failures: AtomicU64,
    pub invalidations: AtomicU64,
}

impl StatsCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            read_fallbacks: self.read_fallbacks.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };

        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
        assert_eq!(stats.lookups(), 100);
    }

    #[test]
    fn test_cache_stats_zero_requests() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_cache_stats_since() {
        let earlier = CacheStats {
            hits: 3,
            misses: 2,
            computes: 2,
            ..Default::default()
        };
        let later = CacheStats {
            hits: 10,
            misses: 4,
            computes: 4,
            write_failures: 1,
            ..Default::default()
        };

        let delta = later.since(&earlier);
        assert_eq!(delta.hits, 7);
        assert_eq!(delta.misses, 2);
        assert_eq!(delta.computes, 2);
        assert_eq!(delta.write_failures, 1);
    }

    #[test]
    fn test_cache_stats_display() {
        let stats = CacheStats {
            hits: 100,
            misses: 50,
            computes: 50,
            ..Default::default()
        };

        let display = format!("{}", stats);
        assert!(display.contains("hits: 100"));
        assert!(display.contains("misses: 50"));
        assert!(display.contains("hit_rate: 66.67%"));
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = StatsCounters::default();
        StatsCounters::incr(&counters.hits);
        StatsCounters::incr(&counters.hits);
        StatsCounters::add(&counters.invalidations, 5);

        let stats = counters.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.invalidations, 5);
        assert_eq!(stats.misses, 0);
    }
}

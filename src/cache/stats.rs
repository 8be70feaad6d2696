//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// == Cache Stats ==
/// Tracks cache performance metrics for one shard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of entries removed by delete, TTL or limit enforcement
    pub evictions: u64,
    /// Sum of stored entry sizes in bytes
    pub size_bytes: usize,
    /// Current number of entries in the cache
    pub entry_count: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Returns `1 - hit_rate`.
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Folds another shard's counters into this one.
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.evictions += other.evictions;
        self.size_bytes += other.size_bytes;
        self.entry_count += other.entry_count;
    }
}

// == Stats Snapshot ==
/// Point-in-time view of a whole cache, including its configured limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub entry_count: usize,
    pub size_bytes: usize,
    pub size_mb: f64,
    pub max_size: usize,
    pub max_memory_mb: f64,
    pub compression_enabled: bool,
}

impl CacheStatsSnapshot {
    /// Builds a snapshot from merged counters and the cache limits.
    pub fn new(
        stats: &CacheStats,
        max_size: usize,
        max_memory_bytes: usize,
        compression_enabled: bool,
    ) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            hit_rate: stats.hit_rate(),
            miss_rate: stats.miss_rate(),
            entry_count: stats.entry_count,
            size_bytes: stats.size_bytes,
            size_mb: stats.size_bytes as f64 / BYTES_PER_MB,
            max_size,
            max_memory_mb: max_memory_bytes as f64 / BYTES_PER_MB,
            compression_enabled,
        }
    }
}

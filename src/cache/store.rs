//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, TTL
//! expiration, a memory budget and optional compression.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::cache::codec::{decode_value, encode_value};
use crate::cache::{system_clock, CacheEntry, CacheStats, CacheStatsSnapshot, Clock, LruTracker};
use crate::config::LruCacheConfig;

// == Shard ==
/// One independently locked partition of the key space.
#[derive(Debug)]
struct Shard<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// When limits were last enforced by the periodic pass
    last_maintenance: f64,
}

/// Limits applied to a single shard.
#[derive(Debug, Clone, Copy)]
struct ShardLimits {
    max_size: usize,
    max_memory_bytes: usize,
    maintenance_interval: f64,
}

impl<V> Shard<V> {
    fn new(now: f64) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            last_maintenance: now,
        }
    }

    /// Removes an entry and keeps the size and count gauges in sync.
    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.stats.size_bytes = self.stats.size_bytes.saturating_sub(entry.size_bytes);
        self.stats.entry_count = self.entries.len();
        Some(entry)
    }

    fn evict(&mut self, key: &str) -> bool {
        let removed = self.remove(key).is_some();
        if removed {
            self.stats.record_eviction();
        }
        removed
    }

    fn evict_oldest(&mut self) -> bool {
        let Some(key) = self.lru.evict_oldest() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.stats.size_bytes = self.stats.size_bytes.saturating_sub(entry.size_bytes);
        }
        self.stats.entry_count = self.entries.len();
        self.stats.record_eviction();
        true
    }

    fn insert(&mut self, key: String, entry: CacheEntry<V>) {
        if let Some(old) = self.entries.remove(&key) {
            self.stats.size_bytes = self.stats.size_bytes.saturating_sub(old.size_bytes);
        }
        self.stats.size_bytes += entry.size_bytes;
        self.lru.touch(&key);
        self.entries.insert(key, entry);
        self.stats.entry_count = self.entries.len();
    }

    /// Removes every expired entry, returning how many were dropped.
    fn sweep_expired(&mut self, now: f64) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.evict(key);
        }
        expired.len()
    }

    // == Enforce Limits ==
    /// Expired sweep, then entry-count eviction, then memory eviction.
    fn enforce_limits(&mut self, now: f64, limits: ShardLimits) {
        self.sweep_expired(now);

        while self.entries.len() > limits.max_size {
            if !self.evict_oldest() {
                break;
            }
        }

        while self.stats.size_bytes > limits.max_memory_bytes {
            if !self.evict_oldest() {
                break;
            }
        }

        self.stats.entry_count = self.entries.len();
    }

    fn maybe_maintenance(&mut self, now: f64, limits: ShardLimits) {
        if now - self.last_maintenance > limits.maintenance_interval {
            self.enforce_limits(now, limits);
            self.last_maintenance = now;
        }
    }
}

// == LRU Cache ==
/// Bounded, thread-safe key-value cache with LRU eviction and TTL support.
///
/// Keys are strings; values are any serde type. Each shard is guarded by its
/// own mutex and every public operation holds that lock for its whole
/// duration, so operations on one shard are linearizable. With the default
/// single shard the LRU order is global.
pub struct LruCache<V> {
    shards: Box<[Mutex<Shard<V>>]>,
    config: LruCacheConfig,
    limits: ShardLimits,
    clock: Arc<dyn Clock>,
}

impl<V> std::fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("config", &self.config)
            .field("shards", &self.shards.len())
            .finish()
    }
}

impl<V> LruCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    // == Constructor ==
    /// Creates a cache using the wall clock.
    pub fn new(config: LruCacheConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Creates a cache reading time from `clock`.
    pub fn with_clock(config: LruCacheConfig, clock: Arc<dyn Clock>) -> Self {
        let shard_count = config.shards.max(1);
        let limits = ShardLimits {
            max_size: config.max_size.div_ceil(shard_count),
            max_memory_bytes: config.max_memory_bytes() / shard_count,
            maintenance_interval: config.maintenance_interval.as_secs_f64(),
        };
        let now = clock.now();
        let shards = (0..shard_count)
            .map(|_| Mutex::new(Shard::new(now)))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            shards,
            config,
            limits,
            clock,
        }
    }

    fn shard_for(&self, key: &str) -> &Mutex<Shard<V>> {
        if self.shards.len() == 1 {
            return &self.shards[0];
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Missing keys count as misses. Expired entries are removed and count as
    /// both a miss and an eviction. A hit moves the key to the most recently
    /// used position and bumps its access count.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut shard = self.shard_for(key).lock();

        let expired = match shard.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => {
                shard.stats.record_miss();
                return None;
            }
        };

        if expired {
            shard.evict(key);
            shard.stats.record_miss();
            debug!("Cache entry expired: {}", key);
            return None;
        }

        shard.lru.touch(key);
        shard.stats.record_hit();
        let entry = shard.entries.get_mut(key)?;
        entry.access_count += 1;
        decode_value(&entry.value)
    }

    // == Put ==
    /// Stores a value, replacing any previous entry for the key.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (falls back to the configured default TTL)
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.put_tagged(key, value, ttl, None);
    }

    /// Like [`put`](Self::put), attaching a tag usable by
    /// [`invalidate_matching`](Self::invalidate_matching).
    pub fn put_tagged(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Option<Duration>,
        tag: Option<String>,
    ) {
        let key = key.into();
        let (stored, size_bytes) = encode_value(
            value,
            self.config.enable_compression,
            self.config.compression_threshold_bytes,
        );
        // A zero TTL falls back to the default, like an absent one
        let ttl_seconds = ttl
            .filter(|ttl| !ttl.is_zero())
            .or(self.config.default_ttl)
            .map(|ttl| ttl.as_secs_f64());
        let now = self.clock.now();
        let entry = CacheEntry::new(stored, size_bytes, now, ttl_seconds).with_tag(tag);

        let mut shard = self.shard_for(&key).lock();
        shard.insert(key, entry);
        shard.enforce_limits(now, self.limits);
        shard.maybe_maintenance(now, self.limits);
    }

    // == Delete ==
    /// Removes an entry by key, returning whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.shard_for(key).lock().evict(key)
    }

    // == Clear ==
    /// Drops every entry and resets statistics.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            shard.entries.clear();
            shard.lru.clear();
            shard.stats = CacheStats::new();
        }
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        self.shards
            .iter()
            .map(|shard| shard.lock().sweep_expired(now))
            .sum()
    }

    /// Removes every entry for which `matches(key, tag)` is true.
    ///
    /// Each removal counts as an eviction. Returns the number removed.
    pub fn invalidate_matching<F>(&self, mut matches: F) -> usize
    where
        F: FnMut(&str, Option<&str>) -> bool,
    {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let doomed: Vec<String> = shard
                .entries
                .iter()
                .filter(|(key, entry)| matches(key, entry.tag.as_deref()))
                .map(|(key, _)| key.clone())
                .collect();
            for key in doomed {
                if shard.evict(&key) {
                    removed += 1;
                }
            }
        }
        removed
    }

    // == Stats ==
    /// Returns a snapshot of counters, gauges and limits.
    pub fn get_stats(&self) -> CacheStatsSnapshot {
        let mut merged = CacheStats::new();
        for shard in self.shards.iter() {
            merged.merge(&shard.lock().stats);
        }
        CacheStatsSnapshot::new(
            &merged,
            self.config.max_size,
            self.config.max_memory_bytes(),
            self.config.enable_compression,
        )
    }

    /// Returns up to `limit` keys ordered by descending access count.
    pub fn get_top_accessed_keys(&self, limit: usize) -> Vec<(String, u64)> {
        let mut counts: Vec<(String, u64)> = self
            .shards
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .entries
                    .iter()
                    .map(|(key, entry)| (key.clone(), entry.access_count))
                    .collect::<Vec<_>>()
            })
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(limit);
        counts
    }

    /// True when the key is present and unexpired. Does not touch LRU order
    /// or statistics.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.shard_for(key)
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Snapshot of the stored keys, least recently used first within each shard.
    pub fn keys(&self) -> Vec<String> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .lock()
                    .lru
                    .iter_oldest_first()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &LruCacheConfig {
        &self.config
    }

    pub fn max_memory_bytes(&self) -> usize {
        self.config.max_memory_bytes()
    }

    /// Number of lock shards.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use std::thread;

    const MB: f64 = 1024.0 * 1024.0;

    fn manual_cache(config: LruCacheConfig) -> (LruCache<String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (LruCache::with_clock(config, clock.clone()), clock)
    }

    fn plain_config(max_size: usize) -> LruCacheConfig {
        LruCacheConfig::new(max_size, 100.0).with_compression(false)
    }

    #[test]
    fn test_store_new() {
        let cache: LruCache<String> = LruCache::new(LruCacheConfig::default());
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.shard_count(), 1);
    }

    #[test]
    fn test_store_put_and_get() {
        let (cache, _) = manual_cache(plain_config(100));

        cache.put("key1", "value1".to_string(), None);

        assert_eq!(cache.get("key1"), Some("value1".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let (cache, _) = manual_cache(plain_config(100));

        assert_eq!(cache.get("nonexistent"), None);
        assert_eq!(cache.get_stats().misses, 1);
    }

    #[test]
    fn test_store_delete() {
        let (cache, _) = manual_cache(plain_config(100));

        cache.put("key1", "value1".to_string(), None);
        assert!(cache.delete("key1"));
        assert!(!cache.delete("key1"));

        let stats = cache.get_stats();
        assert!(cache.is_empty());
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.size_bytes, 0);
    }

    #[test]
    fn test_store_overwrite_replaces_size() {
        let (cache, _) = manual_cache(plain_config(100));

        cache.put("key1", "v".to_string(), None);
        cache.put("key1", "a much longer value".to_string(), None);

        assert_eq!(cache.get("key1"), Some("a much longer value".to_string()));
        let stats = cache.get_stats();
        assert_eq!(stats.entry_count, 1);
        // serde_json quoting adds two bytes
        assert_eq!(stats.size_bytes, "a much longer value".len() + 2);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let (cache, clock) = manual_cache(plain_config(100));

        cache.put("k", "v".to_string(), Some(Duration::from_secs(1)));
        assert_eq!(cache.get("k"), Some("v".to_string()));

        let before = cache.get_stats();
        clock.advance(Duration::from_millis(1100));

        assert_eq!(cache.get("k"), None);
        let after = cache.get_stats();
        assert_eq!(after.misses, before.misses + 1);
        assert_eq!(after.evictions, before.evictions + 1);
        assert_eq!(after.entry_count, 0);
    }

    #[test]
    fn test_store_default_ttl_applies() {
        let config = plain_config(100).with_default_ttl(Some(Duration::from_secs(10)));
        let (cache, clock) = manual_cache(config);

        cache.put("default", "v".to_string(), None);
        cache.put("explicit", "v".to_string(), Some(Duration::from_secs(60)));
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.get("default"), None);
        assert_eq!(cache.get("explicit"), Some("v".to_string()));
    }

    #[test]
    fn test_store_zero_ttl_uses_default() {
        let config = plain_config(100).with_default_ttl(Some(Duration::from_secs(10)));
        let (cache, clock) = manual_cache(config);

        cache.put("k", "v".to_string(), Some(Duration::ZERO));
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("k"), Some("v".to_string()));

        clock.advance(Duration::from_secs(6));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_store_zero_ttl_without_default_never_expires() {
        let (cache, clock) = manual_cache(plain_config(100));

        cache.put("k", "v".to_string(), Some(Duration::ZERO));
        clock.advance(Duration::from_secs(3600));

        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    /// Deserializable, but refuses to serialize.
    #[derive(Debug, Clone, PartialEq, serde::Deserialize)]
    struct Opaque(u32);

    impl Serialize for Opaque {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("opaque values cannot be serialized"))
        }
    }

    #[test]
    fn test_store_keeps_value_that_fails_to_serialize() {
        let cache: LruCache<Opaque> = LruCache::new(LruCacheConfig::default());

        cache.put("k", Opaque(7), None);

        assert_eq!(cache.get("k"), Some(Opaque(7)));
        assert_eq!(cache.get_stats().size_bytes, std::mem::size_of::<Opaque>());
    }

    #[test]
    fn test_store_lru_eviction() {
        let (cache, _) = manual_cache(plain_config(2));

        cache.put("a", "1".to_string(), None);
        cache.put("b", "2".to_string(), None);
        cache.put("c", "3".to_string(), None);

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains_key("a"));
        assert!(cache.contains_key("b"));
        assert!(cache.contains_key("c"));
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_touch_on_get() {
        let (cache, _) = manual_cache(plain_config(3));

        cache.put("key1", "value1".to_string(), None);
        cache.put("key2", "value2".to_string(), None);
        cache.put("key3", "value3".to_string(), None);

        cache.get("key1");
        cache.put("key4", "value4".to_string(), None);

        assert!(cache.contains_key("key1"));
        assert!(!cache.contains_key("key2"));
        assert_eq!(cache.keys(), vec!["key3", "key1", "key4"]);
    }

    #[test]
    fn test_store_memory_eviction() {
        // 100 x's serialize to 102 bytes; budget fits three
        let config = LruCacheConfig::new(100, 350.0 / MB).with_compression(false);
        let (cache, _) = manual_cache(config);

        for i in 0..5 {
            cache.put(format!("k{}", i), "x".repeat(100), None);
        }

        let stats = cache.get_stats();
        assert_eq!(stats.entry_count, 3);
        assert_eq!(stats.size_bytes, 306);
        assert!(stats.size_bytes <= cache.max_memory_bytes());
        assert!(!cache.contains_key("k0"));
        assert!(!cache.contains_key("k1"));
        assert!(cache.contains_key("k4"));
    }

    #[test]
    fn test_store_oversized_value_is_not_kept() {
        let config = LruCacheConfig::new(100, 50.0 / MB).with_compression(false);
        let (cache, _) = manual_cache(config);

        cache.put("big", "x".repeat(200), None);

        assert!(cache.is_empty());
        assert_eq!(cache.get_stats().size_bytes, 0);
    }

    #[test]
    fn test_store_compression_shrinks_stored_size() {
        let config = LruCacheConfig::new(10, 100.0).with_compression_threshold(256);
        let (cache, _) = manual_cache(config);

        let big = "template ".repeat(500);
        cache.put("big", big.clone(), None);

        let stats = cache.get_stats();
        assert!(stats.compression_enabled);
        assert!(stats.size_bytes < big.len());
        assert_eq!(cache.get("big"), Some(big));
    }

    #[test]
    fn test_store_stats() {
        let (cache, _) = manual_cache(plain_config(100));

        cache.put("key1", "value1".to_string(), None);
        cache.get("key1");
        cache.get("nonexistent");

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.max_size, 100);
        assert_eq!(stats.max_memory_mb, 100.0);
    }

    #[test]
    fn test_store_clear_resets_stats() {
        let (cache, _) = manual_cache(plain_config(100));

        cache.put("key1", "value1".to_string(), None);
        cache.get("key1");
        cache.clear();

        let stats = cache.get_stats();
        assert!(cache.is_empty());
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.size_bytes, 0);
        assert_eq!(cache.get("key1"), None);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let (cache, clock) = manual_cache(plain_config(100));

        cache.put("key1", "value1".to_string(), Some(Duration::from_secs(1)));
        cache.put("key2", "value2".to_string(), Some(Duration::from_secs(10)));
        clock.advance(Duration::from_secs(2));

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("key2"));
    }

    #[test]
    fn test_store_put_sweeps_expired_entries() {
        let (cache, clock) = manual_cache(plain_config(100));

        cache.put("old", "v".to_string(), Some(Duration::from_secs(1)));
        clock.advance(Duration::from_secs(5));
        cache.put("new", "v".to_string(), None);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_stats().evictions, 1);
    }

    #[test]
    fn test_store_top_accessed_keys() {
        let (cache, _) = manual_cache(plain_config(100));

        cache.put("a", "1".to_string(), None);
        cache.put("b", "2".to_string(), None);
        cache.put("c", "3".to_string(), None);
        for _ in 0..3 {
            cache.get("b");
        }
        cache.get("c");

        let top = cache.get_top_accessed_keys(2);
        assert_eq!(top, vec![("b".to_string(), 3), ("c".to_string(), 1)]);
    }

    #[test]
    fn test_store_invalidate_matching_by_tag() {
        let (cache, _) = manual_cache(plain_config(100));

        cache.put_tagged("x1", "1".to_string(), None, Some("//a/b".to_string()));
        cache.put_tagged("x2", "2".to_string(), None, Some("//a/c".to_string()));
        cache.put("x3", "3".to_string(), None);

        let removed =
            cache.invalidate_matching(|_, tag| tag.is_some_and(|tag| tag.contains("//a/b")));

        assert_eq!(removed, 1);
        assert!(!cache.contains_key("x1"));
        assert!(cache.contains_key("x2"));
        assert!(cache.contains_key("x3"));
    }

    #[test]
    fn test_sharded_store_keeps_accounting() {
        let config = plain_config(400).with_shards(4);
        let (cache, _) = manual_cache(config);

        for i in 0..40 {
            cache.put(format!("key{}", i), format!("value{}", i), None);
        }
        for i in 0..40 {
            assert_eq!(cache.get(&format!("key{}", i)), Some(format!("value{}", i)));
        }

        let stats = cache.get_stats();
        assert_eq!(cache.shard_count(), 4);
        assert_eq!(stats.entry_count, cache.len());
        assert_eq!(stats.hits, 40);
        assert_eq!(cache.keys().len(), 40);
    }

    #[test]
    fn test_store_concurrent_access() {
        let cache: Arc<LruCache<u64>> =
            Arc::new(LruCache::new(LruCacheConfig::new(10_000, 100.0).with_shards(8)));

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..200u64 {
                        let key = format!("t{}-{}", t, i);
                        cache.put(key.clone(), t * 1000 + i, None);
                        assert_eq!(cache.get(&key), Some(t * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.get_stats();
        assert_eq!(stats.entry_count, 1600);
        assert_eq!(stats.hits, 1600);
        assert_eq!(stats.misses, 0);
    }
}

//! Operation Result Cache
//!
//! Memoizes the result of applying a patch operation to a target with a given
//! value against a given document state.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheStatsSnapshot, LruCache};
use crate::config::LruCacheConfig;
use crate::hashing::{hash_value, short_hash};

#[derive(Debug)]
pub struct OperationResultCache {
    cache: LruCache<Value>,
}

impl OperationResultCache {
    /// 1000 entries, 100 MB, 10 minute TTL.
    pub fn default_config() -> LruCacheConfig {
        LruCacheConfig::new(1000, 100.0).with_default_ttl(Some(Duration::from_secs(600)))
    }

    pub fn new(config: LruCacheConfig) -> Self {
        Self::with_cache(LruCache::new(config))
    }

    pub fn with_cache(cache: LruCache<Value>) -> Self {
        Self { cache }
    }

    /// `operation:target-hash:value-hash:document-hash`
    pub fn operation_key(operation: &str, target: &str, value: &Value, document_hash: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            operation,
            short_hash(target),
            hash_value(value),
            document_hash
        )
    }

    pub fn cache_operation_result(
        &self,
        operation: &str,
        target: &str,
        value: &Value,
        document_hash: &str,
        result: Value,
    ) {
        let key = Self::operation_key(operation, target, value, document_hash);
        self.cache
            .put_tagged(key, result, None, Some(target.to_string()));
    }

    pub fn get_cached_operation_result(
        &self,
        operation: &str,
        target: &str,
        value: &Value,
        document_hash: &str,
    ) -> Option<Value> {
        let key = Self::operation_key(operation, target, value, document_hash);
        self.cache.get(&key)
    }

    // == Invalidate Target Pattern ==
    /// Removes every entry whose key or target contains `pattern`.
    ///
    /// Linear scan over all entries. Returns how many were removed.
    pub fn invalidate_target_pattern(&self, pattern: &str) -> usize {
        let removed = self.cache.invalidate_matching(|key, target| {
            key.contains(pattern) || target.is_some_and(|target| target.contains(pattern))
        });
        debug!("Invalidated {} operation results matching '{}'", removed, pattern);
        removed
    }

    pub fn get_stats(&self) -> CacheStatsSnapshot {
        self.cache.get_stats()
    }

    pub fn inner(&self) -> &LruCache<Value> {
        &self.cache
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl Default for OperationResultCache {
    fn default() -> Self {
        Self::new(Self::default_config())
    }
}

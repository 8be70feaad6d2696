//! Cache Manager
//!
//! Owns the XPath, namespace and operation-result caches plus the optional
//! persistent cache, and splits one memory budget across the in-memory ones.
//!
//! Construct a `CacheManager` at the application's composition root and pass
//! it (or an `Arc` of it) to the code that needs caching.
//! [`global_cache_manager`] exists for callers that cannot be wired that way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::{system_clock, CacheStatsSnapshot, Clock, LruCache};
use crate::caches::{NamespaceCache, OperationResultCache, XPathCache, XPathCacheStats};
use crate::config::{LruCacheConfig, ManagerConfig};
use crate::error::Result;
use crate::persistent::{PersistentCache, PersistentCacheStats};
use crate::query::{CompiledXPath, PathCompiler};
use crate::tasks::MaintenanceExecutor;
use crate::xml::{Namespaces, XmlElement};

/// File name of the SQLite database inside the cache directory.
pub const PERSISTENT_CACHE_FILE: &str = "stylestack_cache.db";

/// Size budget of the persistent cache, in megabytes.
pub const PERSISTENT_CACHE_MAX_MB: f64 = 1000.0;

/// TTL used by [`CacheManager::cache_expensive_computation`].
pub const DEFAULT_COMPUTATION_TTL: Duration = Duration::from_secs(3600);

const EXECUTOR_THREAD_NAME: &str = "stylestack-cache-maintenance";

/// Stats of every cache the manager owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComprehensiveStats {
    pub xpath_cache: XPathCacheStats,
    pub namespace_cache: CacheStatsSnapshot,
    pub operation_cache: CacheStatsSnapshot,
    pub total_memory_limit_mb: f64,
    pub persistent_cache_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_cache: Option<PersistentCacheStats>,
}

/// Entries removed by one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub memory_expired_removed: usize,
    pub persistent_expired_removed: usize,
}

impl MaintenanceReport {
    pub fn total_removed(&self) -> usize {
        self.memory_expired_removed + self.persistent_expired_removed
    }
}

// == Cache Manager ==
#[derive(Debug)]
pub struct CacheManager {
    config: ManagerConfig,
    xpath_cache: XPathCache,
    namespace_cache: NamespaceCache,
    operation_cache: OperationResultCache,
    persistent_cache: Option<PersistentCache>,
    executor: MaintenanceExecutor,
    closed: AtomicBool,
}

impl CacheManager {
    // == Constructor ==
    /// Builds every cache from `config`.
    ///
    /// The memory budget is split 1:1:2 between the XPath, namespace and
    /// operation-result caches. Fails on an invalid budget, when the cache
    /// directory or database cannot be created, or when the maintenance
    /// thread cannot be started.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Same as [`new`](Self::new), with every cache reading time from `clock`.
    pub fn with_clock(config: ManagerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let quarter_mb = config.total_memory_limit_mb / 4.0;
        let partitioned = |base: LruCacheConfig, mb: f64| LruCacheConfig {
            max_memory_mb: mb,
            maintenance_interval: config.maintenance_interval,
            ..base
        };

        let xpath_cache = XPathCache::with_cache(
            LruCache::with_clock(
                partitioned(XPathCache::default_config(), quarter_mb),
                Arc::clone(&clock),
            ),
            Box::new(PathCompiler),
        );
        let namespace_cache = NamespaceCache::with_cache(LruCache::with_clock(
            partitioned(NamespaceCache::default_config(), quarter_mb),
            Arc::clone(&clock),
        ));
        let operation_cache = OperationResultCache::with_cache(LruCache::with_clock(
            partitioned(OperationResultCache::default_config(), quarter_mb * 2.0),
            Arc::clone(&clock),
        ));

        let persistent_cache = if config.enable_persistent_cache {
            Some(PersistentCache::with_clock(
                config.cache_directory.join(PERSISTENT_CACHE_FILE),
                PERSISTENT_CACHE_MAX_MB,
                clock,
            )?)
        } else {
            None
        };

        let executor = MaintenanceExecutor::new(EXECUTOR_THREAD_NAME)?;

        info!(
            "Cache manager initialized: {} MB memory budget, persistent cache {}",
            config.total_memory_limit_mb,
            if persistent_cache.is_some() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            config,
            xpath_cache,
            namespace_cache,
            operation_cache,
            persistent_cache,
            executor,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn xpath_cache(&self) -> &XPathCache {
        &self.xpath_cache
    }

    pub fn namespace_cache(&self) -> &NamespaceCache {
        &self.namespace_cache
    }

    pub fn operation_cache(&self) -> &OperationResultCache {
        &self.operation_cache
    }

    pub fn persistent_cache(&self) -> Option<&PersistentCache> {
        self.persistent_cache.as_ref()
    }

    // == XPath ==
    pub fn get_compiled_xpath(
        &self,
        expression: &str,
        namespaces: Option<&Namespaces>,
    ) -> Option<Arc<CompiledXPath>> {
        self.xpath_cache.get_compiled_xpath(expression, namespaces)
    }

    // == Namespaces ==
    pub fn get_document_namespaces(&self, document_hash: &str) -> Option<Arc<Namespaces>> {
        self.namespace_cache.get_document_namespaces(document_hash)
    }

    pub fn cache_document_namespaces(&self, document_hash: &str, namespaces: Namespaces) {
        self.namespace_cache
            .cache_document_namespaces(document_hash, namespaces);
    }

    pub fn extract_and_cache_namespaces<E: XmlElement + ?Sized>(
        &self,
        element: &E,
    ) -> Arc<Namespaces> {
        self.namespace_cache.extract_and_cache_namespaces(element)
    }

    // == Operation Results ==
    pub fn cache_operation_result(
        &self,
        operation: &str,
        target: &str,
        value: &Value,
        document_hash: &str,
        result: Value,
    ) {
        self.operation_cache
            .cache_operation_result(operation, target, value, document_hash, result);
    }

    pub fn get_cached_operation_result(
        &self,
        operation: &str,
        target: &str,
        value: &Value,
        document_hash: &str,
    ) -> Option<Value> {
        self.operation_cache
            .get_cached_operation_result(operation, target, value, document_hash)
    }

    pub fn invalidate_target_pattern(&self, pattern: &str) -> usize {
        self.operation_cache.invalidate_target_pattern(pattern)
    }

    // == Expensive Computations ==
    /// Stores `value` in the persistent cache for one hour.
    ///
    /// No-op when persistence is disabled.
    pub fn cache_expensive_computation<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        self.cache_expensive_computation_for(key, value, Some(DEFAULT_COMPUTATION_TTL));
    }

    /// Stores `value` in the persistent cache with an explicit TTL
    /// (`None` never expires).
    pub fn cache_expensive_computation_for<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        if let Some(persistent) = &self.persistent_cache {
            persistent.put(key, value, ttl);
        }
    }

    pub fn get_cached_computation<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.persistent_cache.as_ref()?.get(key)
    }

    // == Stats ==
    pub fn get_comprehensive_stats(&self) -> ComprehensiveStats {
        let persistent_cache = self.persistent_cache.as_ref().and_then(|persistent| {
            persistent
                .get_stats()
                .map_err(|e| warn!("Failed to read persistent cache stats: {}", e))
                .ok()
        });

        ComprehensiveStats {
            xpath_cache: self.xpath_cache.get_stats(),
            namespace_cache: self.namespace_cache.get_stats(),
            operation_cache: self.operation_cache.get_stats(),
            total_memory_limit_mb: self.config.total_memory_limit_mb,
            persistent_cache_enabled: self.persistent_cache.is_some(),
            persistent_cache,
        }
    }

    /// Clears the in-memory caches. The persistent cache is left alone.
    pub fn clear_all_caches(&self) {
        self.xpath_cache.clear();
        self.namespace_cache.clear();
        self.operation_cache.clear();
        info!("All in-memory caches cleared");
    }

    // == Maintenance ==
    /// Sweeps expired entries from every cache.
    pub fn perform_maintenance(&self) -> MaintenanceReport {
        let memory_expired_removed = self.xpath_cache.inner().cleanup_expired()
            + self.namespace_cache.inner().cleanup_expired()
            + self.operation_cache.inner().cleanup_expired();

        let persistent_expired_removed = match &self.persistent_cache {
            Some(persistent) => persistent.cleanup_expired().unwrap_or_else(|e| {
                warn!("Persistent cache cleanup failed: {}", e);
                0
            }),
            None => 0,
        };

        let report = MaintenanceReport {
            memory_expired_removed,
            persistent_expired_removed,
        };
        debug!("Maintenance pass finished: {:?}", report);
        report
    }

    /// Runs [`perform_maintenance`](Self::perform_maintenance) on the
    /// maintenance thread.
    pub fn schedule_maintenance(self: &Arc<Self>) -> Result<oneshot::Receiver<MaintenanceReport>> {
        let manager = Arc::clone(self);
        self.executor.submit(move || manager.perform_maintenance())
    }

    // == Close ==
    /// Runs a final maintenance pass and stops the maintenance thread,
    /// waiting for queued work. Later calls do nothing.
    ///
    /// Also runs on drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.perform_maintenance();
        self.executor.shutdown();
        debug!("Cache manager closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.close();
    }
}

static GLOBAL_CACHE_MANAGER: OnceLock<Arc<CacheManager>> = OnceLock::new();

// == Global Cache Manager ==
/// Process-wide manager built from [`ManagerConfig::from_env`] on first use.
///
/// Every call returns the same instance. It lives until process exit.
pub fn global_cache_manager() -> Result<Arc<CacheManager>> {
    if let Some(manager) = GLOBAL_CACHE_MANAGER.get() {
        return Ok(Arc::clone(manager));
    }

    let manager = Arc::new(CacheManager::new(ManagerConfig::from_env())?);
    Ok(Arc::clone(GLOBAL_CACHE_MANAGER.get_or_init(|| manager)))
}

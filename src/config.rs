//! Configuration Module
//!
//! Cache limits for the in-memory caches and the manager-level settings,
//! the latter loadable from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Settings for one in-memory [`LruCache`](crate::cache::LruCache).
#[derive(Debug, Clone, PartialEq)]
pub struct LruCacheConfig {
    /// Maximum number of entries
    pub max_size: usize,
    /// Memory budget in megabytes (fractions allowed)
    pub max_memory_mb: f64,
    /// TTL applied when `put` does not pass one
    pub default_ttl: Option<Duration>,
    /// Compress values whose serialized form reaches the threshold
    pub enable_compression: bool,
    /// Minimum serialized size in bytes before compression applies
    pub compression_threshold_bytes: usize,
    /// Minimum time between opportunistic maintenance passes
    pub maintenance_interval: Duration,
    /// Number of independently locked shards
    pub shards: usize,
}

impl LruCacheConfig {
    pub fn new(max_size: usize, max_memory_mb: f64) -> Self {
        Self {
            max_size,
            max_memory_mb,
            ..Self::default()
        }
    }

    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }

    pub fn with_compression_threshold(mut self, bytes: usize) -> Self {
        self.compression_threshold_bytes = bytes;
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Memory budget converted to bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb.max(0.0) * 1024.0 * 1024.0) as usize
    }
}

impl Default for LruCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_memory_mb: 100.0,
            default_ttl: None,
            enable_compression: true,
            compression_threshold_bytes: 1024,
            maintenance_interval: Duration::from_secs(60),
            shards: 1,
        }
    }
}

/// Settings for the [`CacheManager`](crate::CacheManager).
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Directory holding the persistent cache database
    pub cache_directory: PathBuf,
    /// Whether to open the SQLite-backed persistent cache
    pub enable_persistent_cache: bool,
    /// Memory budget shared by the in-memory caches, in megabytes
    pub total_memory_limit_mb: f64,
    /// Interval for the periodic maintenance task
    pub maintenance_interval: Duration,
}

impl ManagerConfig {
    /// Creates a new ManagerConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STYLESTACK_CACHE_DIR` - Cache directory (default: ~/.stylestack/cache)
    /// - `STYLESTACK_CACHE_MEMORY_MB` - Total memory budget (default: 500)
    /// - `STYLESTACK_PERSISTENT_CACHE` - `0`, `false`, `no` or `off` disables (default: on)
    /// - `STYLESTACK_MAINTENANCE_INTERVAL` - Maintenance interval in seconds (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_directory: env::var("STYLESTACK_CACHE_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_directory),
            enable_persistent_cache: env::var("STYLESTACK_PERSISTENT_CACHE")
                .ok()
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.enable_persistent_cache),
            total_memory_limit_mb: env::var("STYLESTACK_CACHE_MEMORY_MB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.total_memory_limit_mb),
            maintenance_interval: env::var("STYLESTACK_MAINTENANCE_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.maintenance_interval),
        }
    }

    /// Config rooted at `cache_directory`, other fields default.
    pub fn with_directory(cache_directory: impl Into<PathBuf>) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            ..Self::default()
        }
    }

    pub fn with_persistent_cache(mut self, enabled: bool) -> Self {
        self.enable_persistent_cache = enabled;
        self
    }

    pub fn with_memory_limit_mb(mut self, mb: f64) -> Self {
        self.total_memory_limit_mb = mb;
        self
    }

    /// Rejects budgets that cannot be split across the caches.
    pub fn validate(&self) -> Result<()> {
        if !self.total_memory_limit_mb.is_finite() || self.total_memory_limit_mb <= 0.0 {
            return Err(CacheError::Config(format!(
                "total_memory_limit_mb must be positive, got {}",
                self.total_memory_limit_mb
            )));
        }
        Ok(())
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_directory: default_cache_directory(),
            enable_persistent_cache: true,
            total_memory_limit_mb: 500.0,
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

/// `~/.stylestack/cache`, or a relative `.stylestack/cache` when no home
/// directory can be found.
pub fn default_cache_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".stylestack")
        .join("cache")
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

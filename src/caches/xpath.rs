//! XPath Cache
//!
//! Keeps compiled XPath expressions so identical expression/namespace pairs
//! are compiled once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::cache::{CacheStatsSnapshot, LruCache};
use crate::config::LruCacheConfig;
use crate::hashing::md5_hex;
use crate::query::{CompiledXPath, PathCompiler, XPathCompiler};
use crate::xml::Namespaces;

/// Outcome counters for compilations performed on cache misses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompilationStats {
    pub success: u64,
    pub errors: u64,
}

/// Stats block for the XPath cache: the cache counters plus compilation counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XPathCacheStats {
    #[serde(flatten)]
    pub cache: CacheStatsSnapshot,
    pub compilation_stats: CompilationStats,
}

pub struct XPathCache {
    cache: LruCache<Arc<CompiledXPath>>,
    compiler: Box<dyn XPathCompiler>,
    successes: AtomicU64,
    errors: AtomicU64,
}

impl std::fmt::Debug for XPathCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XPathCache")
            .field("cache", &self.cache)
            .field("compilation_stats", &self.get_compilation_stats())
            .finish()
    }
}

impl XPathCache {
    /// 500 entries, 50 MB, one hour TTL.
    ///
    /// Compression is off: a compressed entry is rebuilt on every hit, so
    /// callers would get a recompiled object instead of the cached one.
    pub fn default_config() -> LruCacheConfig {
        LruCacheConfig::new(500, 50.0)
            .with_default_ttl(Some(Duration::from_secs(3600)))
            .with_compression(false)
    }

    pub fn new(config: LruCacheConfig) -> Self {
        Self::with_cache(LruCache::new(config), Box::new(PathCompiler))
    }

    /// Wraps an existing cache and compiler.
    pub fn with_cache(
        cache: LruCache<Arc<CompiledXPath>>,
        compiler: Box<dyn XPathCompiler>,
    ) -> Self {
        Self {
            cache,
            compiler,
            successes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Cache key for an expression and its namespace bindings.
    pub fn cache_key(expression: &str, namespaces: &Namespaces) -> String {
        let bindings = serde_json::to_string(namespaces).unwrap_or_default();
        md5_hex(format!("{}{}", expression, bindings))
    }

    // == Get Compiled XPath ==
    /// Returns the compiled form of `expression`, compiling it on a miss.
    ///
    /// Compilation failures are counted and logged at debug level; they
    /// return None and are not cached.
    pub fn get_compiled_xpath(
        &self,
        expression: &str,
        namespaces: Option<&Namespaces>,
    ) -> Option<Arc<CompiledXPath>> {
        let empty = Namespaces::new();
        let namespaces = namespaces.unwrap_or(&empty);
        let key = Self::cache_key(expression, namespaces);

        if let Some(compiled) = self.cache.get(&key) {
            return Some(compiled);
        }

        match self.compiler.compile(expression, namespaces) {
            Ok(compiled) => {
                let compiled = Arc::new(compiled);
                self.cache.put(key, Arc::clone(&compiled), None);
                self.successes.fetch_add(1, Ordering::Relaxed);
                Some(compiled)
            }
            Err(e) => {
                debug!("XPath compilation failed for '{}': {}", expression, e);
                self.errors.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn get_compilation_stats(&self) -> CompilationStats {
        CompilationStats {
            success: self.successes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn get_stats(&self) -> XPathCacheStats {
        XPathCacheStats {
            cache: self.cache.get_stats(),
            compilation_stats: self.get_compilation_stats(),
        }
    }

    /// Underlying generic cache.
    pub fn inner(&self) -> &LruCache<Arc<CompiledXPath>> {
        &self.cache
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl Default for XPathCache {
    fn default() -> Self {
        Self::new(Self::default_config())
    }
}

//! StyleStack Cache - multi-level caching for OOXML template patching
//!
//! Bounded LRU/TTL memory caches for compiled XPath expressions, document
//! namespaces and operation results, plus a SQLite-backed persistent cache,
//! all coordinated by a [`CacheManager`].

pub mod cache;
pub mod caches;
pub mod config;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod manager;
pub mod persistent;
pub mod query;
pub mod tasks;
pub mod xml;

pub use cache::{CacheStatsSnapshot, Clock, LruCache, ManualClock, SystemClock};
pub use caches::{NamespaceCache, OperationResultCache, XPathCache, XPathCacheStats};
pub use config::{LruCacheConfig, ManagerConfig};
pub use error::{CacheError, Result};
pub use manager::{global_cache_manager, CacheManager, ComprehensiveStats, MaintenanceReport};
pub use persistent::{PersistentCache, PersistentCacheStats};
pub use query::{CompiledXPath, PathCompiler, XPathCompiler};
pub use tasks::{spawn_configured_maintenance_task, spawn_maintenance_task, MaintenanceExecutor};
pub use xml::{Namespaces, XmlDocument, XmlElement};

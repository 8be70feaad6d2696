//! Cache Module
//!
//! Provides the generic in-memory cache: LRU eviction, TTL expiration, a
//! memory budget and transparent compression of large values.

mod clock;
pub mod codec;
mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use entry::{CacheEntry, StoredValue};
pub use lru::LruTracker;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::LruCache;

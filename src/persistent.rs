//! Persistent Cache Module
//!
//! SQLite-backed key/value cache for results worth keeping across process
//! restarts. Each call opens its own connection; SQLite's file locking
//! serializes writers across threads and processes.
//!
//! Values are stored as serde_json bytes so the file stays readable from
//! any language.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::{system_clock, Clock};
use crate::error::Result;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS cache_entries (
        key TEXT PRIMARY KEY,
        value BLOB,
        timestamp REAL,
        access_count INTEGER DEFAULT 1,
        size_bytes INTEGER,
        ttl_seconds REAL
    );
    CREATE INDEX IF NOT EXISTS idx_cache_timestamp ON cache_entries(timestamp);
    CREATE INDEX IF NOT EXISTS idx_cache_access_count ON cache_entries(access_count);
";

/// Fraction of the budget kept after a size-limit eviction pass.
const EVICTION_TARGET_RATIO: f64 = 0.8;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Summary of the persistent store.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PersistentCacheStats {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub total_size_mb: f64,
    pub max_size_mb: f64,
    pub avg_access_count: f64,
    pub cache_file: PathBuf,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

// == Persistent Cache ==
#[derive(Debug, Clone)]
pub struct PersistentCache {
    cache_file: PathBuf,
    max_size_mb: f64,
    max_size_bytes: i64,
    clock: Arc<dyn Clock>,
}

impl PersistentCache {
    // == Constructor ==
    /// Opens (creating if needed) the database at `cache_file`.
    ///
    /// # Arguments
    /// * `cache_file` - Path of the SQLite file; parent directories are created
    /// * `max_size_mb` - Budget for the summed size of stored values
    pub fn new(cache_file: impl AsRef<Path>, max_size_mb: f64) -> Result<Self> {
        Self::with_clock(cache_file, max_size_mb, system_clock())
    }

    pub fn with_clock(
        cache_file: impl AsRef<Path>,
        max_size_mb: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let cache_file = cache_file.as_ref().to_path_buf();
        if let Some(parent) = cache_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let cache = Self {
            cache_file,
            max_size_mb,
            max_size_bytes: (max_size_mb.max(0.0) * 1024.0 * 1024.0) as i64,
            clock,
        };
        cache.connect()?.execute_batch(SCHEMA)?;

        info!(
            "Persistent cache ready at {} ({} MB budget)",
            cache.cache_file.display(),
            max_size_mb
        );
        Ok(cache)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.cache_file)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    // == Get ==
    /// Fetches and deserializes a value.
    ///
    /// Expired rows are deleted and read as absent. Database and decoding
    /// failures are logged and also read as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.read_row(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Persistent cache read failed for '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to deserialize persistent cache value '{}': {}", key, e);
                None
            }
        }
    }

    fn read_row(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.connect()?;
        let row: Option<(Vec<u8>, f64, Option<f64>)> = conn
            .query_row(
                "SELECT value, timestamp, ttl_seconds FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((value, timestamp, ttl_seconds)) = row else {
            return Ok(None);
        };

        if let Some(ttl) = ttl_seconds {
            if self.clock.now() - timestamp > ttl {
                conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                debug!("Persistent cache entry expired: {}", key);
                return Ok(None);
            }
        }

        conn.execute(
            "UPDATE cache_entries SET access_count = access_count + 1 WHERE key = ?1",
            params![key],
        )?;
        Ok(Some(value))
    }

    // == Put ==
    /// Stores a value, resetting its access count and timestamp.
    ///
    /// The write and the size-limit pass share one transaction. Failures are
    /// logged and never returned.
    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Err(e) = self.try_put(key, value, ttl) {
            error!("Persistent cache write failed for '{}': {}", key, e);
        }
    }

    fn try_put<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        let size_bytes = bytes.len() as i64;
        let ttl_seconds = ttl.map(|ttl| ttl.as_secs_f64());

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO cache_entries
                (key, value, timestamp, access_count, size_bytes, ttl_seconds)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            params![key, bytes, self.clock.now(), size_bytes, ttl_seconds],
        )?;
        enforce_size_limit(&tx, self.max_size_bytes)?;
        tx.commit()?;
        Ok(())
    }

    // == Delete ==
    /// Deletes a row, returning whether one existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let affected = self
            .connect()?
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    /// Deletes every row whose TTL has elapsed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let removed = self.connect()?.execute(
            "DELETE FROM cache_entries
             WHERE ttl_seconds IS NOT NULL AND timestamp + ttl_seconds < ?1",
            params![self.clock.now()],
        )?;
        if removed > 0 {
            info!("Persistent cache cleanup: removed {} expired entries", removed);
        }
        Ok(removed)
    }

    /// Deletes every row.
    pub fn clear(&self) -> Result<usize> {
        Ok(self.connect()?.execute("DELETE FROM cache_entries", [])?)
    }

    // == Stats ==
    pub fn get_stats(&self) -> Result<PersistentCacheStats> {
        let conn = self.connect()?;
        let (entry_count, total_size, avg_access, oldest, newest): (
            i64,
            i64,
            f64,
            Option<f64>,
            Option<f64>,
        ) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0), COALESCE(AVG(access_count), 0.0),
                    MIN(timestamp), MAX(timestamp)
             FROM cache_entries",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        Ok(PersistentCacheStats {
            entry_count: entry_count as usize,
            total_size_bytes: total_size as u64,
            total_size_mb: total_size as f64 / (1024.0 * 1024.0),
            max_size_mb: self.max_size_mb,
            avg_access_count: avg_access,
            cache_file: self.cache_file.clone(),
            oldest_entry: oldest.and_then(to_datetime),
            newest_entry: newest.and_then(to_datetime),
        })
    }
}

// == Enforce Size Limit ==
/// Evicts least-accessed, then oldest, rows until usage is at most 80% of
/// the budget. No-op while under budget. Returns the number of rows deleted.
fn enforce_size_limit(conn: &Connection, max_size_bytes: i64) -> Result<usize> {
    let current: i64 = conn.query_row(
        "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries",
        [],
        |row| row.get(0),
    )?;
    if current <= max_size_bytes {
        return Ok(0);
    }

    let target = (max_size_bytes as f64 * EVICTION_TARGET_RATIO) as i64;
    let candidates: Vec<(String, i64)> = {
        let mut stmt = conn.prepare(
            "SELECT key, size_bytes FROM cache_entries ORDER BY access_count ASC, timestamp ASC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut removed_size = 0;
    let mut removed = 0;
    for (key, size) in candidates {
        if current - removed_size <= target {
            break;
        }
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        removed_size += size;
        removed += 1;
    }

    debug!(
        "Persistent cache size limit: evicted {} rows ({} bytes)",
        removed, removed_size
    );
    Ok(removed)
}

fn to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde::Deserialize;
    use tempfile::TempDir;

    const MB: f64 = 1024.0 * 1024.0;

    fn open(budget_bytes: f64) -> (PersistentCache, Arc<ManualClock>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::default());
        let cache = PersistentCache::with_clock(
            dir.path().join("nested").join("cache.db"),
            budget_bytes / MB,
            clock.clone(),
        )
        .unwrap();
        (cache, clock, dir)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Theme {
        name: String,
        colors: Vec<String>,
    }

    #[test]
    fn test_creates_parent_directories() {
        let (cache, _, _dir) = open(MB);
        assert!(cache.cache_file().exists());
    }

    #[test]
    fn test_put_and_get_struct() {
        let (cache, _, _dir) = open(MB);
        let theme = Theme {
            name: "corporate".to_string(),
            colors: vec!["#003366".to_string(), "#FFFFFF".to_string()],
        };

        cache.put("theme", &theme, None);

        assert_eq!(cache.get::<Theme>("theme"), Some(theme));
        assert_eq!(cache.get::<Theme>("missing"), None);
    }

    #[test]
    fn test_get_increments_access_count() {
        let (cache, _, _dir) = open(MB);
        cache.put("k", &1u32, None);

        cache.get::<u32>("k");
        cache.get::<u32>("k");

        // 1 on insert + 2 reads
        assert_eq!(cache.get_stats().unwrap().avg_access_count, 3.0);
    }

    #[test]
    fn test_ttl_expiry_on_read() {
        let (cache, clock, _dir) = open(MB);
        cache.put("k", "v", Some(Duration::from_secs(10)));

        assert_eq!(cache.get::<String>("k"), Some("v".to_string()));
        clock.advance(Duration::from_secs(11));

        assert_eq!(cache.get::<String>("k"), None);
        assert_eq!(cache.get_stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_wrong_type_reads_as_absent() {
        let (cache, _, _dir) = open(MB);
        cache.put("k", "not a number", None);
        assert_eq!(cache.get::<u64>("k"), None);
    }

    #[test]
    fn test_delete() {
        let (cache, _, _dir) = open(MB);
        cache.put("k", &42, None);

        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
        assert_eq!(cache.get::<i32>("k"), None);
    }

    #[test]
    fn test_cleanup_expired() {
        let (cache, clock, _dir) = open(MB);
        cache.put("short", &1, Some(Duration::from_secs(5)));
        cache.put("long", &2, Some(Duration::from_secs(500)));
        cache.put("forever", &3, None);
        clock.advance(Duration::from_secs(60));

        assert_eq!(cache.cleanup_expired().unwrap(), 1);
        assert_eq!(cache.get_stats().unwrap().entry_count, 2);
    }

    #[test]
    fn test_size_limit_evicts_least_accessed_then_oldest() {
        // Each value serializes to 302 bytes
        let (cache, clock, _dir) = open(1000.0);
        let value = "x".repeat(300);

        for key in ["k0", "k1", "k2"] {
            cache.put(key, &value, None);
            clock.advance(Duration::from_secs(1));
        }
        cache.get::<String>("k0");
        cache.get::<String>("k0");

        cache.put("k3", &value, None);

        let stats = cache.get_stats().unwrap();
        assert!(stats.total_size_bytes <= 1000);
        assert_eq!(stats.entry_count, 2);
        assert!(cache.get::<String>("k0").is_some());
        assert!(cache.get::<String>("k3").is_some());
        assert!(cache.get::<String>("k1").is_none());
        assert!(cache.get::<String>("k2").is_none());
    }

    #[test]
    fn test_overwrite_resets_row() {
        let (cache, _, _dir) = open(MB);
        cache.put("k", "first", None);
        cache.get::<String>("k");
        cache.put("k", "second", None);

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.avg_access_count, 1.0);
        assert_eq!(cache.get::<String>("k"), Some("second".to_string()));
    }

    #[test]
    fn test_stats_and_clear() {
        let (cache, clock, _dir) = open(MB);
        cache.put("a", "1", None);
        clock.advance(Duration::from_secs(30));
        cache.put("b", "2", None);

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size_bytes, 6);
        assert_eq!(stats.max_size_mb, 1.0);
        let oldest = stats.oldest_entry.unwrap();
        let newest = stats.newest_entry.unwrap();
        assert_eq!((newest - oldest).num_seconds(), 30);

        assert_eq!(cache.clear().unwrap(), 2);
        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.entry_count, 0);
        assert!(stats.oldest_entry.is_none());
    }

    #[test]
    fn test_put_swallows_database_failure() {
        let (cache, _, _dir) = open(MB);
        Connection::open(cache.cache_file())
            .unwrap()
            .execute_batch("DROP TABLE cache_entries")
            .unwrap();

        cache.put("k", "v", None);

        assert_eq!(cache.get::<String>("k"), None);
        assert!(cache.get_stats().is_err());
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> std::result::Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not serializable"))
        }
    }

    #[test]
    fn test_put_swallows_serialization_failure() {
        let (cache, _, _dir) = open(MB);

        cache.put("k", &Unserializable, None);

        assert_eq!(cache.get::<String>("k"), None);
        assert_eq!(cache.get_stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        PersistentCache::new(&path, 10.0)
            .unwrap()
            .put("k", &vec![1, 2, 3], None);

        let reopened = PersistentCache::new(&path, 10.0).unwrap();
        assert_eq!(reopened.get::<Vec<i32>>("k"), Some(vec![1, 2, 3]));
    }
}

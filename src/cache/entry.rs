//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

// == Stored Value ==
/// The representation kept in the map for one entry.
///
/// Compressed payloads are tagged explicitly, so no legitimate value can be
/// mistaken for a compressed one.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue<V> {
    /// Value kept as-is
    Plain(V),
    /// zlib-compressed serde_json bytes of the value
    Compressed(Vec<u8>),
}

impl<V> StoredValue<V> {
    /// Returns true for the compressed representation.
    pub fn is_compressed(&self) -> bool {
        matches!(self, StoredValue::Compressed(_))
    }
}

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored (possibly compressed) value
    pub value: StoredValue<V>,
    /// Creation timestamp (Unix seconds)
    pub timestamp: f64,
    /// Number of successful reads
    pub access_count: u64,
    /// Size of the stored representation in bytes
    pub size_bytes: usize,
    /// Time to live in seconds, None = no expiration
    pub ttl_seconds: Option<f64>,
    /// Free-form label used for bulk invalidation
    pub tag: Option<String>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry.
    ///
    /// # Arguments
    /// * `value` - The stored representation
    /// * `size_bytes` - Size of that representation
    /// * `timestamp` - Creation time in Unix seconds
    /// * `ttl_seconds` - Optional TTL in seconds
    pub fn new(
        value: StoredValue<V>,
        size_bytes: usize,
        timestamp: f64,
        ttl_seconds: Option<f64>,
    ) -> Self {
        Self {
            value,
            timestamp,
            access_count: 0,
            size_bytes,
            ttl_seconds,
            tag: None,
        }
    }

    /// Attaches a tag to the entry.
    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    // == Is Expired ==
    /// Checks if the entry has expired at time `now`.
    ///
    /// An entry expires once its age is strictly greater than its TTL; at
    /// exactly `ttl_seconds` of age it is still live.
    pub fn is_expired(&self, now: f64) -> bool {
        match self.ttl_seconds {
            Some(ttl) => now - self.timestamp > ttl,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns remaining TTL in seconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0.0)` if the TTL has elapsed
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self, now: f64) -> Option<f64> {
        self.ttl_seconds
            .map(|ttl| (self.timestamp + ttl - now).max(0.0))
    }
}

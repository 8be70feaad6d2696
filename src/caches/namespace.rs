//! Namespace Cache
//!
//! Remembers the namespace prefix map of each document, keyed by a hash of
//! the document's leading bytes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStatsSnapshot, LruCache};
use crate::config::LruCacheConfig;
use crate::hashing::md5_hex;
use crate::xml::{Namespaces, XmlElement};

/// Bytes of serialized markup that feed the document hash.
pub const DOCUMENT_HASH_PREFIX_BYTES: usize = 1024;

/// Prefixes added whenever their URI shows up in a document.
pub const WELL_KNOWN_NAMESPACES: [(&str, &str); 5] = [
    ("p", "http://schemas.openxmlformats.org/presentationml/2006/main"),
    ("a", "http://schemas.openxmlformats.org/drawingml/2006/main"),
    ("r", "http://schemas.openxmlformats.org/officeDocument/2006/relationships"),
    ("w", "http://schemas.openxmlformats.org/wordprocessingml/2006/main"),
    ("sl", "http://schemas.openxmlformats.org/schemaLibrary/2006/main"),
];

/// Key used for the unprefixed namespace.
pub const DEFAULT_PREFIX_KEY: &str = "default";

#[derive(Debug)]
pub struct NamespaceCache {
    cache: LruCache<Arc<Namespaces>>,
    extractions: AtomicU64,
}

impl NamespaceCache {
    /// 200 entries, 20 MB, 30 minute TTL, uncompressed so hits share one map.
    pub fn default_config() -> LruCacheConfig {
        LruCacheConfig::new(200, 20.0)
            .with_default_ttl(Some(Duration::from_secs(1800)))
            .with_compression(false)
    }

    pub fn new(config: LruCacheConfig) -> Self {
        Self::with_cache(LruCache::new(config))
    }

    pub fn with_cache(cache: LruCache<Arc<Namespaces>>) -> Self {
        Self {
            cache,
            extractions: AtomicU64::new(0),
        }
    }

    pub fn get_document_namespaces(&self, document_hash: &str) -> Option<Arc<Namespaces>> {
        self.cache.get(document_hash)
    }

    pub fn cache_document_namespaces(&self, document_hash: &str, namespaces: Namespaces) {
        self.cache.put(document_hash, Arc::new(namespaces), None);
    }

    /// MD5 of the first [`DOCUMENT_HASH_PREFIX_BYTES`] of the serialized element.
    pub fn document_hash<E: XmlElement + ?Sized>(element: &E) -> String {
        let markup = element.to_xml_string();
        let bytes = markup.as_bytes();
        md5_hex(&bytes[..bytes.len().min(DOCUMENT_HASH_PREFIX_BYTES)])
    }

    // == Extract And Cache ==
    /// Returns the element's namespace map, deriving and caching it on a miss.
    ///
    /// The unprefixed namespace is stored under `"default"`. Well-known OOXML
    /// prefixes are filled in when their URI appears among the declarations
    /// or anywhere in the markup, unless the prefix is already bound.
    pub fn extract_and_cache_namespaces<E: XmlElement + ?Sized>(
        &self,
        element: &E,
    ) -> Arc<Namespaces> {
        let document_hash = Self::document_hash(element);
        if let Some(cached) = self.cache.get(&document_hash) {
            return cached;
        }

        let namespaces = Arc::new(derive_namespaces(element));
        self.extractions.fetch_add(1, Ordering::Relaxed);
        self.cache.put(document_hash, Arc::clone(&namespaces), None);
        namespaces
    }

    /// Number of namespace maps derived from documents (cache misses).
    pub fn extraction_count(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    pub fn get_stats(&self) -> CacheStatsSnapshot {
        self.cache.get_stats()
    }

    pub fn inner(&self) -> &LruCache<Arc<Namespaces>> {
        &self.cache
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl Default for NamespaceCache {
    fn default() -> Self {
        Self::new(Self::default_config())
    }
}

fn derive_namespaces<E: XmlElement + ?Sized>(element: &E) -> Namespaces {
    let mut namespaces: Namespaces = element
        .nsmap()
        .into_iter()
        .map(|(prefix, uri)| (prefix.unwrap_or_else(|| DEFAULT_PREFIX_KEY.to_string()), uri))
        .collect();

    let markup = element.to_xml_string();
    for (prefix, uri) in WELL_KNOWN_NAMESPACES {
        if namespaces.contains_key(prefix) {
            continue;
        }
        let declared = namespaces.values().any(|bound| bound == uri);
        if declared || markup.contains(uri) {
            namespaces.insert(prefix.to_string(), uri.to_string());
        }
    }
    namespaces
}

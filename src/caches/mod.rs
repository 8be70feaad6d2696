//! Purpose-specific caches.
//!
//! Each type owns an [`LruCache`](crate::cache::LruCache) and exposes domain
//! operations on top of it.

mod namespace;
mod operation;
mod xpath;

pub use namespace::{
    NamespaceCache, DEFAULT_PREFIX_KEY, DOCUMENT_HASH_PREFIX_BYTES, WELL_KNOWN_NAMESPACES,
};
pub use operation::OperationResultCache;
pub use xpath::{CompilationStats, XPathCache, XPathCacheStats};

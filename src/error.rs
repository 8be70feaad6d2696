//! Error types for the cache system
//!
//! Provides unified error handling using thiserror. Most cache paths are
//! best-effort and only log these; construction and administrative calls
//! propagate them.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache system.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem failure (cache directory creation and similar)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite failure in the persistent cache
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Value could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// zlib compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Query expression failed to compile
    #[error("Compile error: {0}")]
    Compile(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The background maintenance executor has been shut down
    #[error("Maintenance executor is closed")]
    ExecutorClosed,
}

// == Result Type Alias ==
/// Convenience Result type for the cache system.
pub type Result<T> = std::result::Result<T, CacheError>;

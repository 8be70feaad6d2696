//! Value Codec Module
//!
//! Serializes values with serde_json and compresses large payloads with zlib.
//! Failures never reach the caller: they are logged and the value is kept
//! uncompressed (on write) or treated as missing (on read).

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::cache::StoredValue;
use crate::error::{CacheError, Result};

/// zlib-compresses a byte slice.
pub fn compress_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CacheError::Compression(e.to_string()))
}

/// Inflates a zlib stream produced by [`compress_bytes`].
pub fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    Ok(decompressed)
}

// == Encode ==
/// Turns a value into its stored representation and that representation's size.
///
/// # Arguments
/// * `value` - The value being cached
/// * `compression_enabled` - Whether large values may be compressed
/// * `threshold` - Minimum serialized length before compression applies
pub fn encode_value<V: Serialize>(
    value: V,
    compression_enabled: bool,
    threshold: usize,
) -> (StoredValue<V>, usize) {
    let serialized = match serde_json::to_vec(&value) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to serialize cache value, using size estimate: {}", e);
            return (StoredValue::Plain(value), std::mem::size_of::<V>());
        }
    };

    if !compression_enabled || serialized.len() < threshold {
        return (StoredValue::Plain(value), serialized.len());
    }

    match compress_bytes(&serialized) {
        Ok(compressed) => {
            let size = compressed.len();
            (StoredValue::Compressed(compressed), size)
        }
        Err(e) => {
            warn!("Failed to compress cache value: {}", e);
            (StoredValue::Plain(value), serialized.len())
        }
    }
}

// == Decode ==
/// Recovers the value from its stored representation.
///
/// Returns None (after logging) when a compressed payload is corrupt.
pub fn decode_value<V: Clone + DeserializeOwned>(stored: &StoredValue<V>) -> Option<V> {
    match stored {
        StoredValue::Plain(value) => Some(value.clone()),
        StoredValue::Compressed(bytes) => {
            let inflated = match decompress_bytes(bytes) {
                Ok(inflated) => inflated,
                Err(e) => {
                    warn!("Failed to decompress cache value: {}", e);
                    return None;
                }
            };
            match serde_json::from_slice(&inflated) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Failed to deserialize decompressed cache value: {}", e);
                    None
                }
            }
        }
    }
}

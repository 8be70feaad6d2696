//! Key hashing helpers.
//!
//! Cache keys are built from MD5 digests of their inputs. Structured values
//! go through [`canonical_json`] first so that maps with the same entries
//! hash the same regardless of insertion order. Array order is kept.

use md5::{Digest, Md5};
use serde_json::Value;

/// Length of the truncated digests used inside composite keys.
pub const SHORT_HASH_LEN: usize = 16;

/// Full lowercase hex MD5 digest of `data`.
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Md5::new();
    hasher.update(data.as_ref());
    format!("{:x}", hasher.finalize())
}

/// First [`SHORT_HASH_LEN`] hex characters of the MD5 digest.
pub fn short_hash(data: impl AsRef<[u8]>) -> String {
    let mut digest = md5_hex(data);
    digest.truncate(SHORT_HASH_LEN);
    digest
}

/// Serializes a JSON value with object keys sorted at every depth.
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.clone(), sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Hash of an operation value for use in a cache key.
///
/// Scalars hash their plain string form (so `"1"` and `1` collide, as their
/// textual forms are equal); objects and arrays hash their canonical JSON.
pub fn hash_value(value: &Value) -> String {
    match value {
        Value::String(s) => short_hash(s),
        Value::Number(n) => short_hash(n.to_string()),
        Value::Bool(b) => short_hash(b.to_string()),
        Value::Object(_) | Value::Array(_) => short_hash(canonical_json(value)),
        Value::Null => short_hash("null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_md5_known_digest() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_short_hash_length() {
        assert_eq!(short_hash("abc"), "900150983cd24fb0");
        assert_eq!(short_hash("anything").len(), SHORT_HASH_LEN);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 2, "a": {"y": 1, "x": [3, {"d": 1, "c": 2}]}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"x":[3,{"c":2,"d":1}],"y":1},"b":2}"#
        );
    }

    #[test]
    fn test_hash_value_map_order_insensitive() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn test_hash_value_list_order_sensitive() {
        assert_ne!(hash_value(&json!([1, 2])), hash_value(&json!([2, 1])));
    }

    #[test]
    fn test_hash_value_scalars_use_text_form() {
        assert_eq!(hash_value(&json!("1")), hash_value(&json!(1)));
        assert_ne!(hash_value(&json!(true)), hash_value(&json!(false)));
        assert_eq!(hash_value(&json!("FF0000")), short_hash("FF0000"));
    }
}

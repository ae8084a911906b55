use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a value as JCS-canonical JSON (RFC 8785).
///
/// Journal records and content hashes go through this so that field order in
/// the source struct never changes the bytes.
///
/// ```rust
/// use ace_utils::canonical::emit_jcs;
/// use std::collections::HashMap;
///
/// let mut map = HashMap::new();
/// map.insert("b", 2);
/// map.insert("a", 1);
/// assert_eq!(emit_jcs(&map).unwrap(), r#"{"a":1,"b":2}"#);
/// ```
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}

/// BLAKE3 hex digest of the JCS form of `value`.
pub fn hash_jcs<T: Serialize>(value: &T) -> Result<String> {
    let canonical = emit_jcs(value)?;
    Ok(blake3::hash(canonical.as_bytes()).to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_output() {
        let a = json!({"phase": "start", "iteration": 1, "slots": {"b": "2", "a": "1"}});
        let b = json!({"slots": {"a": "1", "b": "2"}, "iteration": 1, "phase": "start"});
        assert_eq!(emit_jcs(&a).unwrap(), emit_jcs(&b).unwrap());
        assert_eq!(hash_jcs(&a).unwrap(), hash_jcs(&b).unwrap());
    }

    #[test]
    fn test_hash_is_hex_blake3() {
        let hash = hash_jcs(&json!({"x": 1})).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_distinct_values_hash_differently() {
        assert_ne!(
            hash_jcs(&json!({"x": 1})).unwrap(),
            hash_jcs(&json!({"x": 2})).unwrap()
        );
    }
}

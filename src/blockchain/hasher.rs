//! Canonical hashing.
//!
//! Every hash in the ledger (transaction ids, signing payloads, block hashes)
//! goes through [`hash_value`]. The encoding is JSON with no whitespace and
//! object keys sorted at every depth. Integers are written in decimal and
//! floats in their shortest round-trip form (`50.0`, `0.1`), so any peer that
//! follows the same rules arrives at the same digest byte for byte.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Encodes a JSON value canonically
///
/// # Arguments
///
/// * `value` - The value to encode
///
/// # Returns
///
/// The canonical string form of the value
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&escape(s)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&escape(key));
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn escape(s: &str) -> String {
    // Serializing a str into JSON cannot fail.
    serde_json::to_string(s).unwrap_or_default()
}

/// Hashes a JSON value with SHA-256 over its canonical encoding
///
/// # Returns
///
/// The digest as a lowercase hexadecimal string
pub fn hash_value(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hashes any serializable value canonically
pub fn hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(hash_value(&value))
}

/// Checks whether a hex digest has at least `difficulty` leading zeros
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

//! Canonical serialization and content hashing.
//!
//! Canonical form is sorted-key, whitespace-free JSON. `serde_json::Value`
//! keeps object keys in a `BTreeMap`, so routing through it sorts every level.

use crate::error::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serialize a value to canonical JSON.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_string(&value)?)
}

/// SHA-256 of raw bytes as lowercase hex.
#[must_use]
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// SHA-256 of the canonical JSON form of a value.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(sha256_hex(canonical_json(value)?))
}

/// First 64 bits of the SHA-256 of a string, for seeding.
#[must_use]
pub fn digest_u64(input: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Stable anomaly identifier derived from structural evidence.
///
/// Format: `DETERM-<code>-<slice>-<16 hex>` where the digest covers the code
/// and the ordered entity list.
#[must_use]
pub fn evidence_id(code: &str, slice: &str, entities: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.as_bytes());
    for entity in entities {
        hasher.update([0x1f]);
        hasher.update(entity.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    format!("DETERM-{}-{}-{}", code, slice, &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_canonical_json_sorts_keys() {
        let mut map = HashMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        map.insert("mid", 3);
        assert_eq!(
            canonical_json(&map).unwrap(),
            r#"{"alpha":2,"mid":3,"zeta":1}"#
        );
    }

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_evidence_id_is_stable_and_order_sensitive() {
        let a = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let b = vec!["A".to_string(), "C".to_string(), "B".to_string()];
        let id = evidence_id("CIRC", "2024-01", &a);
        assert_eq!(id, evidence_id("CIRC", "2024-01", &a));
        assert_ne!(id, evidence_id("CIRC", "2024-01", &b));
        assert_ne!(id, evidence_id("CIRC", "2024-02", &a));
        assert!(id.starts_with("DETERM-CIRC-2024-01-"));
        assert_eq!(id.len(), "DETERM-CIRC-2024-01-".len() + 16);
    }

    #[test]
    fn test_digest_u64_deterministic() {
        assert_eq!(digest_u64("2024-Q1"), digest_u64("2024-Q1"));
        assert_ne!(digest_u64("2024-Q1"), digest_u64("2024-Q2"));
    }
}

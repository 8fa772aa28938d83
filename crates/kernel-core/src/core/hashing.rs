// crates/kernel-core/src/core/hashing.rs
// ============================================================================
// Module: Content Hashing
// Description: Canonical-JSON content hashes for envelopes, receipts, and state.
// Purpose: Give every durable record a stable digest independent of field order.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! The kernel hashes payloads, run-state snapshots, and forensic scan results
//! so storage can verify integrity on load and so receipts can reference
//! content without embedding it. Hashing always canonicalizes through
//! [RFC 8785](https://www.rfc-editor.org/rfc/rfc8785) JSON Canonicalization
//! (`serde_jcs`) before hashing so that field order never changes a digest.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Error produced while hashing a value.
#[derive(Debug, thiserror::Error)]
pub enum HashingError {
    /// The value could not be canonicalized to JSON.
    #[error("failed to canonicalize value for hashing: {0}")]
    Canonicalize(String),
}

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// A SHA-256 content digest, rendered as a lowercase hex string on the wire.
///
/// # Invariants
/// - Always exactly 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashDigest([u8; 32]);

impl HashDigest {
    /// Returns the digest as a lowercase hex string.
    #[must_use]
    pub fn to_hex(self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for HashDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for HashDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for HashDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.len() != 64 {
            return Err(serde::de::Error::custom("hash digest must be 64 hex characters"));
        }
        let mut bytes = [0u8; 32];
        for (index, chunk) in raw.as_bytes().chunks(2).enumerate() {
            let pair =
                std::str::from_utf8(chunk).map_err(|_| serde::de::Error::custom("invalid hash digest"))?;
            bytes[index] =
                u8::from_str_radix(pair, 16).map_err(|_| serde::de::Error::custom("invalid hash digest"))?;
        }
        Ok(Self(bytes))
    }
}

// ============================================================================
// SECTION: Canonical Hashing
// ============================================================================

/// Canonicalizes `value` to RFC 8785 JSON and returns the serialized bytes.
///
/// # Errors
///
/// Returns [`HashingError`] when `value` cannot be serialized.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashingError> {
    serde_jcs::to_vec(value).map_err(|err| HashingError::Canonicalize(err.to_string()))
}

/// Hashes arbitrary bytes with SHA-256.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    HashDigest(hasher.finalize().into())
}

/// Canonicalizes and hashes `value` in one step.
///
/// # Errors
///
/// Returns [`HashingError`] when `value` cannot be serialized.
pub fn hash_value<T: Serialize>(value: &T) -> Result<HashDigest, HashingError> {
    canonical_json_bytes(value).map(|bytes| hash_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::hash_value;

    #[test]
    fn field_order_does_not_change_the_digest() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(hash_value(&a).expect("hash"), hash_value(&b).expect("hash"));
    }

    #[test]
    fn different_content_hashes_differently() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(hash_value(&a).expect("hash"), hash_value(&b).expect("hash"));
    }

    #[test]
    fn digest_round_trips_through_hex() {
        let digest = hash_value(&json!({"x": "y"})).expect("hash");
        let encoded = serde_json::to_string(&digest).expect("serialize");
        let decoded: super::HashDigest = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(digest, decoded);
    }
}

// hasher.rs - SHA-256 hashing utilities.
//
// All hashes in Stride are SHA-256, lowercase hex. The audit chain uses them
// for record links, and the policy cache uses them to fingerprint snapshots.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::AuditError;

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash the compact JSON serialization of a value.
///
/// Struct fields serialize in declaration order and `serde_json::Map` is
/// sorted, so the same value always hashes the same.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String, AuditError> {
    let json = serde_json::to_string(value)?;
    Ok(hash_str(&json))
}

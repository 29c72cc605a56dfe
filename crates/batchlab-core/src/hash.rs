//! Fingerprints recorded in manifests.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::errors::BatchError;
use crate::serde::to_canonical_json_bytes;

/// Hex SHA256 of the canonical JSON form of `value`; independent of map
/// insertion order.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, BatchError> {
    to_canonical_json_bytes(value).map(|bytes| content_hash(&bytes))
}

/// Hex SHA256 of raw bytes, e.g. a template source.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

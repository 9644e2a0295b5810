//! Canonical JSON encoding and the content hashes built on it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::errors::{ErrorInfo, KszError};

fn json_error(code: &str, err: serde_json::Error) -> KszError {
    KszError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Rebuilds every object with sorted keys, whatever map type serde_json was built with.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        scalar => scalar,
    }
}

/// Compact JSON with object keys in lexicographic order.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, KszError> {
    let tree = serde_json::to_value(value).map_err(|err| json_error("json-encode", err))?;
    serde_json::to_vec(&sort_keys(tree)).map_err(|err| json_error("json-write", err))
}

/// Parses JSON produced by [`to_canonical_json_bytes`] or any other encoder.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, KszError> {
    serde_json::from_slice(data).map_err(|err| json_error("json-decode", err))
}

/// Hex SHA-256 of the canonical JSON encoding; used for plan and tensor hashes.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, KszError> {
    let digest = Sha256::digest(to_canonical_json_bytes(value)?);
    Ok(format!("{digest:x}"))
}

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::errors::{BatchError, ErrorInfo};

fn serde_error(code: &str, err: impl ToString) -> BatchError {
    BatchError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Sorts object keys at every depth. Maps otherwise keep insertion order
/// because `serde_json` is built with `preserve_order`.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|left, right| left.0.cmp(&right.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn canonical_value<T: Serialize>(value: &T) -> Result<Value, BatchError> {
    serde_json::to_value(value)
        .map(sort_keys)
        .map_err(|err| serde_error("serde.json_encode", err))
}

/// Compact canonical JSON; the input of every stable hash.
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, BatchError> {
    serde_json::to_vec(&canonical_value(value)?).map_err(|err| serde_error("serde.json_write", err))
}

/// Indented canonical JSON with a trailing newline, used for manifests.
pub fn to_canonical_json_pretty<T: Serialize>(value: &T) -> Result<Vec<u8>, BatchError> {
    let mut bytes = serde_json::to_vec_pretty(&canonical_value(value)?)
        .map_err(|err| serde_error("serde.json_write", err))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Decodes JSON bytes.
pub fn from_json_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, BatchError> {
    serde_json::from_slice(data).map_err(|err| serde_error("serde.json_decode", err))
}

/// Encodes `value` as YAML.
pub fn to_yaml_string<T: Serialize>(value: &T) -> Result<String, BatchError> {
    serde_yaml::to_string(value).map_err(|err| serde_error("serde.yaml_encode", err))
}

/// Decodes a YAML document, typically the pipeline configuration.
pub fn from_yaml_slice<T: DeserializeOwned>(data: &[u8]) -> Result<T, BatchError> {
    serde_yaml::from_slice(data).map_err(|err| serde_error("serde.yaml_decode", err))
}

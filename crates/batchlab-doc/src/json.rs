//! JSON backend.

use std::io::Write;

use batchlab_core::{BatchError, DocumentFormat, ErrorInfo};
use serde_json::{Map, Number, Value};

use crate::backend::{write_error, EditScope, FormatBackend, MatchPolicy, ParentScope};
use crate::node::{Document, Scalar};
use crate::plain::{map_from_element, root_from_map, Plain};

/// Backend for JSON documents. The top level must be an object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBackend;

fn to_plain(value: Value) -> Plain {
    match value {
        Value::Null => Plain::Scalar(Scalar::Null),
        Value::Bool(flag) => Plain::Scalar(Scalar::Bool(flag)),
        Value::Number(number) => Plain::Scalar(match number.as_i64() {
            Some(int) => Scalar::Int(int),
            None => number
                .as_f64()
                .map(Scalar::Float)
                .unwrap_or_else(|| Scalar::Str(number.to_string())),
        }),
        Value::String(text) => Plain::Scalar(Scalar::Str(text)),
        Value::Array(items) => Plain::Seq(items.into_iter().map(to_plain).collect()),
        Value::Object(map) => Plain::Map(map.into_iter().map(|(k, v)| (k, to_plain(v))).collect()),
    }
}

fn from_plain(plain: Plain) -> Result<Value, BatchError> {
    Ok(match plain {
        Plain::Scalar(scalar) => from_scalar(scalar)?,
        Plain::Seq(items) => Value::Array(items.into_iter().map(from_plain).collect::<Result<_, _>>()?),
        Plain::Map(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key, from_plain(value)?);
            }
            Value::Object(map)
        }
    })
}

fn from_scalar(scalar: Scalar) -> Result<Value, BatchError> {
    Ok(match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(flag) => Value::Bool(flag),
        Scalar::Int(int) => Value::Number(int.into()),
        Scalar::Float(float) => Number::from_f64(float).map(Value::Number).ok_or_else(|| {
            BatchError::Serde(
                ErrorInfo::new("doc.json_number", "non-finite number cannot be written as JSON")
                    .with_context("value", float.to_string()),
            )
        })?,
        Scalar::Str(text) => Value::String(text),
        Scalar::List(items) => {
            Value::Array(items.into_iter().map(from_scalar).collect::<Result<_, _>>()?)
        }
    })
}

impl FormatBackend for JsonBackend {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Json
    }

    fn policy(&self) -> MatchPolicy {
        MatchPolicy {
            edit: EditScope::AllMatches,
            parent: ParentScope::Every,
            shared_keys: true,
        }
    }

    fn parse(&self, source: &str) -> Result<Document, BatchError> {
        let value: Value = serde_json::from_str(source).map_err(|err| {
            BatchError::MalformedDocument(
                ErrorInfo::new("doc.json_parse", err.to_string())
                    .with_context("line", err.line().to_string()),
            )
        })?;
        let Plain::Map(entries) = to_plain(value) else {
            return Err(BatchError::MalformedDocument(ErrorInfo::new(
                "doc.json_root",
                "top-level JSON value must be an object",
            )));
        };
        let root = root_from_map(entries)?;
        let body = source.trim();
        let start = source.find(body).unwrap_or(0);
        Ok(Document {
            prolog: source[..start].to_string(),
            root,
            epilog: source[start + body.len()..].to_string(),
        })
    }

    fn write(&self, document: &Document, out: &mut dyn Write) -> Result<(), BatchError> {
        let value = from_plain(Plain::Map(map_from_element(&document.root)))?;
        let body = serde_json::to_string_pretty(&value).map_err(|err| {
            BatchError::Serde(ErrorInfo::new("doc.json_write", err.to_string()))
        })?;
        out.write_all(document.prolog.as_bytes()).map_err(write_error)?;
        out.write_all(body.as_bytes()).map_err(write_error)?;
        out.write_all(document.epilog.as_bytes()).map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_source_roundtrips() {
        let source = "{\n  \"engine\": {\n    \"seed\": 1,\n    \"ratio\": 0.5\n  },\n  \"robots\": [\n    {\n      \"id\": \"r0\"\n    }\n  ],\n  \"tags\": [\n    \"a\",\n    \"b\"\n  ]\n}\n";
        let document = JsonBackend.parse(source).expect("parse");
        let mut out = Vec::new();
        JsonBackend.write(&document, &mut out).expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), source);
    }

    #[test]
    fn non_object_root_is_malformed() {
        let err = JsonBackend.parse("[1, 2]").expect_err("array root");
        assert_eq!(err.info().code, "doc.json_root");
        let err = JsonBackend.parse("{\"a\": ").expect_err("truncated");
        assert!(matches!(err, BatchError::MalformedDocument(_)));
    }
}

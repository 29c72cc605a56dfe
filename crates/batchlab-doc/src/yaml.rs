//! YAML backend.

use std::io::Write;

use batchlab_core::{BatchError, DocumentFormat, ErrorInfo};
use serde_yaml::{Mapping, Number, Value};

use crate::backend::{write_error, EditScope, FormatBackend, MatchPolicy, ParentScope};
use crate::node::{Document, Scalar};
use crate::plain::{map_from_element, root_from_map, Plain};

const DOCUMENT_START: &str = "---\n";

/// Backend for YAML documents. The top level must be a mapping with string keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlBackend;

fn malformed(code: &str, message: impl Into<String>) -> BatchError {
    BatchError::MalformedDocument(ErrorInfo::new(code, message))
}

fn to_plain(value: Value) -> Result<Plain, BatchError> {
    Ok(match value {
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
        Value::Sequence(items) => {
            Plain::Seq(items.into_iter().map(to_plain).collect::<Result<_, _>>()?)
        }
        Value::Mapping(mapping) => {
            let mut entries = Vec::with_capacity(mapping.len());
            for (key, value) in mapping {
                let Value::String(key) = key else {
                    return Err(malformed("doc.yaml_key", "mapping keys must be strings"));
                };
                entries.push((key, to_plain(value)?));
            }
            Plain::Map(entries)
        }
        Value::Tagged(tagged) => {
            return Err(malformed("doc.yaml_tag", format!("unsupported tag {}", tagged.tag)))
        }
    })
}

fn from_plain(plain: Plain) -> Value {
    match plain {
        Plain::Scalar(scalar) => from_scalar(scalar),
        Plain::Seq(items) => Value::Sequence(items.into_iter().map(from_plain).collect()),
        Plain::Map(entries) => {
            let mut mapping = Mapping::new();
            for (key, value) in entries {
                mapping.insert(Value::String(key), from_plain(value));
            }
            Value::Mapping(mapping)
        }
    }
}

fn from_scalar(scalar: Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(flag) => Value::Bool(flag),
        Scalar::Int(int) => Value::Number(Number::from(int)),
        Scalar::Float(float) => Value::Number(Number::from(float)),
        Scalar::Str(text) => Value::String(text),
        Scalar::List(items) => Value::Sequence(items.into_iter().map(from_scalar).collect()),
    }
}

impl FormatBackend for YamlBackend {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Yaml
    }

    fn policy(&self) -> MatchPolicy {
        MatchPolicy {
            edit: EditScope::AllMatches,
            parent: ParentScope::Unique,
            shared_keys: true,
        }
    }

    fn parse(&self, source: &str) -> Result<Document, BatchError> {
        let value: Value = serde_yaml::from_str(source)
            .map_err(|err| malformed("doc.yaml_parse", err.to_string()))?;
        let Plain::Map(entries) = to_plain(value)? else {
            return Err(malformed("doc.yaml_root", "top-level YAML value must be a mapping"));
        };
        let prolog = if source.starts_with(DOCUMENT_START) {
            DOCUMENT_START.to_string()
        } else {
            String::new()
        };
        Ok(Document {
            prolog,
            root: root_from_map(entries)?,
            epilog: String::new(),
        })
    }

    fn write(&self, document: &Document, out: &mut dyn Write) -> Result<(), BatchError> {
        let value = from_plain(Plain::Map(map_from_element(&document.root)));
        let body = serde_yaml::to_string(&value).map_err(|err| {
            BatchError::Serde(ErrorInfo::new("doc.yaml_write", err.to_string()))
        })?;
        out.write_all(document.prolog.as_bytes()).map_err(write_error)?;
        out.write_all(body.as_bytes()).map_err(write_error)?;
        out.write_all(document.epilog.as_bytes()).map_err(write_error)
    }
}

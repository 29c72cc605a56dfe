//! Structured error types shared across batchlab crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and the experiment/run/path coordinates of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Dotted machine code, e.g. `doc.path_not_found`.
    pub code: String,
    /// What went wrong.
    pub message: String,
    /// Coordinates such as `experiment`, `run`, `path` or `file`.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// How the caller might fix the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload without context or hint.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records one coordinate; a repeated key keeps the latest value.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attaches a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the batch generation and reduction pipeline.
///
/// Every variant is terminal for the unit of work that raised it; the
/// attached [`ErrorInfo`] names the experiment, run, path or file involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum BatchError {
    /// The input could not be parsed or violates backend structure rules.
    #[error("malformed document: {0}")]
    MalformedDocument(ErrorInfo),
    /// A path that must address an existing node matched nothing.
    #[error("path not found: {0}")]
    PathNotFound(ErrorInfo),
    /// A parent path resolved to several nodes where one is required.
    #[error("ambiguous ancestor: {0}")]
    AmbiguousAncestor(ErrorInfo),
    /// The criteria name is not registered.
    #[error("unknown criteria: {0}")]
    UnknownCriteria(ErrorInfo),
    /// The criteria parameters violate the grammar or its constraints.
    #[error("invalid criteria parameters: {0}")]
    InvalidCriteriaParams(ErrorInfo),
    /// Inputs grouped for reduction expose different column sets.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(ErrorInfo),
    /// The destination already holds prior output and overwrite was not requested.
    #[error("destination not empty: {0}")]
    DestinationNotEmpty(ErrorInfo),
    /// Filesystem failures.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization and table decoding failures.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Invalid or incomplete pipeline configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            let pairs: Vec<String> = self
                .context
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            write!(f, " | context: [{}]", pairs.join(", "))?;
        }
        match &self.hint {
            Some(hint) => write!(f, " | hint: {hint}"),
            None => Ok(()),
        }
    }
}

impl BatchError {
    /// Payload of any variant.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            BatchError::MalformedDocument(info)
            | BatchError::PathNotFound(info)
            | BatchError::AmbiguousAncestor(info)
            | BatchError::UnknownCriteria(info)
            | BatchError::InvalidCriteriaParams(info)
            | BatchError::SchemaMismatch(info)
            | BatchError::DestinationNotEmpty(info)
            | BatchError::Io(info)
            | BatchError::Serde(info)
            | BatchError::Config(info) => info,
        }
    }

    /// Attaches an additional context entry, keeping the error family.
    pub fn with_context(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.map_info(|info| info.with_context(key, value))
    }

    /// Attaches a remediation hint, keeping the error family.
    pub fn with_hint(self, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        self.map_info(|info| info.with_hint(hint))
    }

    fn map_info(self, edit: impl FnOnce(ErrorInfo) -> ErrorInfo) -> Self {
        match self {
            BatchError::MalformedDocument(info) => BatchError::MalformedDocument(edit(info)),
            BatchError::PathNotFound(info) => BatchError::PathNotFound(edit(info)),
            BatchError::AmbiguousAncestor(info) => BatchError::AmbiguousAncestor(edit(info)),
            BatchError::UnknownCriteria(info) => BatchError::UnknownCriteria(edit(info)),
            BatchError::InvalidCriteriaParams(info) => {
                BatchError::InvalidCriteriaParams(edit(info))
            }
            BatchError::SchemaMismatch(info) => BatchError::SchemaMismatch(edit(info)),
            BatchError::DestinationNotEmpty(info) => BatchError::DestinationNotEmpty(edit(info)),
            BatchError::Io(info) => BatchError::Io(edit(info)),
            BatchError::Serde(info) => BatchError::Serde(edit(info)),
            BatchError::Config(info) => BatchError::Config(edit(info)),
        }
    }
}

/// Wraps a filesystem error, recording the offending path.
pub fn io_error(code: &str, path: &std::path::Path, err: impl ToString) -> BatchError {
    BatchError::Io(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_and_hint() {
        let err = BatchError::PathNotFound(
            ErrorInfo::new("doc.path_not_found", "no element matches")
                .with_context("path", ".//arena")
                .with_hint("check the template"),
        );
        let rendered = err.to_string();
        assert!(rendered.starts_with("path not found: no element matches"));
        assert!(rendered.contains("path=.//arena"));
        assert!(rendered.contains("hint: check the template"));
    }

    #[test]
    fn with_context_keeps_family() {
        let err = BatchError::SchemaMismatch(ErrorInfo::new("reduce.schema", "columns differ"))
            .with_context("experiment", "3");
        assert!(matches!(err, BatchError::SchemaMismatch(_)));
        assert_eq!(err.info().context.get("experiment").map(String::as_str), Some("3"));
    }

    #[test]
    fn with_hint_keeps_family() {
        let err = BatchError::InvalidCriteriaParams(ErrorInfo::new("criteria.params", "bad bounds"))
            .with_hint("add .C<n>");
        assert!(matches!(err, BatchError::InvalidCriteriaParams(_)));
        assert_eq!(err.info().hint.as_deref(), Some("add .C<n>"));
    }
}

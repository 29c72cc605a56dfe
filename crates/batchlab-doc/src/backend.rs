//! Format backends and their registry.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use batchlab_core::{BatchError, DocumentFormat, ErrorInfo};

use crate::json::JsonBackend;
use crate::node::Document;
use crate::xml::XmlBackend;
use crate::yaml::YamlBackend;

/// How many matches of a path an attribute edit touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditScope {
    /// Only the first match in document order.
    FirstMatch,
    /// Every match.
    AllMatches,
}

/// How a parent path for a structural add is treated when it matches several elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentScope {
    /// Exactly one parent is required; several is an error.
    Unique,
    /// The element is added under each matching parent.
    Every,
}

/// Match semantics a backend applies to mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchPolicy {
    /// Scope of attribute edits, tag changes and removals.
    pub edit: EditScope,
    /// Scope of element additions.
    pub parent: ParentScope,
    /// Attributes and child elements share one key space.
    pub shared_keys: bool,
}

/// Parses and writes one on-disk document format.
pub trait FormatBackend: fmt::Debug + Send + Sync {
    /// Format handled by this backend.
    fn format(&self) -> DocumentFormat;

    /// Mutation match semantics for documents of this format.
    fn policy(&self) -> MatchPolicy;

    /// Parses `source` into a document.
    fn parse(&self, source: &str) -> Result<Document, BatchError>;

    /// Writes `document` to `out`.
    fn write(&self, document: &Document, out: &mut dyn Write) -> Result<(), BatchError>;
}

pub(crate) fn write_error(err: impl ToString) -> BatchError {
    BatchError::Io(ErrorInfo::new("doc.write", err.to_string()))
}

/// Backends keyed by format.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<DocumentFormat, Arc<dyn FormatBackend>>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("formats", &self.backends.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(XmlBackend));
        registry.register(Arc::new(JsonBackend));
        registry.register(Arc::new(YamlBackend));
        registry
    }
}

impl BackendRegistry {
    /// Registry without any backend.
    pub fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// Adds or replaces the backend for its format.
    pub fn register(&mut self, backend: Arc<dyn FormatBackend>) {
        self.backends.insert(backend.format(), backend);
    }

    /// Backend for `format`.
    pub fn get(&self, format: DocumentFormat) -> Result<Arc<dyn FormatBackend>, BatchError> {
        self.backends.get(&format).cloned().ok_or_else(|| {
            BatchError::Config(
                ErrorInfo::new("doc.backend", "no backend registered for format")
                    .with_context("format", format.as_str()),
            )
        })
    }
}

//! Parsed documents and path-addressed mutation.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use batchlab_core::{io_error, BatchError, DocumentFormat, ErrorInfo};
use tracing::{debug, trace};

use crate::backend::{BackendRegistry, EditScope, FormatBackend, MatchPolicy, ParentScope};
use crate::mutation::{Mutation, MutationResult};
use crate::node::{Attribute, Document, Element, Entry, Scalar};
use crate::path::{canonical_attr_path, canonical_path, is_addressable_tag, Address, PathExpr};

/// Lifecycle of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    /// Freshly parsed and unmodified.
    Parsed,
    /// At least one mutation succeeded.
    Mutated,
}

/// Node selected by a path.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    /// An element.
    Element(&'a Element),
    /// An attribute together with its owning element.
    Attribute {
        /// Element carrying the attribute.
        owner: &'a Element,
        /// The attribute itself.
        attr: &'a Attribute,
    },
}

/// A resolved node and its canonical path.
#[derive(Debug, Clone)]
pub struct ResolvedNode<'a> {
    /// Canonical path of the node.
    pub path: String,
    /// The node.
    pub node: NodeRef<'a>,
}

impl ResolvedNode<'_> {
    /// Attribute value, when the node is an attribute.
    pub fn value(&self) -> Option<&Scalar> {
        match self.node {
            NodeRef::Attribute { attr, .. } => Some(attr.value()),
            NodeRef::Element(_) => None,
        }
    }
}

/// In-memory document bound to the backend that parsed it.
///
/// Cloning yields an independent deep copy, which is how per-run documents
/// are derived from a shared template.
#[derive(Debug, Clone)]
pub struct DocumentTree {
    document: Document,
    backend: Arc<dyn FormatBackend>,
    state: DocState,
}

fn not_found(path: &str) -> BatchError {
    BatchError::PathNotFound(
        ErrorInfo::new("doc.path_not_found", "path matched no element")
            .with_context("path", path.to_string()),
    )
}

fn element_path(expr: &PathExpr, path: &str) -> Result<(), BatchError> {
    if expr.attr().is_some() {
        return Err(BatchError::Config(
            ErrorInfo::new("doc.path_syntax", "expected an element path")
                .with_context("path", path.to_string()),
        ));
    }
    Ok(())
}

fn check_tag(tag: &str) -> Result<(), BatchError> {
    if is_addressable_tag(tag) {
        Ok(())
    } else {
        Err(BatchError::Config(
            ErrorInfo::new("doc.tag_syntax", "tag cannot be addressed by a path")
                .with_context("tag", tag.to_string()),
        ))
    }
}

fn kind_conflict(path: &str, name: &str) -> BatchError {
    BatchError::MalformedDocument(
        ErrorInfo::new(
            "doc.kind_conflict",
            "an attribute and a child element would share one key",
        )
        .with_context("path", path.to_string())
        .with_context("name", name.to_string()),
    )
}

impl DocumentTree {
    /// Parses `source` with `backend`.
    pub fn parse(source: &str, backend: Arc<dyn FormatBackend>) -> Result<Self, BatchError> {
        let document = backend.parse(source)?;
        Ok(Self {
            document,
            backend,
            state: DocState::Parsed,
        })
    }

    /// Reads and parses a file, inferring the format from its extension
    /// unless `format` is given.
    pub fn load(
        path: &Path,
        registry: &BackendRegistry,
        format: Option<DocumentFormat>,
    ) -> Result<Self, BatchError> {
        let format = match format.or_else(|| DocumentFormat::from_path(path)) {
            Some(format) => format,
            None => {
                return Err(BatchError::Config(
                    ErrorInfo::new("doc.format", "cannot infer document format")
                        .with_context("path", path.display().to_string()),
                ))
            }
        };
        let source = fs::read_to_string(path).map_err(|err| io_error("doc.read", path, err))?;
        debug!(path = %path.display(), format = format.as_str(), "loading document");
        Self::parse(&source, registry.get(format)?)
            .map_err(|err| err.with_context("file", path.display().to_string()))
    }

    /// Format of the backend bound to this tree.
    pub fn format(&self) -> DocumentFormat {
        self.backend.format()
    }

    /// Match semantics of the bound backend.
    pub fn policy(&self) -> MatchPolicy {
        self.backend.policy()
    }

    /// Whether the tree has been modified since parsing.
    pub fn state(&self) -> DocState {
        self.state
    }

    /// Root element.
    pub fn root(&self) -> &Element {
        &self.document.root
    }

    /// Resolves `path` to nodes in document order. No match is not an error.
    pub fn resolve(&self, path: &str) -> Result<Vec<ResolvedNode<'_>>, BatchError> {
        let expr = PathExpr::parse(path)?;
        let root = &self.document.root;
        let mut out = Vec::new();
        for addr in expr.select(root) {
            let Some(element) = root.at(&addr) else {
                continue;
            };
            match expr.attr() {
                None => out.push(ResolvedNode {
                    path: canonical_path(root, &addr),
                    node: NodeRef::Element(element),
                }),
                Some(name) => {
                    if let Some(attr) = element.attributes().find(|attr| attr.name == name) {
                        out.push(ResolvedNode {
                            path: canonical_attr_path(root, &addr, name),
                            node: NodeRef::Attribute {
                                owner: element,
                                attr,
                            },
                        });
                    }
                }
            }
        }
        Ok(out)
    }

    /// Every element and attribute in document order.
    pub fn nodes(&self) -> Vec<ResolvedNode<'_>> {
        let root = &self.document.root;
        let mut out = Vec::new();
        let mut stack: Vec<(Address, &Element)> = vec![(Vec::new(), root)];
        while let Some((addr, element)) = stack.pop() {
            out.push(ResolvedNode {
                path: canonical_path(root, &addr),
                node: NodeRef::Element(element),
            });
            for attr in element.attributes() {
                out.push(ResolvedNode {
                    path: canonical_attr_path(root, &addr, &attr.name),
                    node: NodeRef::Attribute {
                        owner: element,
                        attr,
                    },
                });
            }
            for (idx, entry) in element.entries.iter().enumerate().rev() {
                if let Entry::Elem(child) = entry {
                    let mut child_addr = addr.clone();
                    child_addr.push(idx);
                    stack.push((child_addr, child));
                }
            }
        }
        out
    }

    fn select_elements(&self, path: &str) -> Result<Vec<Address>, BatchError> {
        let expr = PathExpr::parse(path)?;
        element_path(&expr, path)?;
        let matches = expr.select(&self.document.root);
        if matches.is_empty() {
            return Err(not_found(path));
        }
        Ok(matches)
    }

    fn edit_targets(&self, matches: Vec<Address>) -> Vec<Address> {
        match self.policy().edit {
            EditScope::FirstMatch => matches.into_iter().take(1).collect(),
            EditScope::AllMatches => matches,
        }
    }

    /// Sets `attr` on the elements matched by `path`, creating it where absent.
    pub fn set_attribute(
        &mut self,
        path: &str,
        attr: &str,
        value: impl Into<Scalar>,
    ) -> Result<MutationResult, BatchError> {
        check_tag(attr)?;
        let value = value.into();
        let matches = self.select_elements(path)?;
        let matched = matches.len();
        let targets = self.edit_targets(matches);
        let shared_keys = self.policy().shared_keys;
        let root = &mut self.document.root;
        let mut paths = Vec::with_capacity(targets.len());
        for addr in &targets {
            let canonical = canonical_attr_path(root, addr, attr);
            let element = root.at_mut(addr).ok_or_else(|| not_found(path))?;
            if shared_keys && element.has_child_tag(attr) {
                return Err(kind_conflict(path, attr));
            }
            element.set_attr(attr, value.clone());
            paths.push(canonical);
        }
        trace!(path, attr, matched, written = paths.len(), "set attribute");
        self.state = DocState::Mutated;
        Ok(MutationResult { matched, paths })
    }

    /// Adds a `tag` element with `attrs` under the parent(s) matched by
    /// `parent` and returns the canonical paths of the new elements.
    pub fn add_element(
        &mut self,
        parent: &str,
        tag: &str,
        attrs: &[(String, Scalar)],
    ) -> Result<Vec<String>, BatchError> {
        check_tag(tag)?;
        for (name, _) in attrs {
            check_tag(name)?;
        }
        let parents = self.select_elements(parent)?;
        let policy = self.policy();
        if policy.parent == ParentScope::Unique && parents.len() > 1 {
            return Err(BatchError::AmbiguousAncestor(
                ErrorInfo::new("doc.ambiguous_parent", "parent path matched several elements")
                    .with_context("path", parent.to_string())
                    .with_context("matches", parents.len().to_string())
                    .with_hint("add an index step such as [0] to the parent path"),
            ));
        }

        let root = &mut self.document.root;
        let mut added = Vec::with_capacity(parents.len());
        for addr in &parents {
            let element = root.at_mut(addr).ok_or_else(|| not_found(parent))?;
            if policy.shared_keys && element.attribute(tag).is_some() {
                return Err(kind_conflict(parent, tag));
            }
            let mut child = Element::new(tag);
            for (name, value) in attrs {
                child.push_attr(name.clone(), value.clone());
            }
            if policy.shared_keys {
                child.repeated = element.children().any(|sibling| sibling.tag == tag && sibling.repeated);
            }
            let idx = element.add_child(child);
            let mut child_addr = addr.clone();
            child_addr.push(idx);
            added.push(child_addr);
        }
        // sibling indices settle only after every insert
        let paths: Vec<String> = added.iter().map(|addr| canonical_path(root, addr)).collect();
        trace!(parent, tag, added = paths.len(), "add element");
        self.state = DocState::Mutated;
        Ok(paths)
    }

    /// Renames the elements matched by `path`.
    pub fn change_tag(&mut self, path: &str, tag: &str) -> Result<MutationResult, BatchError> {
        check_tag(tag)?;
        let matches = self.select_elements(path)?;
        let matched = matches.len();
        let targets = self.edit_targets(matches);
        let shared_keys = self.policy().shared_keys;
        let root = &mut self.document.root;
        for addr in &targets {
            if shared_keys {
                if let Some((_, parent_addr)) = addr.split_last() {
                    let parent = root.at(parent_addr).ok_or_else(|| not_found(path))?;
                    if parent.attribute(tag).is_some() {
                        return Err(kind_conflict(path, tag));
                    }
                }
            }
            root.at_mut(addr).ok_or_else(|| not_found(path))?.rename(tag);
        }
        let paths = targets.iter().map(|addr| canonical_path(root, addr)).collect();
        self.state = DocState::Mutated;
        Ok(MutationResult { matched, paths })
    }

    /// Deletes the elements matched by `path`. The root cannot be removed.
    pub fn remove_element(&mut self, path: &str) -> Result<MutationResult, BatchError> {
        let matches = self.select_elements(path)?;
        let matched = matches.len();
        let targets = self.edit_targets(matches);
        let root = &mut self.document.root;
        let paths: Vec<String> = targets.iter().map(|addr| canonical_path(root, addr)).collect();
        // later addresses first so earlier ones stay valid
        for addr in targets.iter().rev() {
            let Some((&idx, parent_addr)) = addr.split_last() else {
                return Err(BatchError::MalformedDocument(
                    ErrorInfo::new("doc.remove_root", "the root element cannot be removed")
                        .with_context("path", path.to_string()),
                ));
            };
            root.at_mut(parent_addr)
                .and_then(|parent| parent.remove_child(idx))
                .ok_or_else(|| not_found(path))?;
        }
        self.state = DocState::Mutated;
        Ok(MutationResult { matched, paths })
    }

    /// Applies one mutation.
    pub fn apply(&mut self, mutation: &Mutation) -> Result<MutationResult, BatchError> {
        match mutation {
            Mutation::SetAttribute { path, attr, value } => {
                self.set_attribute(path, attr, value.clone())
            }
            Mutation::AddElement { parent, tag, attrs } => {
                let paths = self.add_element(parent, tag, attrs)?;
                Ok(MutationResult {
                    matched: paths.len(),
                    paths,
                })
            }
            Mutation::ChangeTag { path, tag } => self.change_tag(path, tag),
            Mutation::RemoveElement { path } => self.remove_element(path),
        }
    }

    /// Applies mutations in order, stopping at the first failure.
    pub fn apply_all(&mut self, mutations: &[Mutation]) -> Result<Vec<MutationResult>, BatchError> {
        mutations.iter().map(|mutation| self.apply(mutation)).collect()
    }

    /// Detaches the single element matched by `path` into its own tree.
    pub fn split_off(&mut self, path: &str) -> Result<DocumentTree, BatchError> {
        let matches = self.select_elements(path)?;
        if matches.len() > 1 {
            return Err(BatchError::AmbiguousAncestor(
                ErrorInfo::new("doc.ambiguous_split", "split path matched several elements")
                    .with_context("path", path.to_string())
                    .with_context("matches", matches.len().to_string()),
            ));
        }
        let addr = &matches[0];
        let Some((&idx, parent_addr)) = addr.split_last() else {
            return Err(BatchError::MalformedDocument(
                ErrorInfo::new("doc.split_root", "the root element cannot be split off")
                    .with_context("path", path.to_string()),
            ));
        };
        let mut detached = self
            .document
            .root
            .at_mut(parent_addr)
            .and_then(|parent| parent.remove_child(idx))
            .ok_or_else(|| not_found(path))?;
        detached.repeated = false;
        self.state = DocState::Mutated;
        Ok(DocumentTree {
            document: Document {
                prolog: self.document.prolog.clone(),
                root: detached,
                epilog: self.document.epilog.clone(),
            },
            backend: Arc::clone(&self.backend),
            state: DocState::Mutated,
        })
    }

    /// Writes the document to `sink`, consuming the tree.
    pub fn serialize<W: Write>(self, sink: &mut W) -> Result<(), BatchError> {
        self.backend.write(&self.document, sink)
    }

    /// Serializes the document into a string, consuming the tree.
    pub fn into_string(self) -> Result<String, BatchError> {
        let mut bytes = Vec::new();
        self.serialize(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|err| BatchError::Serde(ErrorInfo::new("doc.utf8", err.to_string())))
    }
}

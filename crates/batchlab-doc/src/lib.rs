#![deny(missing_docs)]
#![doc = "Document trees over XML, JSON and YAML with path-addressed mutation."]

pub mod backend;
pub mod json;
/// Mutation descriptions and results.
pub mod mutation;
pub mod node;
pub mod path;
mod plain;
pub mod tree;
pub mod xml;
pub mod yaml;

pub use backend::{BackendRegistry, EditScope, FormatBackend, MatchPolicy, ParentScope};
pub use json::JsonBackend;
pub use mutation::{Mutation, MutationResult};
pub use node::{Attribute, Document, Element, Scalar};
pub use path::PathExpr;
pub use tree::{DocState, DocumentTree, NodeRef, ResolvedNode};
pub use xml::XmlBackend;
pub use yaml::YamlBackend;

use serde::{Deserialize, Serialize};

use crate::node::Scalar;

/// One structural or attribute edit, addressed by path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Mutation {
    /// Sets (or creates) an attribute on the elements matched by `path`.
    SetAttribute {
        /// Element path.
        path: String,
        /// Attribute name.
        attr: String,
        /// New value.
        value: Scalar,
    },
    /// Adds a child element under `parent`.
    AddElement {
        /// Parent element path.
        parent: String,
        /// Tag of the new element.
        tag: String,
        /// Initial attributes, in order.
        #[serde(default)]
        attrs: Vec<(String, Scalar)>,
    },
    /// Renames the elements matched by `path`.
    ChangeTag {
        /// Element path.
        path: String,
        /// New tag.
        tag: String,
    },
    /// Deletes the elements matched by `path`.
    RemoveElement {
        /// Element path.
        path: String,
    },
}

impl Mutation {
    /// Shorthand for [`Mutation::SetAttribute`].
    pub fn set_attribute(path: impl Into<String>, attr: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Mutation::SetAttribute {
            path: path.into(),
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// Path the mutation is addressed to.
    pub fn path(&self) -> &str {
        match self {
            Mutation::SetAttribute { path, .. }
            | Mutation::ChangeTag { path, .. }
            | Mutation::RemoveElement { path } => path,
            Mutation::AddElement { parent, .. } => parent,
        }
    }

    /// Rewrites every path, name and string value with `f`.
    pub fn map_text(&self, f: &dyn Fn(&str) -> String) -> Mutation {
        match self {
            Mutation::SetAttribute { path, attr, value } => Mutation::SetAttribute {
                path: f(path),
                attr: f(attr),
                value: value.map_text(f),
            },
            Mutation::AddElement { parent, tag, attrs } => Mutation::AddElement {
                parent: f(parent),
                tag: f(tag),
                attrs: attrs
                    .iter()
                    .map(|(name, value)| (f(name), value.map_text(f)))
                    .collect(),
            },
            Mutation::ChangeTag { path, tag } => Mutation::ChangeTag {
                path: f(path),
                tag: f(tag),
            },
            Mutation::RemoveElement { path } => Mutation::RemoveElement { path: f(path) },
        }
    }
}

/// Outcome of applying one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Number of elements the path matched.
    pub matched: usize,
    /// Canonical paths of the nodes that were written, in document order.
    pub paths: Vec<String>,
}

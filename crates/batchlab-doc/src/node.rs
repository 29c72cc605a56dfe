//! Format-agnostic element/attribute model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive value carried by an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Explicit null (JSON/YAML only).
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Text.
    Str(String),
    /// Sequence of scalars (JSON/YAML arrays of primitives).
    List(Vec<Scalar>),
}

impl Scalar {
    /// Textual form used by text-only backends.
    pub fn as_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Bool(value) => value.to_string(),
            Scalar::Int(value) => value.to_string(),
            Scalar::Float(value) => value.to_string(),
            Scalar::Str(value) => value.clone(),
            Scalar::List(items) => items
                .iter()
                .map(Scalar::as_text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Integer view, parsing strings when needed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(value) => Some(*value),
            Scalar::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            Scalar::Str(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating point view, parsing strings when needed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(value) => Some(*value as f64),
            Scalar::Float(value) => Some(*value),
            Scalar::Str(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Applies `f` to every string inside the value.
    pub fn map_text(&self, f: &dyn Fn(&str) -> String) -> Scalar {
        match self {
            Scalar::Str(text) => Scalar::Str(f(text)),
            Scalar::List(items) => Scalar::List(items.iter().map(|item| item.map_text(f)).collect()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<u64> for Scalar {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Scalar::Int)
            .unwrap_or(Scalar::Float(value as f64))
    }
}

impl From<usize> for Scalar {
    fn from(value: usize) -> Self {
        Scalar::from(value as u64)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

/// Named primitive attached to an element. Attributes never have children.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub(crate) name: String,
    pub(crate) value: Scalar,
    /// Escaped source text, kept until the value changes.
    pub(crate) raw: Option<String>,
}

impl Attribute {
    pub(crate) fn new(name: impl Into<String>, value: Scalar) -> Self {
        Self {
            name: name.into(),
            value,
            raw: None,
        }
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value.
    pub fn value(&self) -> &Scalar {
        &self.value
    }
}

/// Source markup retained for byte-exact re-emission of untouched elements.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Markup {
    pub(crate) open: Option<String>,
    pub(crate) close: Option<String>,
    pub(crate) self_closing: bool,
}

/// One slot in an element's ordered content.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Entry {
    Attr(Attribute),
    Elem(Element),
    /// Text, whitespace or comments carried through untouched.
    Verbatim(String),
}

/// Element node: a tag with ordered attributes and child elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub(crate) tag: String,
    pub(crate) entries: Vec<Entry>,
    pub(crate) markup: Markup,
    /// Element came from a sequence and must be written back as one.
    pub(crate) repeated: bool,
}

impl Element {
    /// Creates an empty element.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            entries: Vec::new(),
            markup: Markup {
                open: None,
                close: None,
                self_closing: true,
            },
            repeated: false,
        }
    }

    /// Element tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Attr(attr) => Some(attr),
            _ => None,
        })
    }

    /// Value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&Scalar> {
        self.attributes()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }

    /// Child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Elem(child) => Some(child),
            _ => None,
        })
    }

    pub(crate) fn has_child_tag(&self, tag: &str) -> bool {
        self.children().any(|child| child.tag == tag)
    }

    pub(crate) fn has_content(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| !matches!(entry, Entry::Attr(_)))
    }

    pub(crate) fn at(&self, addr: &[usize]) -> Option<&Element> {
        let mut current = self;
        for &idx in addr {
            current = match current.entries.get(idx) {
                Some(Entry::Elem(child)) => child,
                _ => return None,
            };
        }
        Some(current)
    }

    pub(crate) fn at_mut(&mut self, addr: &[usize]) -> Option<&mut Element> {
        let mut current = self;
        for &idx in addr {
            current = match current.entries.get_mut(idx) {
                Some(Entry::Elem(child)) => child,
                _ => return None,
            };
        }
        Some(current)
    }

    pub(crate) fn push_attr(&mut self, name: impl Into<String>, value: Scalar) {
        let attr = Attribute::new(name, value);
        let position = self
            .entries
            .iter()
            .rposition(|entry| matches!(entry, Entry::Attr(_)))
            .map(|idx| idx + 1)
            .unwrap_or(0);
        self.entries.insert(position, Entry::Attr(attr));
        self.markup.open = None;
    }

    pub(crate) fn set_attr(&mut self, name: &str, value: Scalar) {
        let existing = self.entries.iter_mut().find_map(|entry| match entry {
            Entry::Attr(attr) if attr.name == name => Some(attr),
            _ => None,
        });
        match existing {
            Some(attr) => {
                attr.value = value;
                attr.raw = None;
                self.markup.open = None;
            }
            None => self.push_attr(name, value),
        }
    }

    pub(crate) fn rename(&mut self, tag: &str) {
        self.tag = tag.to_string();
        self.markup.open = None;
        self.markup.close = None;
    }

    /// Appends `child` after the last child element, reusing the indentation
    /// that precedes existing children. Returns the entry index of the child.
    pub(crate) fn add_child(&mut self, child: Element) -> usize {
        if self.markup.self_closing {
            self.markup.self_closing = false;
            self.markup.open = None;
            self.markup.close = None;
        }
        let last_elem = self
            .entries
            .iter()
            .rposition(|entry| matches!(entry, Entry::Elem(_)));
        match last_elem {
            Some(idx) => {
                let indent = match idx.checked_sub(1).and_then(|prev| self.entries.get(prev)) {
                    Some(Entry::Verbatim(text)) if text.trim().is_empty() => Some(text.clone()),
                    _ => None,
                };
                let mut position = idx + 1;
                if let Some(indent) = indent {
                    self.entries.insert(position, Entry::Verbatim(indent));
                    position += 1;
                }
                self.entries.insert(position, Entry::Elem(child));
                position
            }
            None => {
                self.entries.push(Entry::Elem(child));
                self.entries.len() - 1
            }
        }
    }

    /// Removes the child element at entry `idx` together with the
    /// whitespace that precedes it.
    pub(crate) fn remove_child(&mut self, idx: usize) -> Option<Element> {
        let removed = match self.entries.get(idx) {
            Some(Entry::Elem(_)) => self.entries.remove(idx),
            _ => return None,
        };
        if let Some(prev) = idx.checked_sub(1) {
            if matches!(self.entries.get(prev), Some(Entry::Verbatim(text)) if text.trim().is_empty())
            {
                self.entries.remove(prev);
            }
        }
        match removed {
            Entry::Elem(child) => Some(child),
            _ => None,
        }
    }
}

/// Parsed document: root element plus whatever surrounds it in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub(crate) prolog: String,
    pub(crate) root: Element,
    pub(crate) epilog: String,
}

impl Document {
    /// Wraps a root element without surrounding text.
    pub fn new(root: Element) -> Self {
        Self {
            prolog: String::new(),
            root,
            epilog: String::new(),
        }
    }

    /// Root element.
    pub fn root(&self) -> &Element {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_child_reuses_sibling_indentation() {
        let mut parent = Element::new("robots");
        parent.markup.self_closing = false;
        parent.entries.push(Entry::Verbatim("\n  ".into()));
        parent.entries.push(Entry::Elem(Element::new("robot")));
        parent.entries.push(Entry::Verbatim("\n".into()));
        let idx = parent.add_child(Element::new("robot"));
        assert_eq!(idx, 3);
        assert!(matches!(&parent.entries[2], Entry::Verbatim(text) if text == "\n  "));
        assert!(matches!(&parent.entries[4], Entry::Verbatim(text) if text == "\n"));
    }

    #[test]
    fn scalar_views() {
        assert_eq!(Scalar::from("42").as_i64(), Some(42));
        assert_eq!(Scalar::Float(2.0).as_i64(), Some(2));
        assert_eq!(Scalar::Int(3).as_f64(), Some(3.0));
        assert_eq!(Scalar::List(vec![1i64.into(), "a".into()]).as_text(), "1,a");
    }
}

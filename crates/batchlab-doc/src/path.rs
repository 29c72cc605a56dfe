//! Path expressions over the element tree.
//!
//! Grammar: an optional leading `.`, then steps separated by `/` (child) or
//! `//` (descendant). A step is a tag name or `*`, optionally followed by a
//! zero-based `[k]` selecting among same-tag siblings. A trailing `@name`
//! addresses an attribute of the selected elements.

use std::collections::BTreeSet;
use std::fmt;

use batchlab_core::{BatchError, ErrorInfo};

use crate::node::{Element, Entry};

/// Entry indices from the root down to one element.
pub(crate) type Address = Vec<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    index: Option<usize>,
}

/// Parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
    steps: Vec<Step>,
    attr: Option<String>,
}

fn syntax_error(path: &str, message: impl Into<String>) -> BatchError {
    BatchError::Config(
        ErrorInfo::new("doc.path_syntax", message).with_context("path", path.to_string()),
    )
}

/// Characters that cannot appear in an addressable tag.
pub(crate) fn is_addressable_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag != "*"
        && tag != "."
        && !tag.contains(|c: char| matches!(c, '/' | '@' | '[' | ']') || c.is_whitespace())
}

fn parse_step(path: &str, axis: Axis, raw: &str) -> Result<Step, BatchError> {
    let (name, index) = match raw.find('[') {
        Some(open) => {
            let rest = &raw[open + 1..];
            let digits = rest
                .strip_suffix(']')
                .ok_or_else(|| syntax_error(path, format!("unterminated index in step `{raw}`")))?;
            let index = digits
                .parse::<usize>()
                .map_err(|_| syntax_error(path, format!("invalid index in step `{raw}`")))?;
            (&raw[..open], Some(index))
        }
        None => (raw, None),
    };
    let test = if name == "*" {
        NameTest::Any
    } else if is_addressable_tag(name) {
        NameTest::Tag(name.to_string())
    } else {
        return Err(syntax_error(path, format!("invalid step `{raw}`")));
    };
    Ok(Step { axis, test, index })
}

impl PathExpr {
    /// Parses a path expression.
    pub fn parse(path: &str) -> Result<Self, BatchError> {
        let trimmed = path.trim();
        let (element_part, attr) = match trimmed.rfind('@') {
            Some(at) => {
                let name = &trimmed[at + 1..];
                if name.is_empty() || name.contains('/') {
                    return Err(syntax_error(path, "invalid attribute name"));
                }
                (&trimmed[..at], Some(name.to_string()))
            }
            None => (trimmed, None),
        };

        let mut rest = element_part.strip_prefix('.').unwrap_or(element_part);
        let mut steps = Vec::new();
        if !rest.is_empty() && !rest.starts_with('/') {
            // bare `a/b` is relative to the root
            let (raw, tail) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
            steps.push(parse_step(path, Axis::Child, raw)?);
            rest = tail;
        }
        while !rest.is_empty() {
            let (axis, tail) = match rest.strip_prefix("//") {
                Some(tail) => (Axis::Descendant, tail),
                None => match rest.strip_prefix('/') {
                    Some(tail) => (Axis::Child, tail),
                    None => return Err(syntax_error(path, "expected `/`")),
                },
            };
            let end = tail.find('/').unwrap_or(tail.len());
            let (raw, tail) = tail.split_at(end);
            if raw.is_empty() {
                return Err(syntax_error(path, "empty step"));
            }
            steps.push(parse_step(path, axis, raw)?);
            rest = tail;
        }

        Ok(Self {
            source: trimmed.to_string(),
            steps,
            attr,
        })
    }

    /// Attribute name when the expression addresses attributes.
    pub fn attr(&self) -> Option<&str> {
        self.attr.as_deref()
    }

    /// Whether the element part selects only the root.
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    /// Resolves the element part to addresses in document order.
    pub(crate) fn select(&self, root: &Element) -> Vec<Address> {
        let mut current: BTreeSet<Address> = BTreeSet::new();
        current.insert(Vec::new());
        for step in &self.steps {
            let mut next = BTreeSet::new();
            for addr in &current {
                let Some(element) = root.at(addr) else {
                    continue;
                };
                match step.axis {
                    Axis::Child => collect_children(element, addr, step, &mut next),
                    Axis::Descendant => {
                        let mut stack = vec![(element, addr.clone())];
                        while let Some((node, node_addr)) = stack.pop() {
                            collect_children(node, &node_addr, step, &mut next);
                            for (idx, entry) in node.entries.iter().enumerate() {
                                if let Entry::Elem(child) = entry {
                                    let mut child_addr = node_addr.clone();
                                    child_addr.push(idx);
                                    stack.push((child, child_addr));
                                }
                            }
                        }
                    }
                }
            }
            current = next;
        }
        current.into_iter().collect()
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn collect_children(element: &Element, addr: &Address, step: &Step, out: &mut BTreeSet<Address>) {
    let mut seen: Vec<&str> = Vec::new();
    for (idx, entry) in element.entries.iter().enumerate() {
        let Entry::Elem(child) = entry else {
            continue;
        };
        let position = seen.iter().filter(|tag| **tag == child.tag).count();
        seen.push(&child.tag);
        let name_ok = match &step.test {
            NameTest::Any => true,
            NameTest::Tag(tag) => *tag == child.tag,
        };
        if name_ok && step.index.map_or(true, |want| want == position) {
            let mut child_addr = addr.clone();
            child_addr.push(idx);
            out.insert(child_addr);
        }
    }
}

/// Canonical path of the element at `addr`. Indices appear only where
/// same-tag siblings exist, so every node has exactly one canonical path.
pub(crate) fn canonical_path(root: &Element, addr: &[usize]) -> String {
    if addr.is_empty() {
        return ".".to_string();
    }
    let mut out = String::from(".");
    let mut current = root;
    for &idx in addr {
        let Some(Entry::Elem(child)) = current.entries.get(idx) else {
            break;
        };
        let same: Vec<usize> = current
            .entries
            .iter()
            .enumerate()
            .filter_map(|(pos, entry)| match entry {
                Entry::Elem(sibling) if sibling.tag == child.tag => Some(pos),
                _ => None,
            })
            .collect();
        out.push('/');
        out.push_str(&child.tag);
        if same.len() > 1 {
            if let Some(k) = same.iter().position(|pos| *pos == idx) {
                out.push_str(&format!("[{k}]"));
            }
        }
        current = child;
    }
    out
}

/// Canonical path of an attribute.
pub(crate) fn canonical_attr_path(root: &Element, addr: &[usize], attr: &str) -> String {
    let base = canonical_path(root, addr);
    if base == "." {
        format!(".@{attr}")
    } else {
        format!("{base}@{attr}")
    }
}

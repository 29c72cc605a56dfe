//! Mapping between key/value documents (JSON, YAML) and the element model.
//!
//! Maps become elements, primitive values and arrays of primitives become
//! attributes, and arrays of maps become runs of same-tag sibling elements.

use batchlab_core::{BatchError, ErrorInfo};

use crate::node::{Attribute, Element, Entry, Scalar};
use crate::path::is_addressable_tag;

/// Backend-neutral key/value tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Plain {
    Scalar(Scalar),
    Map(Vec<(String, Plain)>),
    Seq(Vec<Plain>),
}

fn malformed(code: &str, message: impl Into<String>, key: &str) -> BatchError {
    BatchError::MalformedDocument(ErrorInfo::new(code, message).with_context("key", key.to_string()))
}

/// Builds the root element from a top-level map.
pub(crate) fn root_from_map(entries: Vec<(String, Plain)>) -> Result<Element, BatchError> {
    element_from_map(String::new(), entries, false)
}

fn element_from_map(tag: String, entries: Vec<(String, Plain)>, repeated: bool) -> Result<Element, BatchError> {
    let mut element = Element::new(tag);
    element.repeated = repeated;
    element.markup.self_closing = false;
    for (key, value) in entries {
        if !is_addressable_tag(&key) {
            return Err(malformed("doc.key_syntax", "key cannot be addressed by a path", &key));
        }
        match value {
            Plain::Scalar(scalar) => element.entries.push(Entry::Attr(Attribute::new(key, scalar))),
            Plain::Map(map) => {
                let child = element_from_map(key, map, false)?;
                element.entries.push(Entry::Elem(child));
            }
            Plain::Seq(items) => {
                if items.iter().all(|item| matches!(item, Plain::Map(_))) && !items.is_empty() {
                    for item in items {
                        if let Plain::Map(map) = item {
                            let child = element_from_map(key.clone(), map, true)?;
                            element.entries.push(Entry::Elem(child));
                        }
                    }
                } else {
                    let list = scalar_list(items, &key)?;
                    element.entries.push(Entry::Attr(Attribute::new(key, list)));
                }
            }
        }
    }
    Ok(element)
}

fn scalar_list(items: Vec<Plain>, key: &str) -> Result<Scalar, BatchError> {
    items
        .into_iter()
        .map(|item| match item {
            Plain::Scalar(scalar) => Ok(scalar),
            Plain::Seq(_) => Err(malformed(
                "doc.nested_sequence",
                "sequences of sequences cannot be addressed by a path",
                key,
            )),
            Plain::Map(_) => Err(malformed(
                "doc.mixed_sequence",
                "sequence mixes maps with primitive values",
                key,
            )),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Scalar::List)
}

/// Flattens an element back into ordered key/value pairs. Same-tag children
/// are grouped into one sequence at the position of the first of them.
pub(crate) fn map_from_element(element: &Element) -> Vec<(String, Plain)> {
    let mut out: Vec<(String, Plain)> = Vec::new();
    let mut emitted: Vec<&str> = Vec::new();
    for entry in &element.entries {
        match entry {
            Entry::Attr(attr) => out.push((attr.name.clone(), plain_from_scalar(&attr.value))),
            Entry::Elem(child) => {
                if emitted.contains(&child.tag.as_str()) {
                    continue;
                }
                emitted.push(&child.tag);
                let group: Vec<&Element> = element
                    .children()
                    .filter(|sibling| sibling.tag == child.tag)
                    .collect();
                let value = if group.len() > 1 || child.repeated {
                    Plain::Seq(
                        group
                            .into_iter()
                            .map(|member| Plain::Map(map_from_element(member)))
                            .collect(),
                    )
                } else {
                    Plain::Map(map_from_element(child))
                };
                out.push((child.tag.clone(), value));
            }
            Entry::Verbatim(_) => {}
        }
    }
    out
}

fn plain_from_scalar(scalar: &Scalar) -> Plain {
    match scalar {
        Scalar::List(items) => Plain::Seq(items.iter().map(plain_from_scalar).collect()),
        other => Plain::Scalar(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_of_maps_become_repeated_elements() {
        let plain = vec![(
            "robots".to_string(),
            Plain::Seq(vec![
                Plain::Map(vec![("id".into(), Plain::Scalar(Scalar::Int(1)))]),
                Plain::Map(vec![("id".into(), Plain::Scalar(Scalar::Int(2)))]),
            ]),
        )];
        let root = root_from_map(plain.clone()).expect("root");
        assert_eq!(root.children().count(), 2);
        assert_eq!(map_from_element(&root), plain);
    }

    #[test]
    fn single_element_sequence_stays_a_sequence() {
        let plain = vec![(
            "robots".to_string(),
            Plain::Seq(vec![Plain::Map(vec![("id".into(), Plain::Scalar(Scalar::Int(1)))])]),
        )];
        let root = root_from_map(plain.clone()).expect("root");
        assert_eq!(map_from_element(&root), plain);
    }

    #[test]
    fn mixed_sequences_are_rejected() {
        let plain = vec![(
            "mixed".to_string(),
            Plain::Seq(vec![Plain::Map(Vec::new()), Plain::Scalar(Scalar::Int(1))]),
        )];
        let err = root_from_map(plain).expect_err("mixed");
        assert_eq!(err.info().code, "doc.mixed_sequence");
    }
}

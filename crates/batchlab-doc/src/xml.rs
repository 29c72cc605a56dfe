//! XML backend.
//!
//! Untouched markup is re-emitted from the source text, so parse followed by
//! write reproduces the input byte for byte. Edited elements regenerate their
//! open tag; new elements borrow the indentation of their siblings.

use std::io::Write;
use std::str;

use batchlab_core::{BatchError, DocumentFormat, ErrorInfo};
use quick_xml::escape::{escape, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::backend::{write_error, EditScope, FormatBackend, MatchPolicy, ParentScope};
use crate::node::{Attribute, Document, Element, Entry, Markup, Scalar};

/// Backend for XML documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlBackend;

fn malformed(code: &str, err: impl ToString) -> BatchError {
    BatchError::MalformedDocument(ErrorInfo::new(code, err.to_string()))
}

fn utf8(bytes: &[u8]) -> Result<&str, BatchError> {
    str::from_utf8(bytes).map_err(|err| malformed("doc.xml_utf8", err))
}

fn element_from_start(start: &BytesStart<'_>, raw: String, empty: bool) -> Result<Element, BatchError> {
    let tag = utf8(start.name().as_ref())?.to_string();
    let mut element = Element::new(tag);
    element.markup = Markup {
        open: Some(raw),
        close: None,
        self_closing: empty,
    };
    for attr in start.attributes() {
        let attr = attr.map_err(|err| malformed("doc.xml_attribute", err))?;
        let name = utf8(attr.key.as_ref())?.to_string();
        let raw_value = utf8(&attr.value)?.to_string();
        let value = unescape(&raw_value)
            .map_err(|err| malformed("doc.xml_escape", err).with_context("attr", name.clone()))?
            .into_owned();
        element.entries.push(Entry::Attr(Attribute {
            name,
            value: Scalar::Str(value),
            raw: Some(raw_value),
        }));
    }
    Ok(element)
}

fn attach(element: Element, stack: &mut Vec<Element>, root: &mut Option<Element>) -> Result<(), BatchError> {
    if let Some(parent) = stack.last_mut() {
        parent.entries.push(Entry::Elem(element));
        return Ok(());
    }
    if root.is_some() {
        return Err(malformed("doc.xml_roots", "more than one root element")
            .with_context("tag", element.tag));
    }
    *root = Some(element);
    Ok(())
}

impl FormatBackend for XmlBackend {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Xml
    }

    fn policy(&self) -> MatchPolicy {
        MatchPolicy {
            edit: EditScope::FirstMatch,
            parent: ParentScope::Unique,
            shared_keys: false,
        }
    }

    fn parse(&self, source: &str) -> Result<Document, BatchError> {
        let mut reader = Reader::from_str(source);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut prolog = String::new();
        let mut epilog = String::new();

        loop {
            let offset = reader.buffer_position();
            let event = reader.read_event().map_err(|err| {
                malformed("doc.xml_parse", err).with_context("offset", offset.to_string())
            })?;
            let (raw, is_text) = match event {
                Event::Start(start) => {
                    let raw = format!("<{}>", utf8(&start)?);
                    stack.push(element_from_start(&start, raw, false)?);
                    continue;
                }
                Event::Empty(start) => {
                    let raw = format!("<{}/>", utf8(&start)?);
                    let element = element_from_start(&start, raw, true)?;
                    attach(element, &mut stack, &mut root)?;
                    continue;
                }
                Event::End(end) => {
                    let mut element = stack.pop().ok_or_else(|| {
                        malformed("doc.xml_unbalanced", "closing tag without an open element")
                    })?;
                    element.markup.close = Some(format!("</{}>", utf8(&end)?));
                    attach(element, &mut stack, &mut root)?;
                    continue;
                }
                Event::Eof => break,
                Event::Text(text) => (utf8(&text)?.to_string(), true),
                Event::CData(data) => (format!("<![CDATA[{}]]>", utf8(&data)?), true),
                Event::Comment(comment) => (format!("<!--{}-->", utf8(&comment)?), false),
                Event::Decl(decl) => (format!("<?{}?>", utf8(&decl)?), false),
                Event::PI(pi) => (format!("<?{}?>", utf8(&pi)?), false),
                Event::DocType(doctype) => (format!("<!DOCTYPE {}>", utf8(&doctype)?.trim()), false),
            };
            if let Some(parent) = stack.last_mut() {
                parent.entries.push(Entry::Verbatim(raw));
            } else if is_text && !raw.trim().is_empty() {
                return Err(malformed("doc.xml_stray_text", "text outside the root element"));
            } else if root.is_none() {
                prolog.push_str(&raw);
            } else {
                epilog.push_str(&raw);
            }
        }

        if let Some(open) = stack.last() {
            return Err(malformed("doc.xml_unclosed", "element is never closed")
                .with_context("tag", open.tag.clone()));
        }
        let root = root.ok_or_else(|| malformed("doc.xml_empty", "document has no root element"))?;
        Ok(Document {
            prolog,
            root,
            epilog,
        })
    }

    fn write(&self, document: &Document, out: &mut dyn Write) -> Result<(), BatchError> {
        let mut text = String::with_capacity(document.prolog.len() + document.epilog.len() + 256);
        text.push_str(&document.prolog);
        write_element(&document.root, &mut text);
        text.push_str(&document.epilog);
        out.write_all(text.as_bytes()).map_err(write_error)
    }
}

fn write_element(element: &Element, out: &mut String) {
    let leaf = element.markup.self_closing && !element.has_content();
    match &element.markup.open {
        Some(raw) => out.push_str(raw),
        None => {
            out.push('<');
            out.push_str(&element.tag);
            for attr in element.attributes() {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                // Raw text from a single-quoted source may hold a bare `"`.
                match &attr.raw {
                    Some(raw) if !raw.contains('"') => out.push_str(raw),
                    _ => out.push_str(&escape(&attr.value.as_text())),
                }
                out.push('"');
            }
            out.push_str(if leaf { "/>" } else { ">" });
        }
    }
    if leaf {
        return;
    }
    for entry in &element.entries {
        match entry {
            Entry::Elem(child) => write_element(child, out),
            Entry::Verbatim(text) => out.push_str(text),
            Entry::Attr(_) => {}
        }
    }
    match &element.markup.close {
        Some(raw) => out.push_str(raw),
        None => {
            out.push_str("</");
            out.push_str(&element.tag);
            out.push('>');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(source: &str) -> String {
        let document = XmlBackend.parse(source).expect("parse");
        let mut out = Vec::new();
        XmlBackend.write(&document, &mut out).expect("write");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn untouched_document_is_byte_exact() {
        let source = "<?xml version=\"1.0\" ?>\n<!-- arena -->\n<argos-configuration>\n  <framework>\n    <experiment length=\"0\" ticks_per_second=\"10\"/>\n  </framework>\n  <loop_functions label=\"a &amp; b\">text</loop_functions>\n</argos-configuration>\n";
        assert_eq!(roundtrip(source), source);
    }

    #[test]
    fn attribute_values_are_unescaped() {
        let document = XmlBackend
            .parse("<root label=\"a &amp; b\"/>")
            .expect("parse");
        assert_eq!(document.root.attribute("label"), Some(&Scalar::from("a & b")));
    }

    #[test]
    fn rejects_multiple_roots_and_unclosed_tags() {
        let err = XmlBackend.parse("<a/><b/>").expect_err("two roots");
        assert_eq!(err.info().code, "doc.xml_roots");
        let err = XmlBackend.parse("<a><b></b>").expect_err("unclosed");
        assert!(matches!(err, BatchError::MalformedDocument(_)));
        let err = XmlBackend.parse("").expect_err("empty");
        assert_eq!(err.info().code, "doc.xml_empty");
    }
}

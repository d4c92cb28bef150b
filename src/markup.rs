//! Minimal markup tree over `quick-xml`.
//!
//! The reader builds a small element tree where every element remembers the
//! byte range of its inner markup in the source text. Opaque reply sections
//! are cut out of the source with that range, so they are never re-serialized.

use std::io::Write;
use std::ops::Range;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::errors::ExchangeError;

/// One element of a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name as written (`xs:element`, `request`, ...).
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    /// Unescaped character data directly inside this element.
    pub text: String,
    /// Byte range of the inner markup within the parsed source.
    pub inner: Range<usize>,
}

impl Element {
    fn new(name: String, attributes: Vec<(String, String)>, inner_start: usize) -> Self {
        Self {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
            inner: inner_start..inner_start,
        }
    }

    /// Name without a namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.local_name() == name)
    }
}

/// Strips a namespace prefix from a qualified name.
pub fn local(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, l)| l).unwrap_or(name)
}

fn malformed(msg: impl Into<String>) -> ExchangeError {
    ExchangeError::MalformedDocument(msg.into())
}

fn utf8(bytes: &[u8]) -> Result<String, ExchangeError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| malformed(format!("invalid UTF-8 in name: {}", e)))
}

fn read_attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, ExchangeError> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(format!("bad attribute: {}", e)))?;
        let key = utf8(attr.key.as_ref())?;
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

/// Parses a complete document into its root element.
///
/// Fails with `MalformedDocument` on anything that is not a single
/// well-formed root element (mismatched tags, stray text, truncation).
pub fn parse(src: &str) -> Result<Element, ExchangeError> {
    let mut reader = Reader::from_str(src);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event()?;
        match event {
            Event::Start(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(malformed("more than one root element"));
                }
                let name = utf8(start.name().as_ref())?;
                let attributes = read_attributes(&start)?;
                stack.push(Element::new(name, attributes, reader.buffer_position()));
            }
            Event::Empty(start) => {
                if root.is_some() && stack.is_empty() {
                    return Err(malformed("more than one root element"));
                }
                let name = utf8(start.name().as_ref())?;
                let attributes = read_attributes(&start)?;
                let element = Element::new(name, attributes, reader.buffer_position());
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(end) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| malformed("closing tag without an opening tag"))?;
                if end.name().as_ref() != element.name.as_bytes() {
                    return Err(malformed(format!(
                        "expected </{}>, found </{}>",
                        element.name,
                        String::from_utf8_lossy(end.name().as_ref())
                    )));
                }
                // The end tag is the last "</" before the reader position.
                let after = reader.buffer_position();
                let end_start = src[..after]
                    .rfind("</")
                    .ok_or_else(|| malformed("cannot locate end tag"))?;
                element.inner.end = end_start.max(element.inner.start);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                let value = text.unescape()?;
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&value),
                    None if value.trim().is_empty() => {}
                    None => return Err(malformed("text outside of the root element")),
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                match stack.last_mut() {
                    Some(current) => current.text.push_str(&value),
                    None => return Err(malformed("CDATA outside of the root element")),
                }
            }
            Event::Decl(_) | Event::PI(_) | Event::Comment(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("unexpected end of document inside <{}>", open.name)));
    }
    root.ok_or_else(|| malformed("document has no root element"))
}

/// Thin helper over `quick_xml::Writer` for building documents field by field.
pub struct MarkupWriter {
    writer: Writer<Vec<u8>>,
}

impl MarkupWriter {
    /// Starts a document with a declaration naming `encoding`.
    pub fn with_declaration(encoding: &str) -> Result<Self, ExchangeError> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some(encoding), None)))?;
        writer.get_mut().push(b'\n');
        Ok(Self { writer })
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), ExchangeError> {
        let mut start = BytesStart::new(name);
        for attr in attributes {
            start.push_attribute(*attr);
        }
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<(), ExchangeError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    /// Writes `<name>value</name>` with the value escaped.
    pub fn leaf(&mut self, name: &str, value: impl std::fmt::Display) -> Result<(), ExchangeError> {
        self.start(name, &[])?;
        let value = value.to_string();
        if !value.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(&value)))?;
        }
        self.end(name)
    }

    /// Writes a leaf only when the value is present.
    pub fn opt_leaf<T: std::fmt::Display>(
        &mut self,
        name: &str,
        value: Option<T>,
    ) -> Result<(), ExchangeError> {
        match value {
            Some(value) => self.leaf(name, value),
            None => Ok(()),
        }
    }

    /// Writes `<name>raw</name>` with `raw` copied byte for byte.
    pub fn verbatim(&mut self, name: &str, raw: &[u8]) -> Result<(), ExchangeError> {
        self.start(name, &[])?;
        self.writer
            .get_mut()
            .write_all(raw)
            .map_err(|e| malformed(e.to_string()))?;
        self.end(name)
    }

    pub fn finish(self) -> Result<String, ExchangeError> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| malformed(format!("writer produced invalid UTF-8: {}", e)))
    }
}

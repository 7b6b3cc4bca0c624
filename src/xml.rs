//! Lightweight XML support for the packaging documents
//!
//! The container descriptor, package document and navigation document
//! are all small XML files, so they are parsed eagerly into an owned
//! element tree instead of being streamed. The tree keeps local
//! element names, the raw attribute map and concatenated text; none of
//! the packaging parses need namespace resolution, so prefixes are
//! kept verbatim in attribute keys (`epub:type` stays `epub:type`).

use std::collections::HashMap;

use quick_xml::{Reader, events::Event};

use crate::error::ReaderError;

/// An element node of a parsed XML document.
#[derive(Debug, Default)]
pub struct XmlNode {
    /// Local element name, prefix stripped.
    pub name: String,

    /// Attributes as written, keys including any namespace prefix.
    pub attributes: HashMap<String, String>,

    /// Direct text content of this element.
    pub text: String,

    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Returns the value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Child elements with the given local name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// First child element whose local name is in `names`.
    pub fn first_child_of<'a>(&'a self, names: &[&str]) -> Option<&'a XmlNode> {
        self.children
            .iter()
            .find(|child| names.contains(&child.name.as_str()))
    }

    /// Depth-first search for the first descendant with the given
    /// local name. The node itself is a candidate.
    pub fn descendant(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.descendant(name))
    }

    /// Depth-first collection of every descendant with the given name.
    pub fn descendants(&self, name: &str) -> Vec<&XmlNode> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a XmlNode>) {
        if self.name == name {
            found.push(self);
        }
        for child in &self.children {
            child.collect_descendants(name, found);
        }
    }

    /// Concatenated text of this element and all of its descendants,
    /// trimmed at both ends.
    pub fn collected_text(&self) -> String {
        let mut text = String::new();
        self.append_text(&mut text);
        text.trim().to_string()
    }

    fn append_text(&self, out: &mut String) {
        if !self.text.is_empty() {
            out.push_str(&self.text);
        }
        for child in &self.children {
            child.append_text(out);
        }
    }
}

/// Parses an XML document string into its root element
///
/// ## Parameters
/// - `content`: The XML document text
///
/// ## Return
/// - `Ok(XmlNode)`: The root element of the document
/// - `Err(ReaderError)`: Empty input, malformed markup, or an event
///   stream that ends before the root element is closed
pub fn parse_document(content: &str) -> Result<XmlNode, ReaderError> {
    if content.trim().is_empty() {
        return Err(ReaderError::EmptyData);
    }

    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack = Vec::<XmlNode>::new();
    let mut root = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,

            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let mut node = XmlNode::new(name);
                read_attributes(&e, &mut node);
                stack.push(node);
            }

            Ok(Event::End(_)) => {
                if let Some(node) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => root = Some(node),
                    }
                }
            }

            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let mut node = XmlNode::new(name);
                read_attributes(&e, &mut node);

                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    // A self-closing root element is legal, if unusual.
                    None => root = Some(node),
                }
            }

            Ok(Event::Text(e)) => {
                if let Some(node) = stack.last_mut() {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    if !text.trim().is_empty() {
                        node.text.push_str(&text);
                    }
                }
            }

            Ok(Event::CData(e)) => {
                if let Some(node) = stack.last_mut() {
                    node.text
                        .push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }

            Err(err) => return Err(err.into()),

            // Comments, PIs, declarations, doctypes and entity
            // references carry nothing the packaging parses need.
            _ => continue,
        }
    }

    root.ok_or(ReaderError::FailedParsingXml)
}

fn read_attributes(e: &quick_xml::events::BytesStart<'_>, node: &mut XmlNode) {
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = String::from_utf8_lossy(&attr.value).to_string();
        node.attributes.insert(key, value);
    }
}

/// Decodes raw file bytes into text
///
/// Handles the encodings book files appear in: UTF-8 with or without a
/// BOM, and UTF-16 in either byte order (BOM required). Anything else
/// falls back to lossy UTF-8 so that parsing stays best-effort rather
/// than aborting a whole book over one bad byte.
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [] => String::new(),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).to_string(),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

fn decode_utf16(bytes: &[u8], combine: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| combine([pair[0], pair[1]]))
        .collect();

    String::from_utf16_lossy(&units)
}

/// Collapses runs of whitespace into single spaces and trims the ends.
///
/// Applied to every title and label pulled out of XML text, where
/// pretty-printed sources otherwise leak their indentation.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

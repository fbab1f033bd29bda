//! SAX-style XML event source built on `quick-xml`.
//!
//! The driver in this module owns no feed logic. It pulls events from a
//! [`quick_xml::Reader`], tracks `xmlns` declarations, and pushes plain
//! callbacks into an [`XmlHandler`]:
//!
//! - namespace map changes are reported *before* the start tag that depends on
//!   them, and again after the end tag of the element that declared them
//! - character data is delivered before the tag boundary it belongs to
//! - tag names are passed with their optional `prefix:` part intact; resolving
//!   the prefix is up to the handler
//!
//! Any handler callback may return [`ControlFlow::Break`] to stop reading. The
//! driver checks the value after every call and returns
//! [`ReadStatus::Interrupted`] without pulling another event.

mod namespace;

use std::io::BufRead;
use std::ops::ControlFlow;
use std::rc::Rc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;

pub use namespace::{NamespaceMap, ATOM_NS, XHTML_NS, XML_NS};

/// Errors raised by the event source. These are stream-level failures; the
/// handlers never produce them.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The input is not well-formed XML (or could not be read).
    #[error("XML parse error at byte {position}: {message}")]
    Parse { position: u64, message: String },

    /// The input ended while elements were still open.
    #[error("Unexpected end of input with {open_elements} unclosed element(s)")]
    UnexpectedEof { open_elements: usize },
}

/// How a read finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// The whole document was consumed.
    Completed,
    /// A handler asked to stop before the end of the document.
    Interrupted,
}

/// Ordered attribute list of a start tag. Namespace declarations are not
/// included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of the first attribute with exactly this (possibly prefixed) name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Receiver of the event stream.
pub trait XmlHandler {
    /// The prefix→URI map in effect changed. Called before the start tag that
    /// introduced the change and after the end tag that drops it.
    fn namespace_map_changed(&mut self, _namespaces: Rc<NamespaceMap>) {}

    fn start_element(&mut self, tag: &str, attributes: &Attributes) -> ControlFlow<()>;

    fn end_element(&mut self, tag: &str) -> ControlFlow<()>;

    /// A chunk of character data. A single text node may arrive in several
    /// chunks (entity boundaries, CDATA sections).
    fn character_data(&mut self, data: &str);
}

/// Reads an XML document from `source`, pushing events into `handler`.
pub fn read<R: BufRead, H: XmlHandler + ?Sized>(
    source: R,
    handler: &mut H,
) -> Result<ReadStatus, XmlError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; unknown
    // entity references fail in `unescape()` and surface as parse errors.
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut buf = Vec::new();
    // One frame per open element: the map that was replaced by this element's
    // declarations, if it declared any.
    let mut scopes: Vec<Option<Rc<NamespaceMap>>> = Vec::new();
    let mut namespaces = Rc::new(NamespaceMap::new());

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| parse_error(&reader, e))?;

        let flow = match event {
            Event::Start(e) => {
                let tag = decode(&reader, e.name().as_ref())?;
                let (attributes, declarations) = split_attributes(&reader, &e)?;

                if declarations.is_empty() {
                    scopes.push(None);
                } else {
                    let mut changed = (*namespaces).clone();
                    for (prefix, uri) in declarations {
                        changed.declare(prefix, uri);
                    }
                    let previous = std::mem::replace(&mut namespaces, Rc::new(changed));
                    scopes.push(Some(previous));
                    handler.namespace_map_changed(Rc::clone(&namespaces));
                }

                handler.start_element(&tag, &attributes)
            }
            Event::End(e) => {
                let tag = decode(&reader, e.name().as_ref())?;
                let flow = handler.end_element(&tag);
                if let Some(Some(previous)) = scopes.pop() {
                    namespaces = previous;
                    if flow.is_continue() {
                        handler.namespace_map_changed(Rc::clone(&namespaces));
                    }
                }
                flow
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| parse_error(&reader, err))?;
                if !text.is_empty() {
                    handler.character_data(&text);
                }
                ControlFlow::Continue(())
            }
            Event::CData(e) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| parse_error(&reader, err))?;
                if !text.is_empty() {
                    handler.character_data(&text);
                }
                ControlFlow::Continue(())
            }
            Event::Eof => {
                if !scopes.is_empty() {
                    return Err(XmlError::UnexpectedEof {
                        open_elements: scopes.len(),
                    });
                }
                return Ok(ReadStatus::Completed);
            }
            // Declarations, comments, processing instructions and DOCTYPE carry
            // nothing a handler needs.
            _ => ControlFlow::Continue(()),
        };

        if flow.is_break() {
            return Ok(ReadStatus::Interrupted);
        }
        buf.clear();
    }
}

/// Splits a start tag's attributes into ordinary attributes and namespace
/// declarations (`xmlns` → default prefix `""`, `xmlns:p` → `p`).
fn split_attributes<R>(
    reader: &Reader<R>,
    start: &BytesStart<'_>,
) -> Result<(Attributes, Vec<(String, String)>), XmlError> {
    let mut attributes = Attributes::new();
    let mut declarations = Vec::new();
    let decoder = reader.decoder();

    for attr_result in start.attributes() {
        let attr = attr_result.map_err(|e| parse_error(reader, e))?;
        let key = decode(reader, attr.key.as_ref())?;
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| parse_error(reader, e))?
            .into_owned();

        if key == "xmlns" {
            declarations.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push((prefix.to_string(), value));
        } else {
            attributes.push(key, value);
        }
    }

    Ok((attributes, declarations))
}

fn decode<R>(reader: &Reader<R>, bytes: &[u8]) -> Result<String, XmlError> {
    reader
        .decoder()
        .decode(bytes)
        .map(|s| s.into_owned())
        .map_err(|e| parse_error(reader, e))
}

fn parse_error<R>(reader: &Reader<R>, err: impl std::fmt::Display) -> XmlError {
    XmlError::Parse {
        position: reader.buffer_position() as u64,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every callback as a line of text.
    #[derive(Default)]
    struct Trace {
        lines: Vec<String>,
        stop_at: Option<String>,
    }

    impl XmlHandler for Trace {
        fn namespace_map_changed(&mut self, namespaces: Rc<NamespaceMap>) {
            self.lines.push(format!(
                "ns default={}",
                namespaces.resolve("").unwrap_or("-")
            ));
        }

        fn start_element(&mut self, tag: &str, attributes: &Attributes) -> ControlFlow<()> {
            let attrs: Vec<String> = attributes.iter().map(|(k, v)| format!("{k}={v}")).collect();
            self.lines.push(format!("start {tag} [{}]", attrs.join(",")));
            if self.stop_at.as_deref() == Some(tag) {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(())
        }

        fn end_element(&mut self, tag: &str) -> ControlFlow<()> {
            self.lines.push(format!("end {tag}"));
            ControlFlow::Continue(())
        }

        fn character_data(&mut self, data: &str) {
            if !data.trim().is_empty() {
                self.lines.push(format!("text {data}"));
            }
        }
    }

    #[test]
    fn test_namespace_change_precedes_start_tag() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><id>x</id></feed>"#;
        let mut trace = Trace::default();
        let status = read(xml.as_bytes(), &mut trace).unwrap();

        assert_eq!(status, ReadStatus::Completed);
        assert_eq!(
            trace.lines,
            vec![
                "ns default=http://www.w3.org/2005/Atom",
                "start feed []",
                "start id []",
                "text x",
                "end id",
                "end feed",
                "ns default=-",
            ]
        );
    }

    #[test]
    fn test_empty_element_expands_to_start_and_end() {
        let xml = r#"<root><link href="a" rel="b"/></root>"#;
        let mut trace = Trace::default();
        read(xml.as_bytes(), &mut trace).unwrap();

        assert_eq!(
            trace.lines,
            vec!["start root []", "start link [href=a,rel=b]", "end link", "end root"]
        );
    }

    #[test]
    fn test_xmlns_attributes_are_not_passed_on() {
        let xml = r#"<a:root xmlns:a="urn:a" b="1"/>"#;
        let mut trace = Trace::default();
        read(xml.as_bytes(), &mut trace).unwrap();

        assert_eq!(trace.lines[1], "start a:root [b=1]");
    }

    #[test]
    fn test_entities_and_cdata_are_delivered_as_text() {
        let xml = "<t>a &amp; b<![CDATA[<c>]]></t>";
        let mut trace = Trace::default();
        read(xml.as_bytes(), &mut trace).unwrap();

        let text: String = trace
            .lines
            .iter()
            .filter_map(|l| l.strip_prefix("text "))
            .collect();
        assert_eq!(text, "a & b<c>");
    }

    #[test]
    fn test_break_stops_reading() {
        let xml = "<root><stop/><after/></root>";
        let mut trace = Trace {
            stop_at: Some("stop".to_string()),
            ..Default::default()
        };
        let status = read(xml.as_bytes(), &mut trace).unwrap();

        assert_eq!(status, ReadStatus::Interrupted);
        assert_eq!(trace.lines.last().map(String::as_str), Some("start stop []"));
    }

    #[test]
    fn test_mismatched_end_tag_is_error() {
        let mut trace = Trace::default();
        let result = read("<a><b></a>".as_bytes(), &mut trace);
        assert!(matches!(result, Err(XmlError::Parse { .. })));
    }

    #[test]
    fn test_truncated_input_is_error() {
        let mut trace = Trace::default();
        let result = read("<a><b>text".as_bytes(), &mut trace);
        assert!(matches!(result, Err(XmlError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_unknown_entity_is_error() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE t [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<t>&xxe;</t>"#;
        let mut trace = Trace::default();
        let result = read(xml.as_bytes(), &mut trace);
        assert!(result.is_err(), "custom entities must never expand");
    }

    #[test]
    fn test_attributes_lookup() {
        let attrs: Attributes = [("href", "x"), ("rel", "y")].into_iter().collect();
        assert_eq!(attrs.get("rel"), Some("y"));
        assert_eq!(attrs.get("type"), None);
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_declared_legacy_encoding_is_decoded() {
        // "Каталог" in windows-1251
        let mut xml = br#"<?xml version="1.0" encoding="windows-1251"?><t n=""#.to_vec();
        xml.extend_from_slice(&[0xCA, 0xE0, 0xF2]);
        xml.extend_from_slice(b"\">");
        xml.extend_from_slice(&[0xCA, 0xE0, 0xF2, 0xE0, 0xEB, 0xEE, 0xE3]);
        xml.extend_from_slice(b"</t>");

        let mut trace = Trace::default();
        let status = read(xml.as_slice(), &mut trace).unwrap();

        assert_eq!(status, ReadStatus::Completed);
        assert_eq!(trace.lines, vec!["start t [n=Кат]", "text Каталог", "end t"]);
    }
}

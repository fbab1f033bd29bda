//! Text constructs: `<title>`, `<subtitle>`, `<summary>` and `<content>`.
//!
//! The body of a text construct is plain text, escaped HTML, or inline XHTML
//! depending on its `type` attribute. Either way the consumer gets one plain
//! string. Markup is projected to text, with block boundaries turned into
//! newlines and entities decoded.

use std::borrow::Cow;
use std::str::FromStr;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::Event;
use quick_xml::Reader;

/// Declared content type of a text construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextKind {
    #[default]
    Text,
    Html,
    Xhtml,
}

impl FromStr for TextKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "text/plain" => Ok(TextKind::Text),
            "html" | "text/html" => Ok(TextKind::Html),
            "xhtml" | "application/xhtml+xml" | "text/xhtml" => Ok(TextKind::Xhtml),
            _ => Err(()),
        }
    }
}

/// A nested start or end tag seen inside a text construct.
#[derive(Debug, Clone, Copy)]
pub enum Markup<'a> {
    Open { name: &'a str },
    Close { name: &'a str },
}

/// Collects the body of the text construct currently being read.
#[derive(Debug, Default)]
pub struct TextConstruct {
    kind: TextKind,
    raw: String,
    projection: Projection,
}

impl TextConstruct {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new construct. Unknown or missing types are read as plain
    /// text.
    pub fn begin(&mut self, declared_type: Option<&str>) {
        self.kind = declared_type
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();
        self.raw.clear();
        self.projection = Projection::default();
    }

    pub fn kind(&self) -> TextKind {
        self.kind
    }

    /// Adds the character data preceding a nested tag, then the tag itself.
    /// Plain text drops the tag.
    pub fn append(&mut self, markup: Markup<'_>, text: &str) {
        self.push_text(text);
        match (self.kind, markup) {
            (TextKind::Text, _) => {}
            (_, Markup::Open { name }) => self.projection.open(name),
            (_, Markup::Close { name }) => self.projection.close(name),
        }
    }

    /// Completes the construct with its trailing character data. Returns
    /// `None` when the result is empty, and resets the accumulator.
    pub fn finish(&mut self, trailing: &str) -> Option<String> {
        self.push_text(trailing);
        let text = match self.kind {
            TextKind::Text => std::mem::take(&mut self.raw).trim().to_string(),
            TextKind::Html | TextKind::Xhtml => std::mem::take(&mut self.projection).finish(),
        };
        self.kind = TextKind::default();
        (!text.is_empty()).then_some(text)
    }

    fn push_text(&mut self, text: &str) {
        match self.kind {
            TextKind::Text => self.raw.push_str(text),
            // Escaped markup: the character data itself is an HTML fragment.
            TextKind::Html => self.projection.push_html(text),
            // Inline XHTML: the markup already arrived as elements.
            TextKind::Xhtml => self.projection.push_text(text),
        }
    }
}

/// Elements rendered as a line of their own.
const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tr",
    "ul",
];

/// Elements whose content is never shown.
const HIDDEN_ELEMENTS: &[&str] = &["head", "script", "style", "template"];

/// Projects an HTML fragment to plain text.
///
/// The fragment need not be well-formed: end tags may be missing or
/// unmatched, and anything the tokenizer cannot read is kept as text.
pub fn html_to_text(html: &str) -> String {
    let mut projection = Projection::default();
    projection.push_html(html);
    projection.finish()
}

/// Plain-text rendering of markup events, with HTML whitespace rules: runs of
/// whitespace collapse to one space and newlines only come from markup.
#[derive(Debug, Default)]
struct Projection {
    text: String,
    pending_space: bool,
    hidden_depth: usize,
}

impl Projection {
    fn push_text(&mut self, s: &str) {
        if self.hidden_depth > 0 {
            return;
        }
        for c in s.chars() {
            // U+00A0 is not collapsible.
            if c.is_whitespace() && c != '\u{a0}' {
                self.pending_space = true;
            } else {
                if self.pending_space && !self.text.is_empty() && !self.text.ends_with('\n') {
                    self.text.push(' ');
                }
                self.pending_space = false;
                self.text.push(c);
            }
        }
    }

    fn open(&mut self, tag: &str) {
        let name = local_name(tag);
        if HIDDEN_ELEMENTS.contains(&name.as_str()) {
            self.hidden_depth += 1;
        } else if self.hidden_depth == 0 {
            if name == "br" {
                self.line_break();
            } else if BLOCK_ELEMENTS.contains(&name.as_str()) {
                self.block_boundary();
            }
        }
    }

    fn close(&mut self, tag: &str) {
        let name = local_name(tag);
        if HIDDEN_ELEMENTS.contains(&name.as_str()) {
            self.hidden_depth = self.hidden_depth.saturating_sub(1);
        } else if self.hidden_depth == 0 && BLOCK_ELEMENTS.contains(&name.as_str()) {
            self.block_boundary();
        }
    }

    /// A self-closing tag: `<br/>` breaks the line, `<script/>` hides nothing.
    fn empty(&mut self, tag: &str) {
        if !HIDDEN_ELEMENTS.contains(&local_name(tag).as_str()) {
            self.open(tag);
        }
    }

    /// Tokenizes an HTML fragment with a lenient reader and projects its
    /// events.
    fn push_html(&mut self, html: &str) {
        let mut reader = Reader::from_str(html);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            let position = reader.buffer_position() as usize;
            match reader.read_event() {
                Ok(Event::Start(e)) => match tag_name(e.name().as_ref()) {
                    Some(name) => self.open(&name),
                    None => self.push_raw_tag("<", &e, ">"),
                },
                Ok(Event::Empty(e)) => match tag_name(e.name().as_ref()) {
                    Some(name) => self.empty(&name),
                    None => self.push_raw_tag("<", &e, "/>"),
                },
                Ok(Event::End(e)) => match tag_name(e.name().as_ref()) {
                    Some(name) => self.close(&name),
                    None => self.push_raw_tag("</", &e, ">"),
                },
                Ok(Event::Text(e)) => {
                    let raw = String::from_utf8_lossy(&e);
                    self.push_text(&decode_entities(&raw));
                }
                Ok(Event::CData(e)) => self.push_text(&String::from_utf8_lossy(&e)),
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    // Unclosed tag or comment: the rest is not markup.
                    tracing::debug!(error = %e, "keeping unreadable markup as text");
                    self.push_text(&decode_entities(unread(html, position)));
                    break;
                }
            }
        }
    }

    /// `< 2 and 3 >` tokenizes as a tag without a name; show it as written.
    fn push_raw_tag(&mut self, open: &str, content: &[u8], close: &str) {
        let content = String::from_utf8_lossy(content);
        self.push_text(&format!("{open}{}{close}", decode_entities(&content)));
    }

    fn line_break(&mut self) {
        self.trim_trailing_spaces();
        self.text.push('\n');
        self.pending_space = false;
    }

    fn block_boundary(&mut self) {
        self.trim_trailing_spaces();
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.pending_space = false;
    }

    fn trim_trailing_spaces(&mut self) {
        let kept = self.text.trim_end_matches(' ').len();
        self.text.truncate(kept);
    }

    fn finish(self) -> String {
        self.text.trim().to_string()
    }
}

/// Input from `position` on, including a `<` the tokenizer already consumed.
fn unread(html: &str, position: usize) -> &str {
    let start = match position.checked_sub(1) {
        Some(prev) if html.as_bytes().get(prev) == Some(&b'<') => prev,
        _ => position,
    };
    html.get(start..).unwrap_or_default()
}

/// Lowercased local name of a possibly prefixed tag (`xhtml:P` → `p`).
fn local_name(tag: &str) -> String {
    let local = tag.rsplit(':').next().unwrap_or(tag);
    local.to_ascii_lowercase()
}

/// Name of a tokenized HTML tag, or `None` when the tag does not start with a
/// letter and so was never a tag.
fn tag_name(name: &[u8]) -> Option<String> {
    if !name.first().is_some_and(u8::is_ascii_alphabetic) {
        return None;
    }
    Some(local_name(&String::from_utf8_lossy(name)))
}

/// Decodes character and entity references against the HTML5 entity table.
/// References that do not resolve stay as written; the others in the same run
/// are still decoded.
fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    if let Ok(decoded) = unescape_with(text, resolve_html5_entity) {
        return decoded;
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let reference = rest
            .find(';')
            .map(|semi| &rest[..=semi])
            .filter(|r| r.len() > 2 && !r[1..].contains(|c: char| c == '&' || c.is_whitespace()));
        match reference.and_then(|r| Some((r, unescape_with(r, resolve_html5_entity).ok()?))) {
            Some((reference, decoded)) => {
                out.push_str(&decoded);
                rest = &rest[reference.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

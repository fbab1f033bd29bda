//! Streaming ATOM/OPDS feed reader.
//!
//! [`AtomReader`] is a flat state machine driven by the [`crate::xml`] event
//! source. It never builds a document tree: records are assembled in one slot
//! per kind and handed to a [`FeedHandler`] as soon as their end tag is seen.
//!
//! ```
//! use atom_catalog::atom::{parse_feed, FeedCollector};
//!
//! let xml = br#"<feed xmlns="http://www.w3.org/2005/Atom"><title>Books</title></feed>"#;
//! let feed: FeedCollector = parse_feed(xml).unwrap();
//! assert_eq!(feed.metadata.unwrap().title.as_deref(), Some("Books"));
//! ```

mod buffer;
pub mod date;
mod handler;
mod model;
mod reader;
pub mod text;

use std::io::BufRead;

use crate::xml::{self, ReadStatus, XmlError};

pub use date::{DateConstruct, TimeOfDay};
pub use handler::{FeedCollector, FeedHandler};
pub use model::{Author, Category, Entry, FeedMetadata, Icon, Id, Link, Timestamp};
pub use reader::AtomReader;
pub use text::TextKind;

/// Reads a `<feed>` document from `source` into `handler`.
pub fn read_feed<R: BufRead, H: FeedHandler + ?Sized>(
    source: R,
    handler: &mut H,
) -> Result<ReadStatus, XmlError> {
    let mut reader = AtomReader::new(handler);
    xml::read(source, &mut reader)
}

/// Reads a standalone `<entry>` document from `source` into `handler`.
pub fn read_entry<R: BufRead, H: FeedHandler + ?Sized>(
    source: R,
    handler: &mut H,
) -> Result<ReadStatus, XmlError> {
    let mut reader = AtomReader::for_entry(handler);
    xml::read(source, &mut reader)
}

/// Parses a complete feed held in memory.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedCollector, XmlError> {
    let mut collector = FeedCollector::new();
    read_feed(bytes, &mut collector)?;
    Ok(collector)
}

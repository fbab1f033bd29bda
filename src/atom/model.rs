//! Records produced by the feed automaton.
//!
//! Every record keeps the attributes of the start tag it was created from
//! (namespace declarations excluded), so OPDS extensions such as
//! `opds:price` attributes on links stay reachable without special support.

use serde::Serialize;

use super::date::DateConstruct;
use crate::xml::Attributes;

/// Feed-level metadata, handed to the [`FeedHandler`](super::FeedHandler)
/// exactly once per feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedMetadata {
    pub id: Option<Id>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub icon: Option<Icon>,
    pub updated: Option<Timestamp>,
    pub authors: Vec<Author>,
    pub links: Vec<Link>,
    pub categories: Vec<Category>,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl FeedMetadata {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Default::default()
        }
    }
}

/// One `<entry>` of a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Entry {
    pub id: Option<Id>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published: Option<Timestamp>,
    pub updated: Option<Timestamp>,
    pub authors: Vec<Author>,
    pub links: Vec<Link>,
    pub categories: Vec<Category>,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Entry {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Default::default()
        }
    }

    /// First link with the given `rel`. A link without `rel` counts as
    /// `alternate`.
    pub fn link_by_rel(&self, rel: &str) -> Option<&Link> {
        self.links
            .iter()
            .find(|l| l.rel.as_deref().unwrap_or("alternate") == rel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    pub uri: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// `<id>` of a feed or entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Id {
    pub uri: String,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// `<icon>` of a feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Icon {
    pub uri: String,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: Option<String>,
    pub rel: Option<String>,
    pub mime_type: Option<String>,
    pub hreflang: Option<String>,
    pub title: Option<String>,
    /// Advisory length in bytes. Left unset when the attribute is not a
    /// number.
    pub length: Option<u64>,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Link {
    pub fn from_attributes(attributes: Attributes) -> Self {
        let owned = |name: &str| attributes.get(name).map(str::to_string);
        Self {
            href: owned("href"),
            rel: owned("rel"),
            mime_type: owned("type"),
            hreflang: owned("hreflang"),
            title: owned("title"),
            length: attributes
                .get("length")
                .and_then(|v| v.trim().parse::<u64>().ok()),
            attributes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub term: Option<String>,
    pub scheme: Option<String>,
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Category {
    pub fn from_attributes(attributes: Attributes) -> Self {
        let owned = |name: &str| attributes.get(name).map(str::to_string);
        Self {
            term: owned("term"),
            scheme: owned("scheme"),
            label: owned("label"),
            attributes,
        }
    }
}

/// `<updated>` or `<published>` date construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub date: DateConstruct,
    #[serde(skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

/// Author under construction. Only becomes an [`Author`] if it got a name.
#[derive(Debug, Default)]
pub(crate) struct PendingAuthor {
    pub attributes: Attributes,
    pub name: Option<String>,
    pub uri: Option<String>,
    pub email: Option<String>,
}

impl PendingAuthor {
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            ..Default::default()
        }
    }

    pub fn finish(self) -> Option<Author> {
        let name = self.name?;
        Some(Author {
            name,
            uri: self.uri,
            email: self.email,
            attributes: self.attributes,
        })
    }
}

use std::ops::ControlFlow;
use std::rc::Rc;

use super::buffer::{trimmed, CharBuffer};
use super::date::DateConstruct;
use super::handler::FeedHandler;
use super::model::{
    Author, Category, Entry, FeedMetadata, Icon, Id, Link, PendingAuthor, Timestamp,
};
use super::text::{Markup, TextConstruct};
use crate::xml::{Attributes, NamespaceMap, XmlHandler, ATOM_NS};

/// ATOM elements the automaton has transitions for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Feed,
    Entry,
    Author,
    Name,
    Uri,
    Email,
    Id,
    Icon,
    Link,
    Category,
    Title,
    Subtitle,
    Summary,
    Content,
    Updated,
    Published,
}

impl Element {
    fn from_local_name(name: &str) -> Option<Self> {
        Some(match name {
            "feed" => Element::Feed,
            "entry" => Element::Entry,
            "author" => Element::Author,
            "name" => Element::Name,
            "uri" => Element::Uri,
            "email" => Element::Email,
            "id" => Element::Id,
            "icon" => Element::Icon,
            "link" => Element::Link,
            "category" => Element::Category,
            "title" => Element::Title,
            "subtitle" => Element::Subtitle,
            "summary" => Element::Summary,
            "content" => Element::Content,
            "updated" => Element::Updated,
            "published" => Element::Published,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Feed,
    Entry,

    FeedId,
    FeedIcon,
    FeedLink,
    FeedCategory,
    FeedTitle,
    FeedSubtitle,
    FeedUpdated,
    FeedAuthor,
    FeedAuthorName,
    FeedAuthorUri,
    FeedAuthorEmail,

    EntryAuthor,
    EntryId,
    EntryCategory,
    EntryLink,
    EntryPublished,
    EntrySummary,
    EntryContent,
    EntryTitle,
    EntryUpdated,
    EntryAuthorName,
    EntryAuthorUri,
    EntryAuthorEmail,
}

impl State {
    /// The element a text-construct state was entered for.
    fn text_construct(self) -> Option<Element> {
        match self {
            State::FeedTitle | State::EntryTitle => Some(Element::Title),
            State::FeedSubtitle => Some(Element::Subtitle),
            State::EntrySummary => Some(Element::Summary),
            State::EntryContent => Some(Element::Content),
            _ => None,
        }
    }

    /// States whose character data is kept.
    fn collects_text(self) -> bool {
        !matches!(
            self,
            State::Start | State::Feed | State::Entry | State::FeedAuthor | State::EntryAuthor
        )
    }
}

/// Streaming ATOM/OPDS automaton.
///
/// Consumes [`XmlHandler`] callbacks and delivers finished records to a
/// [`FeedHandler`]. One instance reads exactly one document.
pub struct AtomReader<'h, H: FeedHandler + ?Sized> {
    handler: &'h mut H,
    state: State,
    namespaces: Rc<NamespaceMap>,
    buffer: CharBuffer,
    text: TextConstruct,

    // One slot per pending record kind.
    metadata: Option<FeedMetadata>,
    entry: Option<Entry>,
    author: Option<PendingAuthor>,
    id: Option<Attributes>,
    icon: Option<Attributes>,
    link: Option<Link>,
    category: Option<Category>,
    timestamp: Option<Attributes>,
}

impl<'h, H: FeedHandler + ?Sized> AtomReader<'h, H> {
    /// Reader for a `<feed>` document.
    pub fn new(handler: &'h mut H) -> Self {
        Self {
            handler,
            state: State::Start,
            namespaces: Rc::new(NamespaceMap::new()),
            buffer: CharBuffer::new(),
            text: TextConstruct::new(),
            metadata: None,
            entry: None,
            author: None,
            id: None,
            icon: None,
            link: None,
            category: None,
            timestamp: None,
        }
    }

    /// Reader for a standalone `<entry>` document. Only `on_entry` is called.
    pub fn for_entry(handler: &'h mut H) -> Self {
        let mut reader = Self::new(handler);
        reader.state = State::Feed;
        reader
    }

    /// Resolves `tag` and returns the ATOM element it names, if any.
    fn atom_element(&self, tag: &str) -> Option<Element> {
        match self.namespaces.resolve_tag(tag) {
            (Some(ATOM_NS), local) => Element::from_local_name(local),
            _ => None,
        }
    }

    fn flush_metadata(&mut self, early_flush: bool) -> ControlFlow<()> {
        match self.metadata.take() {
            Some(metadata) => self.handler.on_feed_metadata(metadata, early_flush),
            None => ControlFlow::Continue(()),
        }
    }

    fn start(&mut self, element: Element, attributes: &Attributes) -> ControlFlow<()> {
        use Element as E;
        use State as S;

        let next = match (self.state, element) {
            (S::Start, E::Feed) => {
                tracing::debug!("feed start");
                self.handler.on_feed_start();
                self.metadata = Some(FeedMetadata::new(attributes.clone()));
                S::Feed
            }

            (S::Feed, E::Entry) => {
                self.flush_metadata(true)?;
                self.entry = Some(Entry::new(attributes.clone()));
                S::Entry
            }
            (S::Feed, E::Author) => self.begin_author(attributes, S::FeedAuthor),
            (S::Feed, E::Id) => self.begin_id(attributes, S::FeedId),
            (S::Feed, E::Icon) => {
                self.icon = Some(attributes.clone());
                S::FeedIcon
            }
            (S::Feed, E::Link) => self.begin_link(attributes, S::FeedLink),
            (S::Feed, E::Category) => self.begin_category(attributes, S::FeedCategory),
            (S::Feed, E::Title) => self.begin_text(attributes, S::FeedTitle),
            (S::Feed, E::Subtitle) => self.begin_text(attributes, S::FeedSubtitle),
            (S::Feed, E::Updated) => self.begin_timestamp(attributes, S::FeedUpdated),

            (S::Entry, E::Author) => self.begin_author(attributes, S::EntryAuthor),
            (S::Entry, E::Id) => self.begin_id(attributes, S::EntryId),
            (S::Entry, E::Category) => self.begin_category(attributes, S::EntryCategory),
            (S::Entry, E::Link) => self.begin_link(attributes, S::EntryLink),
            (S::Entry, E::Published) => self.begin_timestamp(attributes, S::EntryPublished),
            (S::Entry, E::Summary) => self.begin_text(attributes, S::EntrySummary),
            (S::Entry, E::Content) => self.begin_text(attributes, S::EntryContent),
            (S::Entry, E::Title) => self.begin_text(attributes, S::EntryTitle),
            (S::Entry, E::Updated) => self.begin_timestamp(attributes, S::EntryUpdated),

            (S::FeedAuthor, E::Name) => S::FeedAuthorName,
            (S::FeedAuthor, E::Uri) => S::FeedAuthorUri,
            (S::FeedAuthor, E::Email) => S::FeedAuthorEmail,
            (S::EntryAuthor, E::Name) => S::EntryAuthorName,
            (S::EntryAuthor, E::Uri) => S::EntryAuthorUri,
            (S::EntryAuthor, E::Email) => S::EntryAuthorEmail,

            // A second start tag of the kind already pending replaces it.
            (S::Entry, E::Entry) => {
                tracing::debug!("nested <entry> replaces pending entry");
                self.entry = Some(Entry::new(attributes.clone()));
                S::Entry
            }
            (S::FeedAuthor | S::EntryAuthor, E::Author) => {
                tracing::debug!("nested <author> replaces pending author");
                self.begin_author(attributes, self.state)
            }
            (S::FeedId | S::EntryId, E::Id) => self.begin_id(attributes, self.state),
            (S::FeedIcon, E::Icon) => {
                self.icon = Some(attributes.clone());
                S::FeedIcon
            }
            (S::FeedLink | S::EntryLink, E::Link) => self.begin_link(attributes, self.state),
            (S::FeedCategory | S::EntryCategory, E::Category) => {
                self.begin_category(attributes, self.state)
            }
            (S::FeedUpdated, E::Updated)
            | (S::EntryUpdated, E::Updated)
            | (S::EntryPublished, E::Published) => self.begin_timestamp(attributes, self.state),

            _ => self.state,
        };
        self.state = next;
        ControlFlow::Continue(())
    }

    fn begin_author(&mut self, attributes: &Attributes, next: State) -> State {
        self.author = Some(PendingAuthor::new(attributes.clone()));
        next
    }

    fn begin_id(&mut self, attributes: &Attributes, next: State) -> State {
        self.id = Some(attributes.clone());
        next
    }

    fn begin_link(&mut self, attributes: &Attributes, next: State) -> State {
        self.link = Some(Link::from_attributes(attributes.clone()));
        next
    }

    fn begin_category(&mut self, attributes: &Attributes, next: State) -> State {
        self.category = Some(Category::from_attributes(attributes.clone()));
        next
    }

    fn begin_text(&mut self, attributes: &Attributes, next: State) -> State {
        self.text.begin(attributes.get("type"));
        next
    }

    fn begin_timestamp(&mut self, attributes: &Attributes, next: State) -> State {
        self.timestamp = Some(attributes.clone());
        next
    }

    fn end(&mut self, element: Element, text: String) -> ControlFlow<()> {
        use Element as E;
        use State as S;

        match (self.state, element) {
            (S::Feed, E::Feed) => {
                self.flush_metadata(false)?;
                tracing::debug!("feed end");
                self.handler.on_feed_end();
                self.state = S::Start;
            }
            (S::Entry, E::Entry) => {
                self.state = S::Feed;
                if let Some(entry) = self.entry.take() {
                    return self.handler.on_entry(entry);
                }
            }

            (S::FeedAuthor, E::Author) => {
                let author = self.finish_author();
                if let (Some(author), Some(metadata)) = (author, self.metadata.as_mut()) {
                    metadata.authors.push(author);
                }
                self.state = S::Feed;
            }
            (S::EntryAuthor, E::Author) => {
                let author = self.finish_author();
                if let (Some(author), Some(entry)) = (author, self.entry.as_mut()) {
                    entry.authors.push(author);
                }
                self.state = S::Entry;
            }
            (S::FeedAuthorName, E::Name) | (S::EntryAuthorName, E::Name) => {
                if let Some(author) = self.author.as_mut() {
                    author.name = trimmed(text);
                }
                self.state = self.author_state();
            }
            (S::FeedAuthorUri, E::Uri) | (S::EntryAuthorUri, E::Uri) => {
                if let Some(author) = self.author.as_mut() {
                    author.uri = trimmed(text);
                }
                self.state = self.author_state();
            }
            (S::FeedAuthorEmail, E::Email) | (S::EntryAuthorEmail, E::Email) => {
                if let Some(author) = self.author.as_mut() {
                    author.email = trimmed(text);
                }
                self.state = self.author_state();
            }

            (S::FeedId, E::Id) => {
                let id = self.finish_id(text);
                if let (Some(id), Some(metadata)) = (id, self.metadata.as_mut()) {
                    metadata.id = Some(id);
                }
                self.state = S::Feed;
            }
            (S::EntryId, E::Id) => {
                let id = self.finish_id(text);
                if let (Some(id), Some(entry)) = (id, self.entry.as_mut()) {
                    entry.id = Some(id);
                }
                self.state = S::Entry;
            }
            (S::FeedIcon, E::Icon) => {
                let attributes = self.icon.take().unwrap_or_default();
                if let (Some(uri), Some(metadata)) = (trimmed(text), self.metadata.as_mut()) {
                    metadata.icon = Some(Icon { uri, attributes });
                }
                self.state = S::Feed;
            }

            (S::FeedLink, E::Link) => {
                if let (Some(link), Some(metadata)) = (self.link.take(), self.metadata.as_mut()) {
                    metadata.links.push(link);
                }
                self.state = S::Feed;
            }
            (S::EntryLink, E::Link) => {
                if let (Some(link), Some(entry)) = (self.link.take(), self.entry.as_mut()) {
                    entry.links.push(link);
                }
                self.state = S::Entry;
            }
            (S::FeedCategory, E::Category) => {
                if let (Some(category), Some(metadata)) =
                    (self.category.take(), self.metadata.as_mut())
                {
                    metadata.categories.push(category);
                }
                self.state = S::Feed;
            }
            (S::EntryCategory, E::Category) => {
                if let (Some(category), Some(entry)) = (self.category.take(), self.entry.as_mut()) {
                    entry.categories.push(category);
                }
                self.state = S::Entry;
            }

            (S::FeedUpdated, E::Updated) => {
                let timestamp = self.finish_timestamp(&text);
                if let (Some(ts), Some(metadata)) = (timestamp, self.metadata.as_mut()) {
                    metadata.updated = Some(ts);
                }
                self.state = S::Feed;
            }
            (S::EntryUpdated, E::Updated) => {
                let timestamp = self.finish_timestamp(&text);
                if let (Some(ts), Some(entry)) = (timestamp, self.entry.as_mut()) {
                    entry.updated = Some(ts);
                }
                self.state = S::Entry;
            }
            (S::EntryPublished, E::Published) => {
                let timestamp = self.finish_timestamp(&text);
                if let (Some(ts), Some(entry)) = (timestamp, self.entry.as_mut()) {
                    entry.published = Some(ts);
                }
                self.state = S::Entry;
            }

            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn author_state(&self) -> State {
        match self.state {
            State::FeedAuthorName | State::FeedAuthorUri | State::FeedAuthorEmail => {
                State::FeedAuthor
            }
            _ => State::EntryAuthor,
        }
    }

    fn finish_author(&mut self) -> Option<Author> {
        let author = self.author.take()?.finish();
        if author.is_none() {
            tracing::debug!("dropping author without a name");
        }
        author
    }

    fn finish_id(&mut self, text: String) -> Option<Id> {
        let attributes = self.id.take().unwrap_or_default();
        let uri = trimmed(text)?;
        Some(Id { uri, attributes })
    }

    fn finish_timestamp(&mut self, text: &str) -> Option<Timestamp> {
        let attributes = self.timestamp.take().unwrap_or_default();
        match DateConstruct::parse(text) {
            Some(date) => Some(Timestamp { date, attributes }),
            None => {
                tracing::debug!(value = %text.trim(), "ignoring malformed date");
                None
            }
        }
    }

    /// End tag of the text construct currently being read.
    fn finish_text(&mut self, trailing: &str) {
        let Some(value) = self.text.finish(trailing) else {
            self.state = self.text_parent();
            return;
        };
        match self.state {
            State::FeedTitle => {
                if let Some(metadata) = self.metadata.as_mut() {
                    metadata.title = Some(value);
                }
            }
            State::FeedSubtitle => {
                if let Some(metadata) = self.metadata.as_mut() {
                    metadata.subtitle = Some(value);
                }
            }
            State::EntryTitle => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.title = Some(value);
                }
            }
            State::EntrySummary => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.summary = Some(value);
                }
            }
            State::EntryContent => {
                if let Some(entry) = self.entry.as_mut() {
                    entry.content = Some(value);
                }
            }
            _ => {}
        }
        self.state = self.text_parent();
    }

    fn text_parent(&self) -> State {
        match self.state {
            State::FeedTitle | State::FeedSubtitle => State::Feed,
            _ => State::Entry,
        }
    }
}

impl<H: FeedHandler + ?Sized> XmlHandler for AtomReader<'_, H> {
    fn namespace_map_changed(&mut self, namespaces: Rc<NamespaceMap>) {
        self.namespaces = namespaces;
    }

    fn start_element(&mut self, tag: &str, attributes: &Attributes) -> ControlFlow<()> {
        let text = self.buffer.take();
        let element = self.atom_element(tag);

        if let Some(construct) = self.state.text_construct() {
            if element == Some(construct) {
                tracing::debug!(tag, "nested text construct restarts accumulator");
                self.text.begin(attributes.get("type"));
            } else {
                self.text.append(Markup::Open { name: tag }, &text);
            }
            return ControlFlow::Continue(());
        }

        match element {
            Some(element) => self.start(element, attributes),
            None => ControlFlow::Continue(()),
        }
    }

    fn end_element(&mut self, tag: &str) -> ControlFlow<()> {
        let text = self.buffer.take();
        let element = self.atom_element(tag);

        if let Some(construct) = self.state.text_construct() {
            if element == Some(construct) {
                self.finish_text(&text);
            } else {
                self.text.append(Markup::Close { name: tag }, &text);
            }
            return ControlFlow::Continue(());
        }

        match element {
            Some(element) => self.end(element, text),
            None => ControlFlow::Continue(()),
        }
    }

    fn character_data(&mut self, data: &str) {
        if self.state.collects_text() {
            self.buffer.push(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        metadata: Vec<FeedMetadata>,
        entries: Vec<Entry>,
    }

    impl FeedHandler for Recorder {
        fn on_feed_start(&mut self) {
            self.calls.push("start".into());
        }

        fn on_feed_metadata(&mut self, metadata: FeedMetadata, early_flush: bool) -> ControlFlow<()> {
            self.calls.push(format!("metadata early={early_flush}"));
            self.metadata.push(metadata);
            ControlFlow::Continue(())
        }

        fn on_entry(&mut self, entry: Entry) -> ControlFlow<()> {
            self.calls.push("entry".into());
            self.entries.push(entry);
            ControlFlow::Continue(())
        }

        fn on_feed_end(&mut self) {
            self.calls.push("end".into());
        }
    }

    fn atom_default() -> Rc<NamespaceMap> {
        let mut map = NamespaceMap::new();
        map.declare("", ATOM_NS);
        Rc::new(map)
    }

    fn none() -> Attributes {
        Attributes::new()
    }

    #[test]
    fn test_fragmented_character_data() {
        let mut recorder = Recorder::default();
        let mut reader = AtomReader::new(&mut recorder);
        reader.namespace_map_changed(atom_default());

        let _ = reader.start_element("feed", &none());
        let _ = reader.start_element("title", &none());
        for chunk in ["Cat", "alog", " of ", "Bo", "oks"] {
            reader.character_data(chunk);
        }
        let _ = reader.end_element("title");
        let _ = reader.start_element("id", &none());
        reader.character_data("urn:");
        reader.character_data("uuid:1\r");
        reader.character_data("\n");
        let _ = reader.end_element("id");
        let _ = reader.end_element("feed");

        let metadata = &recorder.metadata[0];
        assert_eq!(metadata.title.as_deref(), Some("Catalog of Books"));
        assert_eq!(metadata.id.as_ref().map(|id| id.uri.as_str()), Some("urn:uuid:1"));
        assert_eq!(recorder.calls, vec!["start", "metadata early=false", "end"]);
    }

    #[test]
    fn test_prefix_declared_mid_document() {
        let mut recorder = Recorder::default();
        let mut reader = AtomReader::new(&mut recorder);
        reader.namespace_map_changed(atom_default());
        let _ = reader.start_element("feed", &none());

        // <a:entry xmlns:a="...Atom"> resolves to the ATOM entry element.
        let mut map = (*atom_default()).clone();
        map.declare("a", ATOM_NS);
        let outer = reader.namespaces.clone();
        reader.namespace_map_changed(Rc::new(map));
        let _ = reader.start_element("a:entry", &none());
        let _ = reader.start_element("a:title", &none());
        reader.character_data("Prefixed");
        let _ = reader.end_element("a:title");
        let _ = reader.end_element("a:entry");
        reader.namespace_map_changed(outer);

        // Without the binding the prefix no longer resolves.
        let _ = reader.start_element("a:entry", &none());
        let _ = reader.end_element("a:entry");
        let _ = reader.end_element("feed");

        assert_eq!(recorder.entries.len(), 1);
        assert_eq!(recorder.entries[0].title.as_deref(), Some("Prefixed"));
    }

    #[test]
    fn test_foreign_namespace_ignored() {
        let mut recorder = Recorder::default();
        let mut reader = AtomReader::new(&mut recorder);
        let mut map = NamespaceMap::new();
        map.declare("", "http://purl.org/rss/1.0/");
        reader.namespace_map_changed(Rc::new(map));

        let _ = reader.start_element("feed", &none());
        let _ = reader.end_element("feed");

        assert!(recorder.calls.is_empty());
    }

    #[test]
    fn test_state_returns_to_start_after_feed() {
        let mut recorder = Recorder::default();
        let mut reader = AtomReader::new(&mut recorder);
        reader.namespace_map_changed(atom_default());
        let _ = reader.start_element("feed", &none());
        let _ = reader.end_element("feed");
        assert_eq!(reader.state, State::Start);
    }

    #[test]
    fn test_entry_mode_starts_in_feed_state() {
        let mut recorder = Recorder::default();
        let reader = AtomReader::for_entry(&mut recorder);
        assert_eq!(reader.state, State::Feed);
        assert!(reader.metadata.is_none());
    }
}

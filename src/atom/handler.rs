use std::ops::ControlFlow;

use super::model::{Entry, FeedMetadata};

/// Consumer of parsed feed records.
///
/// Calls arrive in document order: `on_feed_start`, then `on_feed_metadata`
/// once, then `on_entry` per entry, then `on_feed_end`. Returning
/// [`ControlFlow::Break`] stops the parse right away; no further callbacks
/// are made, `on_feed_end` included.
pub trait FeedHandler {
    fn on_feed_start(&mut self) {}

    /// `early_flush` is `true` when the metadata is delivered ahead of the
    /// first entry and `false` when the feed had no entries. Feed-level
    /// elements placed after the first entry are not part of it.
    fn on_feed_metadata(&mut self, metadata: FeedMetadata, early_flush: bool) -> ControlFlow<()>;

    fn on_entry(&mut self, entry: Entry) -> ControlFlow<()>;

    fn on_feed_end(&mut self) {}
}

/// Collects everything into memory, optionally stopping after `max_entries`.
#[derive(Debug, Default)]
pub struct FeedCollector {
    pub metadata: Option<FeedMetadata>,
    pub entries: Vec<Entry>,
    /// Whether the metadata arrived ahead of the first entry.
    pub early_flush: bool,
    /// Set once the feed end tag was seen.
    pub finished: bool,
    max_entries: Option<usize>,
}

impl FeedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the parse once `max_entries` entries were collected.
    pub fn with_limit(max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries),
            ..Default::default()
        }
    }

    fn limit_reached(&self) -> bool {
        self.max_entries
            .is_some_and(|max| self.entries.len() >= max)
    }
}

impl FeedHandler for FeedCollector {
    fn on_feed_metadata(&mut self, metadata: FeedMetadata, early_flush: bool) -> ControlFlow<()> {
        self.metadata = Some(metadata);
        self.early_flush = early_flush;
        if self.limit_reached() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn on_entry(&mut self, entry: Entry) -> ControlFlow<()> {
        self.entries.push(entry);
        if self.limit_reached() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    fn on_feed_end(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_limit() {
        let mut collector = FeedCollector::with_limit(2);
        assert!(collector.on_entry(Entry::default()).is_continue());
        assert!(collector.on_entry(Entry::default()).is_break());
        assert_eq!(collector.entries.len(), 2);
    }

    #[test]
    fn test_zero_limit_stops_at_metadata() {
        let mut collector = FeedCollector::with_limit(0);
        assert!(collector
            .on_feed_metadata(FeedMetadata::default(), true)
            .is_break());
        assert!(collector.metadata.is_some());
    }

    #[test]
    fn test_unlimited_collector() {
        let mut collector = FeedCollector::new();
        for _ in 0..100 {
            assert!(collector.on_entry(Entry::default()).is_continue());
        }
        collector.on_feed_end();
        assert!(collector.finished);
    }
}

//! Sample data and a ready-wired set of fakes.

use super::fakes::{FakeArtifactStore, FakeFetcher, PassthroughNormalizer, RecordingCache, StaticSpecSource};
use crate::core::{StickerItem, StickerSetSpec};
use crate::ports::PipelinePorts;
use crate::progress::CollectingProgressSink;
use serde_json::json;
use std::sync::Arc;

/// Source URL used for item `id` in the sample data.
#[must_use]
pub fn sample_url(id: u64) -> String {
    format!("https://stickers.example.com/{id}.png")
}

/// A set with items `1..=count`, in that order.
#[must_use]
pub fn sample_spec(count: u64) -> StickerSetSpec {
    StickerSetSpec {
        id: 42,
        name: "Sample Cats".to_string(),
        author_name: "Ann".to_string(),
        author_url: Some("https://example.com/ann".to_string()),
        preview_url: None,
        items: (1..=count)
            .map(|id| StickerItem::new(id, sample_url(id), format!("😺{id}")))
            .collect(),
    }
}

/// JSON document equivalent to [`sample_spec`].
#[must_use]
pub fn sample_document(count: u64) -> String {
    let stickers: Vec<_> = (1..=count)
        .map(|id| json!({ "id": id, "url": sample_url(id), "emojis": format!("😺{id}") }))
        .collect();
    json!({
        "id": 42,
        "name": "Sample Cats",
        "author": { "name": "Ann", "url": "https://example.com/ann" },
        "stickers": stickers,
    })
    .to_string()
}

/// Fakes for every port, kept reachable for assertions.
#[derive(Debug)]
pub struct TestHarness {
    /// Spec source.
    pub specs: Arc<StaticSpecSource>,
    /// Cache.
    pub cache: Arc<RecordingCache>,
    /// Fetcher.
    pub fetcher: Arc<FakeFetcher>,
    /// Normalizer.
    pub normalizer: Arc<PassthroughNormalizer>,
    /// Destination store.
    pub store: Arc<FakeArtifactStore>,
    /// Progress messages.
    pub progress: Arc<CollectingProgressSink>,
}

impl TestHarness {
    /// Fakes serving `spec` with an empty cache.
    #[must_use]
    pub fn new(spec: StickerSetSpec) -> Self {
        Self {
            specs: Arc::new(StaticSpecSource::new(spec)),
            cache: Arc::new(RecordingCache::new()),
            fetcher: Arc::new(FakeFetcher::new()),
            normalizer: Arc::new(PassthroughNormalizer::new()),
            store: Arc::new(FakeArtifactStore::new()),
            progress: Arc::new(CollectingProgressSink::new()),
        }
    }

    /// Replaces the cache.
    #[must_use]
    pub fn with_cache(mut self, cache: RecordingCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    /// Replaces the fetcher.
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: FakeFetcher) -> Self {
        self.fetcher = Arc::new(fetcher);
        self
    }

    /// Replaces the normalizer.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: PassthroughNormalizer) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    /// Replaces the store.
    #[must_use]
    pub fn with_store(mut self, store: FakeArtifactStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Replaces the spec source.
    #[must_use]
    pub fn with_specs(mut self, specs: StaticSpecSource) -> Self {
        self.specs = Arc::new(specs);
        self
    }

    /// Wires the fakes into [`PipelinePorts`].
    #[must_use]
    pub fn ports(&self) -> PipelinePorts {
        PipelinePorts::new(
            self.specs.clone(),
            self.cache.clone(),
            self.fetcher.clone(),
            self.normalizer.clone(),
            self.store.clone(),
            self.progress.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec_source::parse_sticker_set;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sample_document_matches_sample_spec() {
        assert_eq!(parse_sticker_set(&sample_document(3)).unwrap(), sample_spec(3));
    }
}

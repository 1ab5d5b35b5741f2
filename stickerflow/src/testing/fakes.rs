//! In-process fakes for every collaborator port.
//!
//! Each fake counts its calls and supports simple failure injection so
//! pipeline tests can assert on interactions without a network.

use crate::cache::InMemoryArtifactCache;
use crate::core::{ArtifactId, ItemId, StickerSetSpec, UserId};
use crate::errors::{NormalizeError, SpecFetchError, TransientRemoteError};
use crate::ports::{ArtifactCache, ArtifactStore, ImageNormalizer, RemoteFetcher, SpecSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Returns a fixed spec (or error) for every locator.
#[derive(Debug)]
pub struct StaticSpecSource {
    result: Result<StickerSetSpec, SpecFetchError>,
    calls: AtomicUsize,
}

impl StaticSpecSource {
    /// Always returns `spec`.
    #[must_use]
    pub fn new(spec: StickerSetSpec) -> Self {
        Self {
            result: Ok(spec),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always returns `error`.
    #[must_use]
    pub fn failing(error: impl Into<SpecFetchError>) -> Self {
        Self {
            result: Err(error.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `fetch` calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpecSource for StaticSpecSource {
    async fn fetch(&self, _locator: &str) -> Result<StickerSetSpec, SpecFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

/// Serves canned payloads keyed by URL.
///
/// Unknown URLs return the URL's own bytes, which keeps payloads distinct per
/// item without any setup.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    payloads: Mutex<HashMap<String, Vec<u8>>>,
    failures_left: Mutex<HashMap<String, u32>>,
    always_fail: bool,
    latency: Option<Duration>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeFetcher {
    /// Creates a fetcher that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fetcher whose every call fails.
    #[must_use]
    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Serves `bytes` for `url`.
    #[must_use]
    pub fn with_payload(self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.payloads.lock().insert(url.into(), bytes.into());
        self
    }

    /// Fails the first `times` calls for `url`.
    #[must_use]
    pub fn failing_first(self, url: impl Into<String>, times: u32) -> Self {
        self.failures_left.lock().insert(url.into(), times);
        self
    }

    /// Sleeps for `latency` inside every call.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// URLs requested, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of `get` calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of simultaneous calls observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn should_fail(&self, url: &str) -> bool {
        if self.always_fail {
            return true;
        }
        let mut failures = self.failures_left.lock();
        match failures.get_mut(url) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl RemoteFetcher for FakeFetcher {
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransientRemoteError> {
        self.calls.lock().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = if self.should_fail(url) {
            Err(TransientRemoteError::new("download", format!("injected failure for {url}")))
        } else {
            Ok(self
                .payloads
                .lock()
                .get(url)
                .cloned()
                .unwrap_or_else(|| url.as_bytes().to_vec()))
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Returns its input unchanged.
#[derive(Debug, Default)]
pub struct PassthroughNormalizer {
    calls: AtomicUsize,
    fail: bool,
}

impl PassthroughNormalizer {
    /// Creates a passthrough normalizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a normalizer that rejects every payload.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    /// Number of `normalize` calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageNormalizer for PassthroughNormalizer {
    fn normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, NormalizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NormalizeError::Decode("injected failure".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

/// A `create_set` call recorded by [`FakeArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSet {
    /// Owner.
    pub user: UserId,
    /// Set name.
    pub name: String,
    /// Set title.
    pub title: String,
    /// Artifact the set was seeded with.
    pub first: ArtifactId,
    /// Emojis of the first sticker.
    pub emojis: String,
}

/// An `append_to_set` call recorded by [`FakeArtifactStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendedSticker {
    /// Set name.
    pub name: String,
    /// Appended artifact.
    pub artifact: ArtifactId,
    /// Emojis of the sticker.
    pub emojis: String,
}

#[derive(Debug, Default)]
struct StoreFailures {
    uploads_left: u32,
    uploads_always: bool,
    create_left: u32,
    appends_left: u32,
    appends_always: bool,
}

/// Records uploads, set creation and appends; assigns `artifact-<n>` ids.
#[derive(Debug, Default)]
pub struct FakeArtifactStore {
    uploads: Mutex<Vec<Vec<u8>>>,
    upload_calls: AtomicUsize,
    created: Mutex<Vec<CreatedSet>>,
    create_calls: AtomicUsize,
    appended: Mutex<Vec<AppendedSticker>>,
    append_calls: AtomicUsize,
    failures: Mutex<StoreFailures>,
}

impl FakeArtifactStore {
    /// Creates a store that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the first `times` uploads.
    #[must_use]
    pub fn failing_uploads(self, times: u32) -> Self {
        self.failures.lock().uploads_left = times;
        self
    }

    /// Fails every upload.
    #[must_use]
    pub fn always_failing_uploads(self) -> Self {
        self.failures.lock().uploads_always = true;
        self
    }

    /// Fails the first `times` create calls.
    #[must_use]
    pub fn failing_create(self, times: u32) -> Self {
        self.failures.lock().create_left = times;
        self
    }

    /// Fails the first `times` appends.
    #[must_use]
    pub fn failing_appends(self, times: u32) -> Self {
        self.failures.lock().appends_left = times;
        self
    }

    /// Fails every append.
    #[must_use]
    pub fn always_failing_appends(self) -> Self {
        self.failures.lock().appends_always = true;
        self
    }

    /// Payloads accepted so far.
    #[must_use]
    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().clone()
    }

    /// Number of `upload` calls, failed ones included.
    #[must_use]
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Sets created so far.
    #[must_use]
    pub fn created_sets(&self) -> Vec<CreatedSet> {
        self.created.lock().clone()
    }

    /// Number of `create_set` calls, failed ones included.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Stickers appended so far, in completion order.
    #[must_use]
    pub fn appended(&self) -> Vec<AppendedSticker> {
        self.appended.lock().clone()
    }

    /// Number of `append_to_set` calls, failed ones included.
    #[must_use]
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Total calls across every operation.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.upload_calls() + self.create_calls() + self.append_calls()
    }
}

fn take_failure(left: &mut u32, always: bool) -> bool {
    if always {
        return true;
    }
    if *left > 0 {
        *left -= 1;
        return true;
    }
    false
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn upload(&self, _user: UserId, bytes: &[u8]) -> Result<ArtifactId, TransientRemoteError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock();
            let always = failures.uploads_always;
            if take_failure(&mut failures.uploads_left, always) {
                return Err(TransientRemoteError::new("upload", "injected failure"));
            }
        }

        let mut uploads = self.uploads.lock();
        uploads.push(bytes.to_vec());
        Ok(ArtifactId::new(format!("artifact-{}", uploads.len())))
    }

    async fn create_set(
        &self,
        user: UserId,
        name: &str,
        title: &str,
        first: &ArtifactId,
        emojis: &str,
    ) -> Result<(), TransientRemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&mut self.failures.lock().create_left, false) {
            return Err(TransientRemoteError::new("create set", "injected failure"));
        }

        self.created.lock().push(CreatedSet {
            user,
            name: name.to_string(),
            title: title.to_string(),
            first: first.clone(),
            emojis: emojis.to_string(),
        });
        Ok(())
    }

    async fn append_to_set(
        &self,
        _user: UserId,
        name: &str,
        artifact: &ArtifactId,
        emojis: &str,
    ) -> Result<(), TransientRemoteError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock();
            let always = failures.appends_always;
            if take_failure(&mut failures.appends_left, always) {
                return Err(TransientRemoteError::new("append", "injected failure"));
            }
        }

        self.appended.lock().push(AppendedSticker {
            name: name.to_string(),
            artifact: artifact.clone(),
            emojis: emojis.to_string(),
        });
        Ok(())
    }
}

/// In-memory cache that records every read and batch write.
#[derive(Debug, Default)]
pub struct RecordingCache {
    inner: InMemoryArtifactCache,
    reads: AtomicUsize,
    writes: Mutex<Vec<BTreeMap<ItemId, ArtifactId>>>,
}

impl RecordingCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-seeded with `(item, artifact)` pairs.
    #[must_use]
    pub fn seeded<'a>(entries: impl IntoIterator<Item = (u64, &'a str)>) -> Self {
        Self {
            inner: InMemoryArtifactCache::with_entries(
                entries
                    .into_iter()
                    .map(|(id, artifact)| (ItemId(id), ArtifactId::from(artifact))),
            ),
            ..Self::default()
        }
    }

    /// Number of `get_all` calls.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Every batch passed to `put_all`, in call order.
    #[must_use]
    pub fn writes(&self) -> Vec<BTreeMap<ItemId, ArtifactId>> {
        self.writes.lock().clone()
    }

    /// Current contents.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<ArtifactId> {
        self.inner.get(id)
    }
}

#[async_trait]
impl ArtifactCache for RecordingCache {
    async fn get_all(&self) -> Result<BTreeMap<ItemId, ArtifactId>, TransientRemoteError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all().await
    }

    async fn put_all(&self, entries: &BTreeMap<ItemId, ArtifactId>) -> Result<(), TransientRemoteError> {
        self.writes.lock().push(entries.clone());
        self.inner.put_all(entries).await
    }
}

/// Cache whose reads and writes always fail.
#[derive(Debug, Default)]
pub struct FailingCache {
    calls: AtomicUsize,
}

impl FailingCache {
    /// Creates a failing cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls of either kind.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactCache for FailingCache {
    async fn get_all(&self) -> Result<BTreeMap<ItemId, ArtifactId>, TransientRemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransientRemoteError::new("read cache", "database unavailable"))
    }

    async fn put_all(&self, _entries: &BTreeMap<ItemId, ArtifactId>) -> Result<(), TransientRemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TransientRemoteError::new("write cache", "database unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StickerItem;

    #[tokio::test]
    async fn test_fake_fetcher_injects_failures() {
        let fetcher = FakeFetcher::new()
            .with_payload("https://x.io/a", b"abc".to_vec())
            .failing_first("https://x.io/a", 1);

        assert!(fetcher.get("https://x.io/a").await.is_err());
        assert_eq!(fetcher.get("https://x.io/a").await.unwrap(), b"abc");
        assert_eq!(fetcher.get("https://x.io/b").await.unwrap(), b"https://x.io/b");
        assert_eq!(fetcher.call_count(), 3);
        assert_eq!(fetcher.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_fake_store_assigns_sequential_ids() {
        let store = FakeArtifactStore::new().failing_uploads(1);
        assert!(store.upload(UserId(1), b"a").await.is_err());
        assert_eq!(store.upload(UserId(1), b"a").await.unwrap().as_str(), "artifact-1");
        assert_eq!(store.upload(UserId(1), b"b").await.unwrap().as_str(), "artifact-2");
        assert_eq!(store.upload_calls(), 3);
        assert_eq!(store.uploads().len(), 2);
    }

    #[tokio::test]
    async fn test_recording_cache_tracks_writes() {
        let cache = RecordingCache::seeded([(1, "a")]);
        assert_eq!(cache.get_all().await.unwrap().len(), 1);

        let batch: BTreeMap<_, _> = [(ItemId(2), ArtifactId::from("b"))].into_iter().collect();
        cache.put_all(&batch).await.unwrap();

        assert_eq!(cache.read_count(), 1);
        assert_eq!(cache.writes(), vec![batch]);
        assert_eq!(cache.get(ItemId(2)), Some(ArtifactId::from("b")));
    }

    #[tokio::test]
    async fn test_static_source_and_failing_cache() {
        let spec = StickerSetSpec {
            id: 1,
            name: "n".into(),
            author_name: "a".into(),
            author_url: None,
            preview_url: None,
            items: vec![StickerItem::new(1, "https://x.io/1", "🙂")],
        };
        let source = StaticSpecSource::new(spec.clone());
        assert_eq!(source.fetch("anything").await.unwrap(), spec);
        assert_eq!(source.call_count(), 1);

        let cache = FailingCache::new();
        assert!(cache.get_all().await.is_err());
        assert!(cache.put_all(&BTreeMap::new()).await.is_err());
        assert_eq!(cache.call_count(), 2);
    }
}

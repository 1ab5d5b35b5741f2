//! Collaborator capabilities consumed by the pipeline.
//!
//! Each trait is a capability boundary: the pipeline owns orchestration and
//! never assumes a wire format. Implementations are injected through
//! [`PipelinePorts`].

use crate::core::{ArtifactId, ItemId, StickerSetSpec, UserId};
use crate::errors::{NormalizeError, SpecFetchError, TransientRemoteError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Produces a validated sticker set description from a locator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpecSource: Send + Sync {
    /// Fetches and validates the set description.
    async fn fetch(&self, locator: &str) -> Result<StickerSetSpec, SpecFetchError>;
}

/// Persistent mapping from item identity to a previously assigned artifact id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Reads every known mapping.
    async fn get_all(&self) -> Result<BTreeMap<ItemId, ArtifactId>, TransientRemoteError>;

    /// Writes a batch of mappings atomically.
    async fn put_all(&self, entries: &BTreeMap<ItemId, ArtifactId>) -> Result<(), TransientRemoteError>;
}

/// Fetches raw bytes from a URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Downloads the resource; may fail transiently.
    async fn get(&self, url: &str) -> Result<Vec<u8>, TransientRemoteError>;
}

/// Pure image transform with a deterministic output size.
#[cfg_attr(test, mockall::automock)]
pub trait ImageNormalizer: Send + Sync {
    /// Normalizes one payload.
    fn normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, NormalizeError>;
}

/// Destination platform for uploaded artifacts and sticker sets.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Uploads a payload on behalf of a user and returns its artifact id.
    async fn upload(&self, user: UserId, bytes: &[u8]) -> Result<ArtifactId, TransientRemoteError>;

    /// Creates a set seeded with its first artifact.
    async fn create_set(
        &self,
        user: UserId,
        name: &str,
        title: &str,
        first: &ArtifactId,
        emojis: &str,
    ) -> Result<(), TransientRemoteError>;

    /// Appends one artifact to an existing set.
    async fn append_to_set(
        &self,
        user: UserId,
        name: &str,
        artifact: &ArtifactId,
        emojis: &str,
    ) -> Result<(), TransientRemoteError>;
}

/// Human-readable progress reporting to the user.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Sends one message. Failures are never fatal to the pipeline.
    async fn notify(&self, user: UserId, message: &str) -> Result<(), TransientRemoteError>;
}

/// Every collaborator the pipeline needs.
#[derive(Clone)]
pub struct PipelinePorts {
    /// Set description source.
    pub specs: Arc<dyn SpecSource>,
    /// Artifact id cache.
    pub cache: Arc<dyn ArtifactCache>,
    /// Source image fetcher.
    pub fetcher: Arc<dyn RemoteFetcher>,
    /// Image normalizer.
    pub normalizer: Arc<dyn ImageNormalizer>,
    /// Destination platform.
    pub store: Arc<dyn ArtifactStore>,
    /// Progress reporting.
    pub progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for PipelinePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelinePorts").finish_non_exhaustive()
    }
}

impl PipelinePorts {
    /// Bundles the collaborators.
    #[must_use]
    pub fn new(
        specs: Arc<dyn SpecSource>,
        cache: Arc<dyn ArtifactCache>,
        fetcher: Arc<dyn RemoteFetcher>,
        normalizer: Arc<dyn ImageNormalizer>,
        store: Arc<dyn ArtifactStore>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            specs,
            cache,
            fetcher,
            normalizer,
            store,
            progress,
        }
    }

    /// Replaces the progress sink.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

//! In-memory artifact cache.
//!
//! Entries are additive: once an item has an artifact id, a later write with a
//! different id for the same item is skipped and logged.

use crate::core::{ArtifactId, ItemId};
use crate::errors::TransientRemoteError;
use crate::ports::ArtifactCache;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Process-local [`ArtifactCache`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryArtifactCache {
    entries: Arc<Mutex<BTreeMap<ItemId, ArtifactId>>>,
}

impl InMemoryArtifactCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-seeded with `entries`.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (ItemId, ArtifactId)>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries.into_iter().collect())),
        }
    }

    /// Looks up one item.
    #[must_use]
    pub fn get(&self, id: ItemId) -> Option<ArtifactId> {
        self.entries.lock().get(&id).cloned()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl ArtifactCache for InMemoryArtifactCache {
    async fn get_all(&self) -> Result<BTreeMap<ItemId, ArtifactId>, TransientRemoteError> {
        Ok(self.entries.lock().clone())
    }

    async fn put_all(&self, entries: &BTreeMap<ItemId, ArtifactId>) -> Result<(), TransientRemoteError> {
        let mut stored = self.entries.lock();
        let mut written = 0usize;

        for (id, artifact) in entries {
            match stored.get(id) {
                Some(existing) if existing == artifact => {}
                Some(existing) => {
                    warn!(
                        item_id = %id,
                        existing = %existing,
                        rejected = %artifact,
                        "Refusing to overwrite cached artifact id"
                    );
                }
                None => {
                    stored.insert(*id, artifact.clone());
                    written += 1;
                }
            }
        }

        debug!(requested = entries.len(), written, "Cache batch written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn batch(pairs: &[(u64, &str)]) -> BTreeMap<ItemId, ArtifactId> {
        pairs
            .iter()
            .map(|(id, a)| (ItemId(*id), ArtifactId::from(*a)))
            .collect()
    }

    #[tokio::test]
    async fn test_put_then_get_all() {
        let cache = InMemoryArtifactCache::new();
        cache.put_all(&batch(&[(1, "a"), (2, "b")])).await.unwrap();

        let all = cache.get_all().await.unwrap();
        assert_eq!(all, batch(&[(1, "a"), (2, "b")]));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_existing_entry_is_never_overwritten() {
        let cache = InMemoryArtifactCache::with_entries([(ItemId(1), ArtifactId::from("first"))]);

        cache
            .put_all(&batch(&[(1, "second"), (2, "fresh")]))
            .await
            .unwrap();

        assert_eq!(cache.get(ItemId(1)), Some(ArtifactId::from("first")));
        assert_eq!(cache.get(ItemId(2)), Some(ArtifactId::from("fresh")));
    }

    #[tokio::test]
    async fn test_identical_rewrite_is_a_noop() {
        let cache = InMemoryArtifactCache::new();
        cache.put_all(&batch(&[(5, "x")])).await.unwrap();
        cache.put_all(&batch(&[(5, "x")])).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let cache = InMemoryArtifactCache::new();
        let other = cache.clone();
        other.put_all(&batch(&[(9, "z")])).await.unwrap();
        assert!(!cache.is_empty());
    }
}

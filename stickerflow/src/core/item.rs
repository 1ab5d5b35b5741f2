//! Sticker item and sticker set models.

use super::{ArtifactId, ItemId};
use serde::{Deserialize, Serialize};

/// One sticker of the set being migrated.
///
/// The raw `payload` is only present between the download and upload stages;
/// the `artifact_id` is assigned by the upload stage or restored from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerItem {
    /// Stable identity within the set.
    pub id: ItemId,
    /// Where the source image is fetched from.
    pub source_url: String,
    /// Emoji annotation attached to the sticker.
    pub emojis: String,
    /// Transient image bytes.
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
    /// Remote artifact id, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<ArtifactId>,
}

impl StickerItem {
    /// Creates a new item with no payload and no artifact id.
    #[must_use]
    pub fn new(id: u64, source_url: impl Into<String>, emojis: impl Into<String>) -> Self {
        Self {
            id: ItemId(id),
            source_url: source_url.into(),
            emojis: emojis.into(),
            payload: None,
            artifact_id: None,
        }
    }

    /// Sets the artifact id.
    #[must_use]
    pub fn with_artifact_id(mut self, artifact_id: impl Into<ArtifactId>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    /// Returns true if the item already references a remote artifact.
    #[must_use]
    pub fn is_uploaded(&self) -> bool {
        self.artifact_id.is_some()
    }
}

/// An ordered sticker set description.
///
/// Order matters: the first item creates the destination set and the rest are
/// appended to it. The item sequence is never empty once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StickerSetSpec {
    /// Source set identity.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Author display name.
    pub author_name: String,
    /// Author profile URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_url: Option<String>,
    /// Preview image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    /// Stickers in declared order.
    pub items: Vec<StickerItem>,
}

impl StickerSetSpec {
    /// Returns the first item in declared order.
    #[must_use]
    pub fn first(&self) -> Option<&StickerItem> {
        self.items.first()
    }

    /// Returns every item after the first, in declared order.
    #[must_use]
    pub fn remainder(&self) -> &[StickerItem] {
        self.items.get(1..).unwrap_or(&[])
    }

    /// Looks up an item by identity.
    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&StickerItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Looks up an item by identity for mutation.
    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut StickerItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the set has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(ids: &[u64]) -> StickerSetSpec {
        StickerSetSpec {
            id: 1,
            name: "Cats".to_string(),
            author_name: "someone".to_string(),
            author_url: None,
            preview_url: None,
            items: ids
                .iter()
                .map(|id| StickerItem::new(*id, format!("https://cdn.test/{id}.png"), "😺"))
                .collect(),
        }
    }

    #[test]
    fn test_first_and_remainder() {
        let set = spec(&[10, 20, 30]);
        assert_eq!(set.first().map(|i| i.id), Some(ItemId(10)));
        let rest: Vec<_> = set.remainder().iter().map(|i| i.id.0).collect();
        assert_eq!(rest, vec![20, 30]);
    }

    #[test]
    fn test_remainder_of_single_item_set_is_empty() {
        let set = spec(&[10]);
        assert!(set.remainder().is_empty());
    }

    #[test]
    fn test_item_mut_assigns_artifact() {
        let mut set = spec(&[1, 2]);
        set.item_mut(ItemId(2)).unwrap().artifact_id = Some(ArtifactId::new("x"));
        assert!(set.item(ItemId(2)).unwrap().is_uploaded());
        assert!(!set.item(ItemId(1)).unwrap().is_uploaded());
    }

    #[test]
    fn test_payload_not_serialized() {
        let mut item = StickerItem::new(1, "https://cdn.test/1.png", "🐱");
        item.payload = Some(vec![1, 2, 3]);
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("payload").is_none());
    }
}

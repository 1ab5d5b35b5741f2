//! Per-run session context threaded through every stage.

use crate::config::SetNaming;
use crate::core::{ArtifactId, ItemId, StickerItem, StickerSetSpec, UserId};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Everything one run knows, passed explicitly from stage to stage.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Correlates log lines of one run.
    pub run_id: Uuid,
    /// The user the set is built for.
    pub user_id: UserId,
    /// Destination set name.
    pub set_name: String,
    /// Destination set title.
    pub set_title: String,
    /// The parsed set; item artifact ids are filled in as stages complete.
    pub spec: StickerSetSpec,
    /// Items without a cached artifact id, in declared order.
    pub needs_upload: Vec<ItemId>,
    /// Items whose artifact id came from the cache.
    pub reused: usize,
    /// Artifact ids obtained by this run.
    pub fresh: BTreeMap<ItemId, ArtifactId>,
    /// Uploads skipped because an identical payload was already uploaded.
    pub deduplicated: usize,
    /// Stickers appended after the set was created.
    pub appended: usize,
}

impl SessionContext {
    /// Builds the context for a freshly fetched set.
    #[must_use]
    pub fn new(run_id: Uuid, user_id: UserId, spec: StickerSetSpec, naming: &SetNaming) -> Self {
        Self {
            run_id,
            user_id,
            set_name: naming.set_name(spec.id),
            set_title: naming.set_title(&spec.name),
            spec,
            needs_upload: Vec::new(),
            reused: 0,
            fresh: BTreeMap::new(),
            deduplicated: 0,
            appended: 0,
        }
    }

    /// Items in the needs-upload partition, in declared order.
    pub fn pending_items(&self) -> impl Iterator<Item = &StickerItem> {
        self.needs_upload
            .iter()
            .filter_map(|id| self.spec.item(*id))
    }

    /// Public link to the destination set.
    #[must_use]
    pub fn set_link(&self) -> String {
        format!("https://t.me/addstickers/{}", self.set_name)
    }
}

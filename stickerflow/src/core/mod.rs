//! Core data types for sticker set migration.
//!
//! This module provides:
//! - Identifier newtypes for items, artifacts and users
//! - The sticker item and sticker set models
//! - The pipeline state machine enum

mod ids;
mod item;
mod state;

pub use ids::{ArtifactId, ItemId, UserId};
pub use item::{StickerItem, StickerSetSpec};
pub use state::PipelineState;

//! Input document parsing and validation.
//!
//! The document is JSON:
//!
//! ```json
//! {
//!   "id": 17,
//!   "name": "Cats",
//!   "author": { "name": "Ann", "url": "https://example.com/ann" },
//!   "preview_image": "https://example.com/cats.png",
//!   "stickers": [ { "id": 1, "url": "https://example.com/1.png", "emojis": "😺" } ]
//! }
//! ```
//!
//! Every problem is reported as a [`ValidationError`] naming the offending
//! field, so the message can be shown to the user verbatim.

use crate::core::{StickerItem, StickerSetSpec};
use crate::errors::{SpecFetchError, ValidationError};
use crate::ports::SpecSource;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RawSet {
    id: Option<u64>,
    name: Option<String>,
    author: Option<RawAuthor>,
    preview_image: Option<String>,
    stickers: Option<Vec<RawSticker>>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSticker {
    id: Option<u64>,
    url: Option<String>,
    emojis: Option<String>,
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^https?://[^\s/?#]+\S*$").expect("valid regex"))
}

fn missing(field: &str) -> ValidationError {
    ValidationError::new(format!("missing required field '{field}'")).with_field(field)
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ValidationError> {
    value.ok_or_else(|| missing(field))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    let text = required(value, field)?;
    if text.trim().is_empty() {
        return Err(ValidationError::new(format!("field '{field}' must not be empty")).with_field(field));
    }
    Ok(text)
}

fn checked_url(value: String, field: &str) -> Result<String, ValidationError> {
    if url_pattern().is_match(&value) {
        Ok(value)
    } else {
        Err(ValidationError::new(format!("field '{field}' must be an http(s) URL")).with_field(field))
    }
}

/// Parses and validates a sticker set document.
pub fn parse_sticker_set(document: &str) -> Result<StickerSetSpec, ValidationError> {
    let raw: RawSet = serde_json::from_str(document)
        .map_err(|e| ValidationError::new(format!("malformed document: {e}")))?;

    let id = required(raw.id, "id")?;
    let name = required_text(raw.name, "name")?;
    let author = required(raw.author, "author")?;
    let author_name = required_text(author.name, "author.name")?;
    let author_url = author
        .url
        .map(|url| checked_url(url, "author.url"))
        .transpose()?;
    let preview_url = raw
        .preview_image
        .map(|url| checked_url(url, "preview_image"))
        .transpose()?;

    let stickers = required(raw.stickers, "stickers")?;
    if stickers.is_empty() {
        return Err(ValidationError::new("a sticker set needs at least one sticker").with_field("stickers"));
    }

    let mut seen = HashSet::with_capacity(stickers.len());
    let mut items = Vec::with_capacity(stickers.len());
    for (index, sticker) in stickers.into_iter().enumerate() {
        let id = required(sticker.id, &format!("stickers[{index}].id"))?;
        if !seen.insert(id) {
            let field = format!("stickers[{index}].id");
            return Err(ValidationError::new(format!("duplicate sticker id {id}")).with_field(field));
        }
        let url_field = format!("stickers[{index}].url");
        let url = checked_url(required(sticker.url, &url_field)?, &url_field)?;
        let emojis = required_text(sticker.emojis, &format!("stickers[{index}].emojis"))?;
        items.push(StickerItem::new(id, url, emojis));
    }

    debug!(set_id = id, stickers = items.len(), "Parsed sticker set document");

    Ok(StickerSetSpec {
        id,
        name,
        author_name,
        author_url,
        preview_url,
        items,
    })
}

/// [`SpecSource`] whose locator is the JSON document itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSpecSource;

impl JsonSpecSource {
    /// Creates a new source.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SpecSource for JsonSpecSource {
    async fn fetch(&self, locator: &str) -> Result<StickerSetSpec, SpecFetchError> {
        Ok(parse_sticker_set(locator)?)
    }
}

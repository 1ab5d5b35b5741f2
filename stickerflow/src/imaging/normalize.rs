//! Trim-and-contain normalizer.
//!
//! Decodes the payload, trims fully transparent borders, scales the content
//! to fit a square canvas while preserving aspect ratio, centres it on a
//! transparent background, and encodes PNG. Output is always
//! `size x size` regardless of the input dimensions.

use crate::config::CanvasConfig;
use crate::errors::NormalizeError;
use crate::ports::ImageNormalizer;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Normalizes stickers onto a transparent square canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareCanvasNormalizer {
    size: u32,
    alpha_threshold: u8,
}

impl Default for SquareCanvasNormalizer {
    fn default() -> Self {
        Self::from_config(&CanvasConfig::default())
    }
}

impl SquareCanvasNormalizer {
    /// Creates a normalizer for a `size x size` canvas.
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self {
            size: size.max(1),
            alpha_threshold: 0,
        }
    }

    /// Creates a normalizer from canvas settings.
    #[must_use]
    pub fn from_config(canvas: &CanvasConfig) -> Self {
        Self::new(canvas.size).with_alpha_threshold(canvas.trim_alpha_threshold)
    }

    /// Border pixels with alpha at or below `threshold` are trimmed.
    #[must_use]
    pub fn with_alpha_threshold(mut self, threshold: u8) -> Self {
        self.alpha_threshold = threshold;
        self
    }

    /// Canvas edge length.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    fn trim(&self, image: RgbaImage) -> RgbaImage {
        match content_bounds(&image, self.alpha_threshold) {
            Some((x, y, width, height)) if (width, height) != image.dimensions() => {
                imageops::crop_imm(&image, x, y, width, height).to_image()
            }
            // nothing visible: keep the original so the output is still a full canvas
            _ => image,
        }
    }

    fn fit(&self, image: &RgbaImage) -> RgbaImage {
        let (width, height) = image.dimensions();
        let (fit_width, fit_height) = contain(width, height, self.size);

        let scaled = if (fit_width, fit_height) == (width, height) {
            image.clone()
        } else {
            imageops::resize(image, fit_width, fit_height, FilterType::Lanczos3)
        };

        let mut canvas = RgbaImage::from_pixel(self.size, self.size, Rgba([0, 0, 0, 0]));
        let x = i64::from((self.size - fit_width) / 2);
        let y = i64::from((self.size - fit_height) / 2);
        imageops::overlay(&mut canvas, &scaled, x, y);
        canvas
    }
}

/// Smallest rectangle holding every pixel with alpha above `threshold`.
fn content_bounds(image: &RgbaImage, threshold: u8) -> Option<(u32, u32, u32, u32)> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] > threshold {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Dimensions of `width x height` scaled to fit inside `size x size`.
fn contain(width: u32, height: u32, size: u32) -> (u32, u32) {
    let (width, height, size) = (u64::from(width.max(1)), u64::from(height.max(1)), u64::from(size));
    let (w, h) = if width >= height {
        (size, (height * size / width).max(1))
    } else {
        ((width * size / height).max(1), size)
    };
    // both values are bounded by `size`, which came from a u32
    (
        u32::try_from(w).unwrap_or(u32::MAX),
        u32::try_from(h).unwrap_or(u32::MAX),
    )
}

impl ImageNormalizer for SquareCanvasNormalizer {
    fn normalize(&self, bytes: &[u8]) -> Result<Vec<u8>, NormalizeError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| NormalizeError::Decode(e.to_string()))?;

        let canvas = self.fit(&self.trim(decoded.to_rgba8()));

        let mut cursor = Cursor::new(Vec::new());
        canvas
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|e| NormalizeError::Encode(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

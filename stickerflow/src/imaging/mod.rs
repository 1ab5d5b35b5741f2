//! Sticker image normalization.

mod normalize;

pub use normalize::SquareCanvasNormalizer;

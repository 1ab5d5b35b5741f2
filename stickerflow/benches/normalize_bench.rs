//! Benchmarks for sticker normalization.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use stickerflow::imaging::SquareCanvasNormalizer;
use stickerflow::ports::ImageNormalizer;

fn padded_png(width: u32, height: u32) -> Vec<u8> {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    for x in width / 4..width * 3 / 4 {
        for y in height / 4..height * 3 / 4 {
            image.put_pixel(x, y, Rgba([200, 40, 90, 255]));
        }
    }
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageFormat::Png)
        .unwrap_or_default();
    cursor.into_inner()
}

fn normalize_benchmark(c: &mut Criterion) {
    let normalizer = SquareCanvasNormalizer::default();
    let small = padded_png(128, 96);
    let large = padded_png(1024, 768);

    c.bench_function("normalize_upscale_128x96", |b| {
        b.iter(|| normalizer.normalize(black_box(&small)))
    });

    c.bench_function("normalize_downscale_1024x768", |b| {
        b.iter(|| normalizer.normalize(black_box(&large)))
    });
}

criterion_group!(benches, normalize_benchmark);
criterion_main!(benches);

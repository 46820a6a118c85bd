// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the textgrab-image crate: the colourfulness check
// and the full raster preprocessing pass on a small synthetic screenshot.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, Rgb, RgbImage};

use textgrab_core::config::PreprocessConfig;
use textgrab_core::types::{ImageBuffer, PreprocessingDirective};
use textgrab_image::{ColorfulnessDetector, ImageAnalysis, ImageProcessor, RasterAnalysis};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 400x120 light background with dark horizontal bars standing in for lines
/// of text.
fn synthetic_screenshot() -> ImageBuffer {
    let img = RgbImage::from_fn(400, 120, |x, y| {
        let in_line = (y / 10) % 3 == 1 && x % 37 < 30;
        if in_line {
            Rgb([20, 20, 30])
        } else {
            Rgb([245, 245, 240])
        }
    });
    ImageProcessor::from_dynamic(DynamicImage::ImageRgb8(img))
        .to_png_buffer()
        .expect("encode fixture")
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_colorfulness(c: &mut Criterion) {
    let buffer = synthetic_screenshot();
    let detector = ColorfulnessDetector::default();

    c.bench_function("is_colorful (400x120)", |b| {
        b.iter(|| black_box(detector.is_colorful(black_box(&buffer))));
    });
}

/// Upscale to 1600 wide, sharpen, gamma, greyscale and normalise: the path
/// every non-colourful image takes.
fn bench_preprocess(c: &mut Criterion) {
    let buffer = synthetic_screenshot();
    let raster = RasterAnalysis::new(&PreprocessConfig::default());
    let directive = PreprocessingDirective::default();

    c.bench_function("preprocess (400x120 -> 1600)", |b| {
        b.iter(|| black_box(raster.preprocess(black_box(&buffer), &directive)));
    });
}

criterion_group!(benches, bench_colorfulness, bench_preprocess);
criterion_main!(benches);

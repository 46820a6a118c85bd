// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Colourfulness detector, a cheap proxy for "this region contains coloured
// glyphs (emoji, icons) worth keeping out of the greyscale path".

use image::{DynamicImage, RgbImage};
use textgrab_core::types::ImageBuffer;
use tracing::{debug, instrument};

use crate::processor::ImageProcessor;

/// Width of the analysis thumbnail.
pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 100;

/// Mean channel deviation above which an image counts as colourful.
pub const DEFAULT_THRESHOLD: f32 = 10.0;

/// Thumbnails larger than this are not scored.
const MAX_THUMBNAIL_PIXELS: u64 = 4_000_000;

/// Classifies images as colourful or near-greyscale.
///
/// The image is downsampled to a fixed-width thumbnail. The score is the mean
/// absolute deviation of every pixel's R, G and B samples from the per-channel
/// means, averaged over all pixels and channels, so it lies in [0, 255].
#[derive(Debug, Clone, Copy)]
pub struct ColorfulnessDetector {
    thumbnail_width: u32,
    threshold: f32,
}

impl Default for ColorfulnessDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_WIDTH, DEFAULT_THRESHOLD)
    }
}

impl ColorfulnessDetector {
    pub fn new(thumbnail_width: u32, threshold: f32) -> Self {
        Self {
            thumbnail_width: thumbnail_width.max(1),
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Whether the encoded image is colourful.
    ///
    /// Undecodable input is reported as not colourful so the caller simply
    /// takes the greyscale path.
    #[instrument(skip_all, fields(data_len = image.len()))]
    pub fn is_colorful(&self, image: &ImageBuffer) -> bool {
        let decoded = match ImageProcessor::from_buffer(image) {
            Ok(processor) => processor.into_dynamic(),
            Err(err) => {
                debug!(error = %err, "Colourfulness check could not decode image");
                return false;
            }
        };
        match self.score(&decoded) {
            Some(score) => {
                let colorful = score > self.threshold;
                debug!(score, threshold = self.threshold, colorful, "Colourfulness scored");
                colorful
            }
            None => false,
        }
    }

    /// Colourfulness score of a decoded image, or `None` when it has fewer
    /// than three colour channels (or no pixels), or its thumbnail would be
    /// oversized.
    pub fn score(&self, image: &DynamicImage) -> Option<f32> {
        if !image.color().has_color() || image.width() == 0 || image.height() == 0 {
            return None;
        }
        let processor = ImageProcessor::from_dynamic(image.clone());
        let pixels = processor.pixels_at_width(self.thumbnail_width);
        if pixels > MAX_THUMBNAIL_PIXELS {
            debug!(pixels, "Thumbnail too large, skipping colourfulness check");
            return None;
        }
        let thumbnail = processor
            .resize_to_width(self.thumbnail_width)
            .into_dynamic()
            .to_rgb8();
        Some(colorfulness_score(&thumbnail))
    }
}

/// Mean absolute deviation of channel samples from the per-channel means.
pub fn colorfulness_score(rgb: &RgbImage) -> f32 {
    let pixels = rgb.width() as f64 * rgb.height() as f64;
    if pixels == 0.0 {
        return 0.0;
    }

    let mut sums = [0f64; 3];
    for pixel in rgb.pixels() {
        for (sum, &sample) in sums.iter_mut().zip(pixel.0.iter()) {
            *sum += sample as f64;
        }
    }
    let means = sums.map(|sum| sum / pixels);

    let mut deviation = 0f64;
    for pixel in rgb.pixels() {
        let per_pixel: f64 = pixel
            .0
            .iter()
            .zip(means.iter())
            .map(|(&sample, mean)| (sample as f64 - mean).abs())
            .sum();
        deviation += per_pixel / 3.0;
    }

    (deviation / pixels) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb};

    fn encode(image: DynamicImage) -> ImageBuffer {
        ImageProcessor::from_dynamic(image).to_png_buffer().unwrap()
    }

    /// Deterministic pseudo-random RGB noise (xorshift), no extra crates.
    fn noise_image(width: u32, height: u32) -> RgbImage {
        let mut state: u32 = 0x9E37_79B9;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        };
        RgbImage::from_fn(width, height, |_, _| Rgb([next(), next(), next()]))
    }

    #[test]
    fn uniform_gray_is_not_colorful() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(240, 80, Rgb([128, 128, 128])));
        let detector = ColorfulnessDetector::default();
        assert_eq!(detector.score(&img), Some(0.0));
        assert!(!detector.is_colorful(&encode(img)));
    }

    #[test]
    fn random_rgb_noise_is_colorful() {
        let img = DynamicImage::ImageRgb8(noise_image(100, 60));
        let detector = ColorfulnessDetector::default();
        let score = detector.score(&img).unwrap();
        assert!(score > 40.0, "noise should score high, got {score}");
        assert!(detector.is_colorful(&encode(img)));
    }

    #[test]
    fn greyscale_images_are_never_colorful() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(50, 50, |x, _| Luma([(x * 5) as u8])));
        let detector = ColorfulnessDetector::default();
        assert_eq!(detector.score(&img), None);
        assert!(!detector.is_colorful(&encode(img)));
    }

    #[test]
    fn undecodable_input_is_not_colorful() {
        let detector = ColorfulnessDetector::default();
        assert!(!detector.is_colorful(&ImageBuffer::png(b"definitely not a png".to_vec())));
        assert!(!detector.is_colorful(&ImageBuffer::png(Vec::new())));
    }

    #[test]
    fn two_tone_score_matches_hand_computation() {
        // Half pure red, half pure blue: means (127.5, 0, 127.5); every pixel
        // deviates 127.5 on R and B and 0 on G, so the score is 85.
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
        });
        let score = colorfulness_score(&img);
        assert!((score - 85.0).abs() < 1e-3, "got {score}");
    }

    #[test]
    fn threshold_is_strict() {
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
        });
        let img = DynamicImage::ImageRgb8(img);
        let at_score = ColorfulnessDetector::new(10, 85.0);
        // Thumbnail width equals the image width, so the score is exact.
        assert!(!at_score.is_colorful(&encode(img.clone())));
        let below = ColorfulnessDetector::new(10, 84.0);
        assert!(below.is_colorful(&encode(img)));
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Preprocessing capability: the image stage the extraction pipeline runs
// before recognition. Chosen once at startup: either the raster
// implementation or a pass-through that leaves images alone.

use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use textgrab_core::config::PreprocessConfig;
use textgrab_core::error::TextgrabError;
use textgrab_core::types::{ImageBuffer, PreprocessingDirective};
use tracing::{debug, info, instrument, warn};

use crate::colorfulness::ColorfulnessDetector;
use crate::processor::ImageProcessor;

/// Image stage of the extraction pipeline.
///
/// Both operations are infallible by contract: detection failures read as
/// "not colourful" and preprocessing failures hand back the original buffer.
pub trait ImageAnalysis: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the image looks colourful enough to keep its colour.
    fn is_colorful(&self, image: &ImageBuffer) -> bool;

    /// Prepare the image for recognition according to `directive`.
    fn preprocess(&self, image: &ImageBuffer, directive: &PreprocessingDirective) -> ImageBuffer;
}

/// Full raster implementation backed by the `image` / `imageproc` crates.
#[derive(Debug, Clone)]
pub struct RasterAnalysis {
    detector: ColorfulnessDetector,
    gamma: f32,
    max_output_pixels: u64,
}

impl RasterAnalysis {
    pub fn new(config: &PreprocessConfig) -> Self {
        Self {
            detector: ColorfulnessDetector::new(
                config.thumbnail_width,
                config.colorfulness_threshold,
            ),
            gamma: config.gamma,
            max_output_pixels: config.max_output_pixels,
        }
    }

    /// Run the preprocessing steps, surfacing the first failure.
    ///
    /// 1. Upscale to at least `directive.target_min_width` (never shrink),
    ///    within the configured pixel limit.
    /// 2. Sharpen.
    /// 3. Gamma correction.
    /// 4. Greyscale + contrast normalisation, unless colour is kept.
    #[instrument(skip_all, fields(
        data_len = image.len(),
        target_min_width = directive.target_min_width,
        keep_color = directive.skip_color_removal,
    ))]
    pub fn try_preprocess(
        &self,
        image: &ImageBuffer,
        directive: &PreprocessingDirective,
    ) -> Result<ImageBuffer, TextgrabError> {
        let mut processor = ImageProcessor::from_buffer(image)?
            .upscale_to_width(directive.target_min_width, self.max_output_pixels)?
            .sharpen()
            .gamma(self.gamma);

        if !directive.skip_color_removal {
            processor = processor.grayscale().normalize_contrast();
        }

        let prepared = processor.to_png_buffer()?;
        debug!(
            width = processor.width(),
            height = processor.height(),
            out_len = prepared.len(),
            "Image preprocessed"
        );
        Ok(prepared)
    }
}

impl ImageAnalysis for RasterAnalysis {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn is_colorful(&self, image: &ImageBuffer) -> bool {
        self.detector.is_colorful(image)
    }

    fn preprocess(&self, image: &ImageBuffer, directive: &PreprocessingDirective) -> ImageBuffer {
        match self.try_preprocess(image, directive) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(error = %err, "Image preprocessing failed, using original buffer");
                image.clone()
            }
        }
    }
}

/// No-op implementation used when preprocessing is disabled or unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl ImageAnalysis for PassThrough {
    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn is_colorful(&self, _image: &ImageBuffer) -> bool {
        false
    }

    fn preprocess(&self, image: &ImageBuffer, _directive: &PreprocessingDirective) -> ImageBuffer {
        image.clone()
    }
}

/// Pick the image stage for this process.
///
/// Returns [`PassThrough`] when preprocessing is switched off, or when a probe
/// image cannot make the round trip through the raster pipeline (for example a
/// build without PNG support).
pub fn select_analysis(config: &PreprocessConfig) -> Arc<dyn ImageAnalysis> {
    if !config.enabled {
        info!("Image preprocessing disabled by configuration");
        return Arc::new(PassThrough);
    }

    let raster = RasterAnalysis::new(config);
    match probe(&raster) {
        Ok(()) => {
            info!("Raster image preprocessing available");
            Arc::new(raster)
        }
        Err(err) => {
            warn!(error = %err, "Raster preprocessing unavailable, continuing without it");
            Arc::new(PassThrough)
        }
    }
}

fn probe(raster: &RasterAnalysis) -> Result<(), TextgrabError> {
    let sample = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 2, Rgb([200, 40, 40])));
    let encoded = ImageProcessor::from_dynamic(sample).to_png_buffer()?;
    let directive = PreprocessingDirective {
        target_min_width: 8,
        skip_color_removal: false,
    };
    raster.try_preprocess(&encoded, &directive)?;
    Ok(())
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// textgrab-image — Image handling ahead of text recognition.
//
// Provides the colourfulness detector, an image processor with the
// recognition-oriented transforms (upscale, sharpen, gamma, greyscale, contrast
// normalisation), and the preprocessing capability the pipeline selects once
// at startup.

pub mod colorfulness;
pub mod prepare;
pub mod processor;

pub use colorfulness::ColorfulnessDetector;
pub use prepare::{ImageAnalysis, PassThrough, RasterAnalysis, select_analysis};
pub use processor::ImageProcessor;

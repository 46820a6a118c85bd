// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode, upscale, sharpen, gamma, greyscale and contrast
// normalisation. Operates on in-memory images using the `image` and `imageproc`
// crates.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat};
use imageproc::stats::percentile;
use textgrab_core::error::TextgrabError;
use textgrab_core::types::ImageBuffer;
use tracing::{debug, instrument};

/// Mild 3x3 sharpening kernel (weights sum to 1).
const SHARPEN_KERNEL: [f32; 9] = [0.0, -0.5, 0.0, -0.5, 3.0, -0.5, 0.0, -0.5, 0.0];

/// Percentiles contrast normalisation stretches to the full range. Clipping
/// the extreme 1% keeps a few stray pixels from pinning the stretch.
const NORMALISE_LOW_PERCENTILE: u8 = 1;
const NORMALISE_HIGH_PERCENTILE: u8 = 99;

/// Image processing pipeline operating on a single in-memory image.
///
/// Each method consumes `self` and returns a new `ImageProcessor` wrapping the
/// transformed image, enabling method chaining.
///
/// ```ignore
/// let png = ImageProcessor::from_buffer(&buffer)?
///     .upscale_to_width(1600, 40_000_000)?
///     .sharpen()
///     .gamma(1.1)
///     .grayscale()
///     .normalize_contrast()
///     .to_png_bytes()?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Decode an [`ImageBuffer`].
    ///
    /// The declared MIME type picks the decoder. If it is unknown or does not
    /// match the payload, the format is sniffed from the bytes instead.
    #[instrument(skip(buffer), fields(data_len = buffer.len(), mime = buffer.mime_type()))]
    pub fn from_buffer(buffer: &ImageBuffer) -> Result<Self, TextgrabError> {
        if let Some(format) = ImageFormat::from_mime_type(buffer.mime_type()) {
            match image::load_from_memory_with_format(buffer.bytes(), format) {
                Ok(image) => return Ok(Self { image }),
                Err(err) => debug!(
                    error = %err,
                    "Declared MIME type did not decode; sniffing content"
                ),
            }
        }
        Self::from_bytes(buffer.bytes())
    }

    /// Create a processor from raw encoded bytes (PNG, JPEG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, TextgrabError> {
        let img = image::load_from_memory(data).map_err(|err| {
            TextgrabError::ImageError(format!("failed to decode image: {}", err))
        })?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Image decoded from bytes"
        );
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Scale the image up so it is at least `min_width` pixels wide, keeping
    /// the aspect ratio. Images already that wide are left alone.
    ///
    /// # Errors
    ///
    /// [`TextgrabError::ImageError`] when the result would have more than
    /// `max_pixels` pixels (thin vertical strips blow up quadratically).
    #[instrument(skip(self))]
    pub fn upscale_to_width(self, min_width: u32, max_pixels: u64) -> Result<Self, TextgrabError> {
        let (width, height) = (self.image.width(), self.image.height());
        if width >= min_width || width == 0 {
            return Ok(self);
        }
        let pixels = self.pixels_at_width(min_width);
        if pixels > max_pixels {
            return Err(TextgrabError::ImageError(format!(
                "upscaling {width}x{height} to width {min_width} needs {pixels} pixels, limit is {max_pixels}"
            )));
        }
        let new_height = scaled_height(width, height, min_width);
        debug!(
            from_w = width,
            from_h = height,
            to_w = min_width,
            to_h = new_height,
            "Upscaling image"
        );
        Ok(Self {
            image: self
                .image
                .resize_exact(min_width, new_height, FilterType::Lanczos3),
        })
    }

    /// Pixel count after an aspect-preserving resize to `width`.
    pub fn pixels_at_width(&self, width: u32) -> u64 {
        let (w, h) = (self.image.width(), self.image.height());
        if w == 0 {
            return 0;
        }
        width as u64 * scaled_height(w, h, width) as u64
    }

    /// Resize to exactly `width` pixels wide, keeping the aspect ratio, in
    /// either direction. Used for cheap analysis thumbnails.
    pub fn resize_to_width(self, width: u32) -> Self {
        let (w, h) = (self.image.width(), self.image.height());
        if w == width || w == 0 {
            return self;
        }
        let height = scaled_height(w, h, width);
        Self {
            image: self.image.resize_exact(width, height, FilterType::Triangle),
        }
    }

    /// Apply a mild 3x3 sharpening filter.
    #[instrument(skip(self))]
    pub fn sharpen(self) -> Self {
        Self {
            image: self.image.filter3x3(&SHARPEN_KERNEL),
        }
    }

    /// Gamma-correct colour channels. Factors above 1.0 brighten midtones;
    /// alpha is untouched.
    #[instrument(skip(self))]
    pub fn gamma(self, factor: f32) -> Self {
        let lut = gamma_lut(factor);
        let image = match self.image {
            DynamicImage::ImageLuma8(mut gray) => {
                for pixel in gray.pixels_mut() {
                    pixel.0[0] = lut[pixel.0[0] as usize];
                }
                DynamicImage::ImageLuma8(gray)
            }
            DynamicImage::ImageRgb8(mut rgb) => {
                for pixel in rgb.pixels_mut() {
                    for channel in pixel.0.iter_mut() {
                        *channel = lut[*channel as usize];
                    }
                }
                DynamicImage::ImageRgb8(rgb)
            }
            other => {
                let mut rgba = other.to_rgba8();
                for pixel in rgba.pixels_mut() {
                    for channel in pixel.0[..3].iter_mut() {
                        *channel = lut[*channel as usize];
                    }
                }
                DynamicImage::ImageRgba8(rgba)
            }
        };
        Self { image }
    }

    /// Convert the image to 8-bit greyscale, dropping any alpha channel.
    #[instrument(skip(self))]
    pub fn grayscale(self) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(self.image.to_luma8()),
        }
    }

    /// Stretch luminance so the 1st..99th percentile band spans 0..255.
    ///
    /// Colour images are converted to greyscale first. Flat images are
    /// returned unchanged.
    #[instrument(skip(self))]
    pub fn normalize_contrast(self) -> Self {
        let gray = match self.image {
            DynamicImage::ImageLuma8(gray) => gray,
            other => other.to_luma8(),
        };
        Self {
            image: DynamicImage::ImageLuma8(stretch_contrast(gray)),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, TextgrabError> {
        encode_to_format(&self.image, ImageFormat::Png)
    }

    /// Encode the current image as a PNG [`ImageBuffer`].
    pub fn to_png_buffer(&self) -> Result<ImageBuffer, TextgrabError> {
        Ok(ImageBuffer::png(self.to_png_bytes()?))
    }
}

/// Height that keeps the aspect ratio when the width goes from `width` to
/// `new_width`. Never zero.
fn scaled_height(width: u32, height: u32, new_width: u32) -> u32 {
    let scaled = (height as f64 * new_width as f64 / width as f64).round() as u32;
    scaled.max(1)
}

/// Lookup table for `out = 255 * (in / 255) ^ (1 / factor)`.
fn gamma_lut(factor: f32) -> [u8; 256] {
    let exponent = 1.0 / factor.max(f32::EPSILON) as f64;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let normalised = i as f64 / 255.0;
        *slot = (normalised.powf(exponent) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

fn stretch_contrast(gray: GrayImage) -> GrayImage {
    let low = percentile(&gray, NORMALISE_LOW_PERCENTILE);
    let high = percentile(&gray, NORMALISE_HIGH_PERCENTILE);
    if high <= low {
        return gray;
    }

    let range = (high - low) as f32;
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let v = i as u8;
        *slot = if v <= low {
            0
        } else if v >= high {
            255
        } else {
            ((v - low) as f32 / range * 255.0).round() as u8
        };
    }

    let mut out = gray;
    for pixel in out.pixels_mut() {
        pixel.0[0] = lut[pixel.0[0] as usize];
    }
    out
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(
    image: &DynamicImage,
    format: ImageFormat,
) -> Result<Vec<u8>, TextgrabError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image.write_to(&mut cursor, format).map_err(|err| {
        TextgrabError::ImageError(format!("image encoding failed: {}", err))
    })?;
    Ok(buffer)
}

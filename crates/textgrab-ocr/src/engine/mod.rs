// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recognition engines.
//
// `RecognitionEngine` is the seam between the adapter and a concrete OCR
// library. Backends are feature-gated:
//
// - `tesseract`: Tesseract through `leptess`, with per-word confidence read
//   from the hOCR output.
// - `ocrs`: the pure-Rust `ocrs` engine running `.rten` models.
//
// Without either feature the factory reports the engine as unavailable.

pub mod hocr;
#[cfg(feature = "ocrs")]
pub mod ocrs;
#[cfg(feature = "tesseract")]
pub mod tesseract;

use std::sync::Arc;

use textgrab_core::config::{EngineBackend, EngineConfig};
use textgrab_core::error::{Result, TextgrabError};
use textgrab_core::types::{ImageBuffer, RecognitionParams, RecognitionResult};

/// A stateful OCR engine.
///
/// Engines are not required to be thread-safe: the adapter owns the only
/// instance and serialises every call.
pub trait RecognitionEngine: Send {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Apply parameter overrides. `None` fields leave the current value in
    /// place; an empty whitelist lifts any character restriction.
    ///
    /// Implementations apply every field they can and report the ones they
    /// could not as a single [`TextgrabError::Configuration`].
    fn configure(&mut self, params: &RecognitionParams) -> Result<()>;

    /// Recognise text in an encoded image using the active parameters.
    fn recognize(&mut self, image: &ImageBuffer) -> Result<RecognitionResult>;
}

/// Builds the engine on first use. May be called again if a previous attempt
/// failed.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn RecognitionEngine>> + Send + Sync>;

/// Construct the backend selected in `config`.
pub fn create_engine(config: &EngineConfig) -> Result<Box<dyn RecognitionEngine>> {
    match config.backend {
        EngineBackend::Tesseract => create_tesseract(config),
        EngineBackend::Ocrs => create_ocrs(config),
    }
}

/// A factory that builds the configured backend.
pub fn factory_for(config: &EngineConfig) -> EngineFactory {
    let config = config.clone();
    Arc::new(move || create_engine(&config))
}

#[cfg(feature = "tesseract")]
fn create_tesseract(config: &EngineConfig) -> Result<Box<dyn RecognitionEngine>> {
    Ok(Box::new(self::tesseract::TesseractEngine::new(config)?))
}

#[cfg(not(feature = "tesseract"))]
fn create_tesseract(_config: &EngineConfig) -> Result<Box<dyn RecognitionEngine>> {
    Err(TextgrabError::EngineUnavailable(
        "textgrab was built without the `tesseract` feature".into(),
    ))
}

#[cfg(feature = "ocrs")]
fn create_ocrs(config: &EngineConfig) -> Result<Box<dyn RecognitionEngine>> {
    Ok(Box::new(self::ocrs::OcrsEngine::from_config(config)?))
}

#[cfg(not(feature = "ocrs"))]
fn create_ocrs(_config: &EngineConfig) -> Result<Box<dyn RecognitionEngine>> {
    Err(TextgrabError::EngineUnavailable(
        "textgrab was built without the `ocrs` feature".into(),
    ))
}

/// Keep only whitelisted characters (whitespace always survives). An empty
/// whitelist keeps everything.
#[cfg_attr(not(feature = "ocrs"), allow(dead_code))]
pub(crate) fn apply_whitelist(text: &str, whitelist: &str) -> String {
    if whitelist.is_empty() {
        return text.to_string();
    }
    text.chars()
        .filter(|c| c.is_whitespace() || whitelist.contains(*c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn tesseract_without_feature_is_unavailable() {
        let config = EngineConfig::default();
        let err = create_engine(&config).err().unwrap();
        assert!(matches!(err, TextgrabError::EngineUnavailable(_)));
        assert!(err.to_string().contains("tesseract"));
    }

    #[cfg(not(feature = "ocrs"))]
    #[test]
    fn ocrs_without_feature_is_unavailable() {
        let config = EngineConfig {
            backend: EngineBackend::Ocrs,
            ..Default::default()
        };
        let err = factory_for(&config)().err().unwrap();
        assert!(matches!(err, TextgrabError::EngineUnavailable(_)));
    }

    #[test]
    fn whitelist_filters_but_keeps_whitespace() {
        assert_eq!(apply_whitelist("A1 b2\nC3", "0123456789"), "1 2\n3");
        assert_eq!(apply_whitelist("anything", ""), "anything");
    }
}

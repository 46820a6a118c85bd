// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, TextgrabError};
use crate::types::{EngineMode, RecognitionParams, SegmentationMode};

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "TEXTGRAB_CONFIG";

/// String returned by the infallible extraction entry points when nothing
/// could be recognised at all.
pub const DEFAULT_FAILURE_SENTINEL: &str = "[OCR extraction failed]";

/// Which recognition backend the engine adapter builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// Tesseract via `leptess` (requires the `tesseract` feature).
    Tesseract,
    /// Pure-Rust `ocrs` (requires the `ocrs` feature).
    Ocrs,
}

impl std::str::FromStr for EngineBackend {
    type Err = TextgrabError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Self::Tesseract),
            "ocrs" => Ok(Self::Ocrs),
            other => Err(TextgrabError::Config(format!("unknown engine backend {other:?}"))),
        }
    }
}

/// Recognition engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: EngineBackend,
    /// Tesseract language code(s), e.g. `eng` or `eng+deu`.
    pub language: String,
    /// Tesseract `tessdata` directory. `None` uses the library default.
    pub tessdata_dir: Option<PathBuf>,
    /// Directory holding the ocrs `.rten` models. `None` uses the ocrs cache.
    pub model_dir: Option<PathBuf>,
    /// Parameters every pass starts from before per-call overrides.
    pub baseline: RecognitionParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Tesseract,
            language: "eng".into(),
            tessdata_dir: None,
            model_dir: None,
            baseline: RecognitionParams {
                segmentation_mode: Some(SegmentationMode::Auto),
                engine_mode: Some(EngineMode::LstmOnly),
                character_whitelist: None,
                preserve_interword_spaces: Some(true),
            },
        }
    }
}

/// 40 megapixels: a 1600 px wide page 25 000 px tall.
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 40_000_000;

/// Image preprocessing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// When false the pipeline hands images to the engine untouched.
    pub enabled: bool,
    /// Images narrower than this are upscaled to it.
    pub target_min_width: u32,
    /// Gamma factor; values above 1.0 brighten midtones.
    pub gamma: f32,
    /// Mean channel deviation above which an image counts as colourful.
    pub colorfulness_threshold: f32,
    /// Width of the thumbnail the colourfulness check samples.
    pub thumbnail_width: u32,
    /// Largest upscaled image, in pixels. Inputs that would exceed it skip
    /// preprocessing.
    pub max_output_pixels: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_min_width: 1600,
            gamma: 1.1,
            colorfulness_threshold: 10.0,
            thumbnail_width: 100,
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }
}

/// Confidence gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Default retry trigger when a caller does not pass one.
    pub min_confidence: f32,
    /// Default alternate segmentation mode.
    pub retry_psm: SegmentationMode,
    /// Average confidence assigned to a pass that produced no words.
    pub empty_pass_confidence: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_confidence: 60.0,
            retry_psm: SegmentationMode::SingleBlock,
            empty_pass_confidence: 0.0,
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextgrabConfig {
    pub engine: EngineConfig,
    pub preprocessing: PreprocessConfig,
    pub retry: RetryConfig,
    /// Returned instead of text when extraction fails outright.
    pub failure_sentinel: String,
}

impl Default for TextgrabConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            preprocessing: PreprocessConfig::default(),
            retry: RetryConfig::default(),
            failure_sentinel: DEFAULT_FAILURE_SENTINEL.into(),
        }
    }
}

impl TextgrabConfig {
    /// Read a JSON configuration file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        info!(path = %path.display(), backend = ?config.engine.backend, "Configuration loaded");
        Ok(config)
    }

    /// Build a configuration from the process environment.
    ///
    /// Starts from the file named by `TEXTGRAB_CONFIG` (or the defaults), then
    /// applies `TEXTGRAB_ENGINE`, `TEXTGRAB_LANG`, `TEXTGRAB_TESSDATA` and
    /// `TEXTGRAB_MODEL_DIR`.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::load(PathBuf::from(path))?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `TEXTGRAB_*` overrides looked up through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(backend) = lookup("TEXTGRAB_ENGINE") {
            self.engine.backend = backend.parse()?;
            debug!(backend = ?self.engine.backend, "Engine backend overridden");
        }
        if let Some(lang) = lookup("TEXTGRAB_LANG") {
            self.engine.language = lang;
        }
        if let Some(dir) = lookup("TEXTGRAB_TESSDATA") {
            self.engine.tessdata_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("TEXTGRAB_MODEL_DIR") {
            self.engine.model_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.engine.language.trim().is_empty() {
            return Err(TextgrabError::Config("engine.language must not be empty".into()));
        }
        if self.preprocessing.target_min_width == 0 {
            return Err(TextgrabError::Config(
                "preprocessing.target_min_width must be positive".into(),
            ));
        }
        if self.preprocessing.thumbnail_width == 0 {
            return Err(TextgrabError::Config(
                "preprocessing.thumbnail_width must be positive".into(),
            ));
        }
        if self.preprocessing.max_output_pixels == 0 {
            return Err(TextgrabError::Config(
                "preprocessing.max_output_pixels must be positive".into(),
            ));
        }
        if !(self.preprocessing.gamma.is_finite() && self.preprocessing.gamma > 0.0) {
            return Err(TextgrabError::Config(format!(
                "preprocessing.gamma must be a positive number, got {}",
                self.preprocessing.gamma
            )));
        }
        if !(0.0..=255.0).contains(&self.preprocessing.colorfulness_threshold) {
            return Err(TextgrabError::Config(format!(
                "preprocessing.colorfulness_threshold must be within [0, 255], got {}",
                self.preprocessing.colorfulness_threshold
            )));
        }
        for (name, value) in [
            ("retry.min_confidence", self.retry.min_confidence),
            ("retry.empty_pass_confidence", self.retry.empty_pass_confidence),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(TextgrabError::Config(format!(
                    "{name} must be within [0, 100], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// The sentinel to report on total failure, falling back to the built-in
    /// marker when the configured one is blank.
    pub fn sentinel(&self) -> &str {
        if self.failure_sentinel.trim().is_empty() {
            DEFAULT_FAILURE_SENTINEL
        } else {
            &self.failure_sentinel
        }
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pure-Rust backend using the `ocrs` crate, a neural OCR engine whose models
// run on `rten`.
//
// # Model Setup
//
// The engine needs two model files:
//
// - **Detection model** (`text-detection.rten`) locates words in the image.
// - **Recognition model** (`text-recognition.rten`) decodes characters from
//   detected lines.
//
// Running `ocrs-cli` once downloads both into `$XDG_CACHE_HOME/ocrs`
// (typically `~/.cache/ocrs`), which is where they are looked for unless
// `engine.model_dir` says otherwise.
//
// **Important:** `ocrs` and `rten` are 10-100x slower in debug builds.

use std::path::{Path, PathBuf};

use ::ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use textgrab_core::config::EngineConfig;
use textgrab_core::error::{Result, TextgrabError};
use textgrab_core::types::{
    EngineMode, ImageBuffer, RecognitionParams, RecognitionResult, SegmentationMode, WordResult,
};
use textgrab_image::ImageProcessor;
use tracing::{debug, info, instrument};

use super::{RecognitionEngine, apply_whitelist};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `ocrs` produces no per-word scores; its words count as fully confident.
const OCRS_WORD_CONFIDENCE: f32 = 100.0;

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Locations of the two `.rten` model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl ModelPaths {
    /// Expect `text-detection.rten` and `text-recognition.rten` in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection: dir.join(DETECTION_MODEL_FILENAME),
            recognition: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// `engine.model_dir`, or the ocrs cache directory.
    pub fn for_config(config: &EngineConfig) -> Self {
        match &config.model_dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::from_dir(default_model_dir()),
        }
    }

    /// Verify that both model files exist.
    pub fn validate(&self) -> Result<()> {
        for (kind, path) in [("detection", &self.detection), ("recognition", &self.recognition)] {
            if !path.exists() {
                return Err(TextgrabError::EngineUnavailable(format!(
                    "{kind} model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// `ocrs` engine instance plus the parameters it emulates.
pub struct OcrsEngine {
    engine: OcrEngine,
    /// Join recognised lines with spaces instead of newlines.
    single_line: bool,
    /// Characters to keep; empty keeps all.
    whitelist: String,
}

impl OcrsEngine {
    /// Load both models. This is the expensive step.
    #[instrument(skip_all, fields(
        detection = %models.detection.display(),
        recognition = %models.recognition.display(),
    ))]
    pub fn new(models: &ModelPaths) -> Result<Self> {
        models.validate()?;

        info!("Loading ocrs detection model");
        let detection_model = load_model(&models.detection, "detection")?;
        info!("Loading ocrs recognition model");
        let recognition_model = load_model(&models.recognition, "recognition")?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| {
            TextgrabError::EngineUnavailable(format!("failed to initialise ocrs engine: {err}"))
        })?;

        info!("ocrs engine initialised");
        Ok(Self {
            engine,
            single_line: false,
            whitelist: String::new(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(&ModelPaths::for_config(config))
    }

    fn recognize_lines(&self, image: &ImageBuffer) -> Result<Vec<String>> {
        let rgb = ImageProcessor::from_buffer(image)?.into_dynamic().to_rgb8();
        let (width, height) = rgb.dimensions();

        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            TextgrabError::Recognition(format!(
                "failed to create image source ({width}x{height}): {err}"
            ))
        })?;
        let input = self.engine.prepare_input(source).map_err(|err| {
            TextgrabError::Recognition(format!("ocrs input preparation failed: {err}"))
        })?;

        let word_rects = self.engine.detect_words(&input).map_err(|err| {
            TextgrabError::Recognition(format!("word detection failed: {err}"))
        })?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| TextgrabError::Recognition(format!("line recognition failed: {err}")))?;

        Ok(lines
            .iter()
            .flatten()
            .map(|line| apply_whitelist(&line.to_string(), &self.whitelist))
            .filter(|line| !line.trim().is_empty())
            .collect())
    }
}

fn load_model(path: &Path, kind: &str) -> Result<Model> {
    Model::load_file(path).map_err(|err| {
        TextgrabError::EngineUnavailable(format!(
            "failed to load {kind} model from {}: {err}",
            path.display()
        ))
    })
}

impl RecognitionEngine for OcrsEngine {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn configure(&mut self, params: &RecognitionParams) -> Result<()> {
        let mut rejected = Vec::new();

        if let Some(mode) = params.segmentation_mode {
            if mode == SegmentationMode::OsdOnly {
                rejected.push(format!("segmentation mode {mode} (orientation detection only)"));
            } else {
                self.single_line = mode.is_single_line();
            }
        }
        if let Some(whitelist) = &params.character_whitelist {
            self.whitelist = whitelist.clone();
        }
        // Neural recognition only.
        if let Some(mode) = params.engine_mode {
            if !matches!(mode, EngineMode::Default | EngineMode::LstmOnly) {
                rejected.push(format!("engine mode {mode} (ocrs has no legacy recogniser)"));
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(TextgrabError::Configuration(rejected.join(", ")))
        }
    }

    #[instrument(skip_all, fields(data_len = image.len(), single_line = self.single_line))]
    fn recognize(&mut self, image: &ImageBuffer) -> Result<RecognitionResult> {
        let lines = self.recognize_lines(image)?;
        let separator = if self.single_line { " " } else { "\n" };
        let text = lines.join(separator);

        let words: Vec<WordResult> = text
            .split_whitespace()
            .map(|word| WordResult::new(word, OCRS_WORD_CONFIDENCE))
            .collect();

        debug!(line_count = lines.len(), word_count = words.len(), "ocrs pass complete");
        Ok(RecognitionResult::new(text, words))
    }
}

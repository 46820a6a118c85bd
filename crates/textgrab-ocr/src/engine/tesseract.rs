// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tesseract backend via `leptess`.
//
// Requires libtesseract and libleptonica at build time and the language's
// `.traineddata` at runtime (`engine.tessdata_dir`, or Tesseract's default
// search path / `TESSDATA_PREFIX`).

use leptess::{LepTess, Variable};
use textgrab_core::config::EngineConfig;
use textgrab_core::error::{Result, TextgrabError};
use textgrab_core::types::{EngineMode, ImageBuffer, RecognitionParams, RecognitionResult};
use tracing::{debug, info, instrument};

use super::{RecognitionEngine, hocr};

/// Tesseract engine instance.
pub struct TesseractEngine {
    api: LepTess,
    language: String,
}

impl TesseractEngine {
    /// Load Tesseract for `config.language`.
    ///
    /// # Errors
    ///
    /// [`TextgrabError::EngineUnavailable`] when the library or the language
    /// data cannot be loaded.
    #[instrument(skip_all, fields(language = %config.language))]
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let data_path = config
            .tessdata_dir
            .as_ref()
            .map(|dir| dir.to_string_lossy().into_owned());

        let api = LepTess::new(data_path.as_deref(), &config.language).map_err(|err| {
            TextgrabError::EngineUnavailable(format!(
                "failed to initialise Tesseract for {:?}: {}",
                config.language, err
            ))
        })?;

        info!(
            tessdata = data_path.as_deref().unwrap_or("<default>"),
            "Tesseract engine initialised"
        );
        Ok(Self {
            api,
            language: config.language.clone(),
        })
    }

    fn set(&mut self, variable: Variable, value: &str, label: &str, rejected: &mut Vec<String>) {
        if let Err(err) = self.api.set_variable(variable, value) {
            rejected.push(format!("{label}={value:?} ({err})"));
        }
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn configure(&mut self, params: &RecognitionParams) -> Result<()> {
        let mut rejected = Vec::new();

        if let Some(mode) = params.segmentation_mode {
            self.set(
                Variable::TesseditPagesegMode,
                &mode.to_string(),
                "tessedit_pageseg_mode",
                &mut rejected,
            );
        }
        if let Some(whitelist) = &params.character_whitelist {
            self.set(
                Variable::TesseditCharWhitelist,
                whitelist,
                "tessedit_char_whitelist",
                &mut rejected,
            );
        }
        if let Some(preserve) = params.preserve_interword_spaces {
            self.set(
                Variable::PreserveInterwordSpaces,
                if preserve { "1" } else { "0" },
                "preserve_interword_spaces",
                &mut rejected,
            );
        }
        // The engine mode is fixed when the language data loads. leptess loads
        // with the default mode, which runs LSTM when the traineddata has it.
        if let Some(mode) = params.engine_mode {
            if !matches!(mode, EngineMode::Default | EngineMode::LstmOnly) {
                rejected.push(format!(
                    "tessedit_ocr_engine_mode={mode} (fixed at initialisation)"
                ));
            }
        }

        if rejected.is_empty() {
            debug!(?params, "Tesseract parameters applied");
            Ok(())
        } else {
            Err(TextgrabError::Configuration(rejected.join(", ")))
        }
    }

    #[instrument(skip_all, fields(language = %self.language, data_len = image.len()))]
    fn recognize(&mut self, image: &ImageBuffer) -> Result<RecognitionResult> {
        self.api.set_image_from_mem(image.bytes()).map_err(|err| {
            TextgrabError::Recognition(format!("Tesseract could not read the image: {err}"))
        })?;

        let hocr = self.api.get_hocr_text(0).map_err(|err| {
            TextgrabError::Recognition(format!("Tesseract hOCR output was not UTF-8: {err}"))
        })?;
        let text = self.api.get_utf8_text().map_err(|err| {
            TextgrabError::Recognition(format!("Tesseract text output was not UTF-8: {err}"))
        })?;

        let words = hocr::parse_words(&hocr);
        debug!(
            word_count = words.len(),
            char_count = text.chars().count(),
            "Tesseract pass complete"
        );
        Ok(RecognitionResult::new(text, words))
    }
}

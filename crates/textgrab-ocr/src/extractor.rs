// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Extraction pipeline: colourfulness check → preprocessing → recognition with
// confidence-gated retry → normalisation.
//
// `TextExtractor::extract` reports failures; `TextExtractor::extract_text` and
// the free `extract_text` never do and return the failure sentinel instead.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use textgrab_core::config::TextgrabConfig;
use textgrab_core::error::Result;
use textgrab_core::types::{
    DEFAULT_MIME_TYPE, ExtractionOptions, ExtractionReport, ImageBuffer, PreprocessingDirective,
};
use textgrab_image::{ImageAnalysis, select_analysis};
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::EngineAdapter;
use crate::engine::EngineFactory;
use crate::normalize::normalize_text;
use crate::retry::{RetryPolicy, recognize_with_retry};

/// The full text extraction pipeline around one recognition engine.
pub struct TextExtractor {
    config: TextgrabConfig,
    analysis: Arc<dyn ImageAnalysis>,
    adapter: EngineAdapter,
}

impl TextExtractor {
    /// Build the pipeline described by `config`. The engine itself is not
    /// created until the first extraction.
    pub fn new(config: TextgrabConfig) -> Self {
        let analysis = select_analysis(&config.preprocessing);
        let adapter = EngineAdapter::from_config(&config.engine);
        Self {
            config,
            analysis,
            adapter,
        }
    }

    /// Build the pipeline with a specific image stage and engine factory.
    pub fn with_parts(
        config: TextgrabConfig,
        analysis: Arc<dyn ImageAnalysis>,
        factory: EngineFactory,
    ) -> Self {
        let adapter = EngineAdapter::new(factory, config.engine.baseline.clone());
        Self {
            config,
            analysis,
            adapter,
        }
    }

    pub fn config(&self) -> &TextgrabConfig {
        &self.config
    }

    pub fn adapter(&self) -> &EngineAdapter {
        &self.adapter
    }

    /// Options whose retry threshold and mode come from configuration.
    pub fn default_options(&self) -> ExtractionOptions {
        ExtractionOptions {
            min_confidence: self.config.retry.min_confidence,
            retry_psm: self.config.retry.retry_psm,
            ..Default::default()
        }
    }

    /// Extract text from `image`.
    ///
    /// # Errors
    ///
    /// Fails only when the engine is unavailable or the primary recognition
    /// pass fails. Preprocessing, parameter and retry problems are logged and
    /// worked around.
    #[instrument(skip_all, fields(
        data_len = image.len(),
        mime = image.mime_type(),
        numeric = options.numeric,
        emoji_preserve = options.emoji_preserve,
    ))]
    pub async fn extract(
        &self,
        image: ImageBuffer,
        options: &ExtractionOptions,
    ) -> Result<ExtractionReport> {
        let started = Instant::now();

        let keep_color = options.emoji_preserve && self.is_colorful(&image).await;
        let directive = PreprocessingDirective {
            target_min_width: self.config.preprocessing.target_min_width,
            skip_color_removal: keep_color,
        };
        let prepared = self.preprocess(image, directive).await;

        let policy = RetryPolicy::for_call(options, &self.config.retry);
        let outcome =
            recognize_with_retry(&self.adapter, &prepared, &options.recognition_params(), &policy)
                .await?;

        let text = normalize_text(&outcome.result.full_text, options.numeric, options.emoji_preserve);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            length = text.chars().count(),
            elapsed_ms,
            avg_conf = outcome.average_confidence,
            passes = outcome.passes,
            "OCR extraction completed"
        );

        Ok(ExtractionReport {
            text,
            average_confidence: outcome.average_confidence,
            passes: outcome.passes,
            used_alternate: outcome.used_alternate,
            color_preserved: keep_color,
            elapsed_ms,
        })
    }

    /// Extract text from `image`, returning the failure sentinel if nothing
    /// could be recognised. Never fails.
    pub async fn extract_text(&self, image: ImageBuffer, options: &ExtractionOptions) -> String {
        match self.extract(image, options).await {
            Ok(report) => report.text,
            Err(err) => {
                error!(error = %err, class = ?err.class(), "OCR extraction failed");
                self.config.sentinel().to_string()
            }
        }
    }

    /// Release the recognition engine. Later extractions return the sentinel.
    pub async fn shutdown(&self) {
        self.adapter.shutdown().await;
    }

    // -- Image stage ----------------------------------------------------------

    async fn is_colorful(&self, image: &ImageBuffer) -> bool {
        let analysis = Arc::clone(&self.analysis);
        let image = image.clone();
        match tokio::task::spawn_blocking(move || analysis.is_colorful(&image)).await {
            Ok(colorful) => {
                debug!(colorful, "Colourfulness checked");
                colorful
            }
            Err(err) => {
                warn!(error = %err, "Colourfulness check aborted, treating image as greyscale");
                false
            }
        }
    }

    async fn preprocess(&self, image: ImageBuffer, directive: PreprocessingDirective) -> ImageBuffer {
        let analysis = Arc::clone(&self.analysis);
        let original = image.clone();
        match tokio::task::spawn_blocking(move || analysis.preprocess(&image, &directive)).await {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(error = %err, "Preprocessing aborted, using original buffer");
                original
            }
        }
    }
}

// -- Process-wide extractor ---------------------------------------------------

static SHARED: OnceLock<TextExtractor> = OnceLock::new();

/// The process-wide extractor, configured from the environment on first use
/// (see [`TextgrabConfig::from_env`]). An invalid environment configuration is
/// logged and the defaults are used.
pub fn shared() -> &'static TextExtractor {
    SHARED.get_or_init(|| {
        let config = TextgrabConfig::from_env().unwrap_or_else(|err| {
            warn!(error = %err, "Invalid textgrab configuration, using defaults");
            TextgrabConfig::default()
        });
        TextExtractor::new(config)
    })
}

/// Extract text from encoded image bytes with the process-wide extractor.
///
/// An empty `mime_type` means PNG. Always resolves to a string: the
/// recognised text, or the failure sentinel.
pub async fn extract_text(
    data: impl Into<Arc<[u8]>>,
    mime_type: &str,
    options: &ExtractionOptions,
) -> String {
    shared().extract_text(caller_buffer(data, mime_type), options).await
}

/// Wrap caller bytes, defaulting a blank MIME type to PNG.
fn caller_buffer(data: impl Into<Arc<[u8]>>, mime_type: &str) -> ImageBuffer {
    let mime_type = mime_type.trim();
    if mime_type.is_empty() {
        ImageBuffer::new(data, DEFAULT_MIME_TYPE)
    } else {
        ImageBuffer::new(data, mime_type)
    }
}

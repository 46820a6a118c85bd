// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Confidence-gated retry for recognition.
//
// The primary pass runs with the caller's parameters. If its average word
// confidence falls below the threshold, exactly one alternate pass runs with a
// different segmentation mode, and the better of the two results is kept.
// A failed alternate pass never costs the caller the primary result.

use textgrab_core::config::RetryConfig;
use textgrab_core::error::{Result, TextgrabError};
use textgrab_core::types::{
    ExtractionOptions, ImageBuffer, RecognitionParams, RecognitionResult, SegmentationMode,
};
use tracing::{debug, info, instrument, warn};

use crate::adapter::EngineAdapter;

/// Retry settings for one extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Average confidence below which the alternate pass runs.
    pub min_confidence: f32,
    /// Segmentation mode for the alternate pass.
    pub retry_mode: SegmentationMode,
    /// Average confidence of a pass without words.
    pub empty_pass_confidence: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            retry_mode: config.retry_psm,
            empty_pass_confidence: config.empty_pass_confidence,
        }
    }

    /// Threshold and retry mode come from the call, the empty-pass value
    /// from configuration.
    pub fn for_call(options: &ExtractionOptions, config: &RetryConfig) -> Self {
        Self {
            min_confidence: options.min_confidence,
            retry_mode: options.retry_psm,
            empty_pass_confidence: config.empty_pass_confidence,
        }
    }

    /// Average confidence of `result` under this policy.
    pub fn average_confidence(&self, result: &RecognitionResult) -> f32 {
        result.average_confidence(self.empty_pass_confidence)
    }
}

/// Result of evaluating the primary pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Confident enough; keep the primary result.
    Accept,
    /// Run one alternate pass in this segmentation mode.
    RetryWith(SegmentationMode),
}

/// Decide whether a pass with average confidence `average` warrants the
/// alternate pass. The comparison is strict: exactly at the threshold is
/// accepted.
pub fn should_retry(average: f32, policy: &RetryPolicy) -> RetryDecision {
    if average < policy.min_confidence {
        RetryDecision::RetryWith(policy.retry_mode)
    } else {
        RetryDecision::Accept
    }
}

/// Whether the alternate result replaces the primary one: strictly longer
/// text (in characters), or strictly higher average confidence.
pub fn prefer_alternate(
    primary: &RecognitionResult,
    primary_avg: f32,
    alternate: &RecognitionResult,
    alternate_avg: f32,
) -> bool {
    alternate.text_len() > primary.text_len() || alternate_avg > primary_avg
}

/// What the retry controller settled on.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome {
    pub result: RecognitionResult,
    pub average_confidence: f32,
    /// Passes that reached the engine (1 or 2).
    pub passes: u8,
    pub used_alternate: bool,
}

/// Run the primary pass and, when it is under-confident, one alternate pass.
///
/// # Errors
///
/// Only the primary pass can fail the call. Alternate-pass failures are logged
/// and the primary result is returned.
#[instrument(skip_all, fields(
    min_confidence = policy.min_confidence,
    retry_psm = %policy.retry_mode,
))]
pub async fn recognize_with_retry(
    adapter: &EngineAdapter,
    image: &ImageBuffer,
    params: &RecognitionParams,
    policy: &RetryPolicy,
) -> Result<RetryOutcome> {
    let primary = adapter.run_pass(image, params).await?;
    let primary_avg = policy.average_confidence(&primary);

    let mode = match should_retry(primary_avg, policy) {
        RetryDecision::Accept => {
            debug!(avg_conf = primary_avg, "Primary pass accepted");
            return Ok(RetryOutcome {
                result: primary,
                average_confidence: primary_avg,
                passes: 1,
                used_alternate: false,
            });
        }
        RetryDecision::RetryWith(mode) => mode,
    };

    info!(
        avg_conf = primary_avg,
        retry_psm = %mode,
        "Low OCR confidence detected, retrying with alternate segmentation mode"
    );
    let alternate_params = params.clone().with_segmentation_mode(mode);

    let alternate = match adapter.run_pass(image, &alternate_params).await {
        Ok(alternate) => alternate,
        Err(err) => {
            let err = TextgrabError::RetryPass(err.to_string());
            warn!(error = %err, class = ?err.class(), "Alternate OCR pass failed, keeping primary result");
            return Ok(RetryOutcome {
                result: primary,
                average_confidence: primary_avg,
                passes: 2,
                used_alternate: false,
            });
        }
    };
    let alternate_avg = policy.average_confidence(&alternate);

    if prefer_alternate(&primary, primary_avg, &alternate, alternate_avg) {
        debug!(
            primary_avg,
            alternate_avg,
            primary_len = primary.text_len(),
            alternate_len = alternate.text_len(),
            "Alternate pass selected"
        );
        Ok(RetryOutcome {
            result: alternate,
            average_confidence: alternate_avg,
            passes: 2,
            used_alternate: true,
        })
    } else {
        debug!(primary_avg, alternate_avg, "Primary pass kept after retry");
        Ok(RetryOutcome {
            result: primary,
            average_confidence: primary_avg,
            passes: 2,
            used_alternate: false,
        })
    }
}

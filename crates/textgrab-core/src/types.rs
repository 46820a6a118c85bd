// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the textgrab extraction pipeline.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TextgrabError;

/// MIME type assumed when a caller does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// Encoded image bytes plus the MIME type the caller declared for them.
///
/// The payload is shared, never mutated: cloning an `ImageBuffer` is cheap and
/// every pipeline stage reads the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    data: Arc<[u8]>,
    mime_type: String,
}

impl ImageBuffer {
    pub fn new(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Wrap PNG-encoded bytes.
    pub fn png(data: impl Into<Arc<[u8]>>) -> Self {
        Self::new(data, DEFAULT_MIME_TYPE)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether two buffers share the same allocation.
    pub fn same_payload(&self, other: &ImageBuffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// Per-call instructions for the image preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessingDirective {
    /// Images narrower than this are upscaled to it.
    pub target_min_width: u32,
    /// Keep colour: skip the greyscale + contrast normalisation step.
    pub skip_color_removal: bool,
}

impl Default for PreprocessingDirective {
    fn default() -> Self {
        Self {
            target_min_width: 1600,
            skip_color_removal: false,
        }
    }
}

// -- Engine parameters --------------------------------------------------------

/// Page segmentation mode: how the engine partitions the image into text
/// regions before recognition. Codes follow Tesseract's `--psm` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationMode {
    OsdOnly,
    AutoOsd,
    AutoOnly,
    Auto,
    SingleColumn,
    SingleBlockVertical,
    SingleBlock,
    SingleLine,
    SingleWord,
    CircleWord,
    SingleChar,
    SparseText,
    SparseTextOsd,
    RawLine,
}

impl SegmentationMode {
    pub fn code(self) -> u8 {
        match self {
            Self::OsdOnly => 0,
            Self::AutoOsd => 1,
            Self::AutoOnly => 2,
            Self::Auto => 3,
            Self::SingleColumn => 4,
            Self::SingleBlockVertical => 5,
            Self::SingleBlock => 6,
            Self::SingleLine => 7,
            Self::SingleWord => 8,
            Self::CircleWord => 9,
            Self::SingleChar => 10,
            Self::SparseText => 11,
            Self::SparseTextOsd => 12,
            Self::RawLine => 13,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::OsdOnly,
            1 => Self::AutoOsd,
            2 => Self::AutoOnly,
            3 => Self::Auto,
            4 => Self::SingleColumn,
            5 => Self::SingleBlockVertical,
            6 => Self::SingleBlock,
            7 => Self::SingleLine,
            8 => Self::SingleWord,
            9 => Self::CircleWord,
            10 => Self::SingleChar,
            11 => Self::SparseText,
            12 => Self::SparseTextOsd,
            13 => Self::RawLine,
            _ => return None,
        })
    }

    /// Modes that treat the whole image as one line of text (or less).
    pub fn is_single_line(self) -> bool {
        matches!(
            self,
            Self::SingleLine | Self::SingleWord | Self::CircleWord | Self::SingleChar | Self::RawLine
        )
    }
}

/// Recognition algorithm variant. Codes follow Tesseract's `--oem` numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineMode {
    LegacyOnly,
    LstmOnly,
    LegacyAndLstm,
    Default,
}

impl EngineMode {
    pub fn code(self) -> u8 {
        match self {
            Self::LegacyOnly => 0,
            Self::LstmOnly => 1,
            Self::LegacyAndLstm => 2,
            Self::Default => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::LegacyOnly,
            1 => Self::LstmOnly,
            2 => Self::LegacyAndLstm,
            3 => Self::Default,
            _ => return None,
        })
    }
}

/// Both modes travel as their numeric code. Callers frequently hand them over
/// as strings (`"6"`), so parsing accepts either form.
macro_rules! numeric_code_impls {
    ($ty:ident, $label:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.code())
            }
        }

        impl FromStr for $ty {
            type Err = TextgrabError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim()
                    .parse::<u8>()
                    .ok()
                    .and_then(Self::from_code)
                    .ok_or_else(|| {
                        TextgrabError::Config(format!("unknown {} {:?}", $label, s))
                    })
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Code {
                    Number(u8),
                    Text(String),
                }

                match Code::deserialize(deserializer)? {
                    Code::Number(n) => Self::from_code(n).ok_or_else(|| {
                        serde::de::Error::custom(format!("unknown {} {}", $label, n))
                    }),
                    Code::Text(s) => s.parse().map_err(serde::de::Error::custom),
                }
            }
        }
    };
}

numeric_code_impls!(SegmentationMode, "segmentation mode");
numeric_code_impls!(EngineMode, "engine mode");

/// Engine parameter overrides applied before a recognition pass. `None` means
/// "leave whatever is active".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionParams {
    pub segmentation_mode: Option<SegmentationMode>,
    pub engine_mode: Option<EngineMode>,
    pub character_whitelist: Option<String>,
    pub preserve_interword_spaces: Option<bool>,
}

impl RecognitionParams {
    pub fn is_empty(&self) -> bool {
        self.segmentation_mode.is_none()
            && self.engine_mode.is_none()
            && self.character_whitelist.is_none()
            && self.preserve_interword_spaces.is_none()
    }

    /// Layer `self` on top of `base`: fields set here win.
    pub fn merged_over(&self, base: &RecognitionParams) -> RecognitionParams {
        RecognitionParams {
            segmentation_mode: self.segmentation_mode.or(base.segmentation_mode),
            engine_mode: self.engine_mode.or(base.engine_mode),
            character_whitelist: self
                .character_whitelist
                .clone()
                .or_else(|| base.character_whitelist.clone()),
            preserve_interword_spaces: self
                .preserve_interword_spaces
                .or(base.preserve_interword_spaces),
        }
    }

    /// Same parameters with a different segmentation mode.
    pub fn with_segmentation_mode(mut self, mode: SegmentationMode) -> Self {
        self.segmentation_mode = Some(mode);
        self
    }
}

// -- Recognition output -------------------------------------------------------

/// A recognised word and the engine's certainty about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordResult {
    pub text: String,
    /// Always within [0, 100].
    pub confidence: f32,
}

impl WordResult {
    /// Build a word, clamping the confidence into [0, 100]. NaN becomes 0.
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 100.0)
        };
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Output of one recognition pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub full_text: String,
    pub words: Vec<WordResult>,
}

impl RecognitionResult {
    pub fn new(full_text: impl Into<String>, words: Vec<WordResult>) -> Self {
        Self {
            full_text: full_text.into(),
            words,
        }
    }

    /// Mean word confidence, or `empty_value` when the pass produced no words.
    pub fn average_confidence(&self, empty_value: f32) -> f32 {
        if self.words.is_empty() {
            return empty_value;
        }
        let sum: f32 = self.words.iter().map(|w| w.confidence).sum();
        sum / self.words.len() as f32
    }

    /// Length of the recognised text in characters.
    pub fn text_len(&self) -> usize {
        self.full_text.chars().count()
    }
}

// -- Caller-facing options ----------------------------------------------------

/// Per-call extraction options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionOptions {
    /// Segmentation mode for the primary pass.
    pub psm: Option<SegmentationMode>,
    /// Restrict recognition to these characters.
    pub whitelist: Option<String>,
    /// Engine mode override.
    pub oem: Option<EngineMode>,
    /// Average confidence below which the alternate pass runs.
    pub min_confidence: f32,
    /// Segmentation mode for the alternate pass.
    pub retry_psm: SegmentationMode,
    /// Rewrite digit/letter confusions in numeric-looking tokens.
    pub numeric: bool,
    /// Keep colour and non-text glyphs.
    pub emoji_preserve: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            psm: None,
            whitelist: None,
            oem: None,
            min_confidence: 60.0,
            retry_psm: SegmentationMode::SingleBlock,
            numeric: false,
            emoji_preserve: false,
        }
    }
}

impl ExtractionOptions {
    /// The engine overrides these options ask for.
    pub fn recognition_params(&self) -> RecognitionParams {
        RecognitionParams {
            segmentation_mode: self.psm,
            engine_mode: self.oem,
            character_whitelist: self.whitelist.clone(),
            preserve_interword_spaces: None,
        }
    }
}

/// Result of a full extraction, with diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub text: String,
    /// Average word confidence of the result that was kept.
    pub average_confidence: f32,
    /// Recognition passes run (1 or 2).
    pub passes: u8,
    /// Whether the alternate pass result replaced the primary one.
    pub used_alternate: bool,
    /// Whether colour was preserved during preprocessing.
    pub color_preserved: bool,
    pub elapsed_ms: u64,
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for textgrab.

use thiserror::Error;

/// Top-level error type for all textgrab operations.
#[derive(Debug, Error)]
pub enum TextgrabError {
    // -- Image stage --
    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Engine stage --
    #[error("engine configuration rejected: {0}")]
    Configuration(String),

    #[error("recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("retry pass failed: {0}")]
    RetryPass(String),

    // -- Settings / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where an error sits in the extraction pipeline, and what the pipeline does
/// about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Image decode / transform failure. The original buffer is used instead.
    Preprocessing,
    /// An engine parameter could not be applied. The previous parameters stay
    /// active.
    Configuration,
    /// The alternate recognition pass failed. The primary result is kept.
    RetryPass,
    /// The engine is missing or the primary pass failed. Terminal for the call.
    Pipeline,
}

impl ErrorClass {
    /// Whether the pipeline carries on after an error of this class.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorClass::Pipeline)
    }
}

impl TextgrabError {
    /// Classify this error for the extraction pipeline.
    pub fn class(&self) -> ErrorClass {
        match self {
            TextgrabError::ImageError(_) => ErrorClass::Preprocessing,
            TextgrabError::Configuration(_) => ErrorClass::Configuration,
            TextgrabError::RetryPass(_) => ErrorClass::RetryPass,
            TextgrabError::EngineUnavailable(_)
            | TextgrabError::Recognition(_)
            | TextgrabError::Config(_)
            | TextgrabError::Io(_)
            | TextgrabError::Serialization(_) => ErrorClass::Pipeline,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TextgrabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_errors_are_recoverable() {
        assert!(TextgrabError::ImageError("bad png".into()).class().is_recoverable());
        assert!(TextgrabError::Configuration("psm".into()).class().is_recoverable());
        assert!(TextgrabError::RetryPass("boom".into()).class().is_recoverable());
    }

    #[test]
    fn engine_failures_are_terminal() {
        let err = TextgrabError::EngineUnavailable("no backend".into());
        assert_eq!(err.class(), ErrorClass::Pipeline);
        assert!(!err.class().is_recoverable());

        let err = TextgrabError::Recognition("crashed".into());
        assert_eq!(err.class(), ErrorClass::Pipeline);
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TextgrabError = io.into();
        assert!(matches!(err, TextgrabError::Io(_)));
        assert!(err.to_string().contains("gone"));
    }
}

// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// textgrab-ocr — Text recognition for textgrab.
//
// Wraps a single recognition engine behind a lazily-initialised, serialised
// adapter, drives the confidence-gated retry, normalises the recognised text
// and ties the stages together in `TextExtractor`.

pub mod adapter;
pub mod engine;
pub mod extractor;
pub mod normalize;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::EngineAdapter;
pub use engine::{EngineFactory, RecognitionEngine, create_engine};
pub use extractor::{TextExtractor, extract_text, shared};
pub use normalize::normalize_text;
pub use retry::{RetryOutcome, RetryPolicy};

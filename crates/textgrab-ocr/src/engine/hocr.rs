// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// hOCR word extraction. Tesseract reports per-word confidence only through its
// hOCR renderer (`x_wconf` in each `ocrx_word` span's title).

use std::sync::LazyLock;

use regex::Regex;
use textgrab_core::types::WordResult;

static WORD_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<span\b([^>]*\bclass\s*=\s*['"][^'"]*\bocrx_word\b[^'"]*['"][^>]*)>(.*?)</span>"#)
        .expect("static hOCR word regex must compile")
});

static WORD_CONFIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bx_wconf\s+(-?\d+(?:\.\d+)?)").expect("static x_wconf regex must compile")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static tag regex must compile"));

/// Parse every `ocrx_word` span in `hocr` into a [`WordResult`].
///
/// Words without an `x_wconf` entry get confidence 0. Words that are empty
/// once markup is stripped are dropped.
pub fn parse_words(hocr: &str) -> Vec<WordResult> {
    WORD_SPAN
        .captures_iter(hocr)
        .filter_map(|caps| {
            let attributes = caps.get(1).map_or("", |m| m.as_str());
            let inner = caps.get(2).map_or("", |m| m.as_str());

            let text = decode_entities(TAG.replace_all(inner, "").trim());
            if text.is_empty() {
                return None;
            }

            let confidence = WORD_CONFIDENCE
                .captures(attributes)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f32>().ok())
                .unwrap_or(0.0);

            Some(WordResult::new(text, confidence))
        })
        .collect()
}

/// Decode the handful of entities Tesseract's hOCR writer emits.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

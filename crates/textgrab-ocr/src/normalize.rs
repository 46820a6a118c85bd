// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text normalisation for recognised output: whitespace cleanup, token-aware
// digit/letter confusion repair, and control-character stripping.

use std::sync::LazyLock;

use regex::Regex;

/// A run of whitespace, or one character outside `[A-Za-z0-9_.,:\-/]`.
static DELIMITER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+|[^A-Za-z0-9_.,:\-/]").expect("static delimiter regex must compile")
});

/// Characters OCR engines commonly read in place of digits.
const CONFUSABLES: &[char] = &[
    'O', 'o', 'l', 'I', 'i', '|', 'S', 's', 'Z', 'z', 'B', 'b', 'g', 'q',
];

/// Punctuation that may appear inside a number (times, dates, decimals).
const NUMERIC_PUNCTUATION: &[char] = &['.', ',', ':', '-', '/'];

/// One piece of tokenised text. Concatenating every token's text reproduces
/// the input exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Word(&'a str),
    Delimiter(&'a str),
}

impl<'a> Token<'a> {
    pub fn as_str(&self) -> &'a str {
        match self {
            Token::Word(s) | Token::Delimiter(s) => s,
        }
    }
}

/// Split `text` into words and the delimiters between them, dropping empty
/// pieces.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for delimiter in DELIMITER.find_iter(text) {
        if delimiter.start() > last {
            tokens.push(Token::Word(&text[last..delimiter.start()]));
        }
        tokens.push(Token::Delimiter(delimiter.as_str()));
        last = delimiter.end();
    }
    if last < text.len() {
        tokens.push(Token::Word(&text[last..]));
    }
    tokens
}

fn is_confusable(c: char) -> bool {
    CONFUSABLES.contains(&c)
}

/// Whether a word looks like it was meant to be a number: it contains a
/// digit or a confusable, or consists only of digits, confusables and
/// numeric punctuation.
pub fn is_numeric_like(word: &str) -> bool {
    word.chars().any(|c| c.is_ascii_digit() || is_confusable(c))
        || (!word.is_empty()
            && word
                .chars()
                .all(|c| c.is_ascii_digit() || is_confusable(c) || NUMERIC_PUNCTUATION.contains(&c)))
}

fn confusable_digit(c: char) -> Option<char> {
    Some(match c {
        'O' | 'o' => '0',
        'l' | 'I' | 'i' | '|' => '1',
        'S' | 's' => '5',
        'Z' | 'z' => '2',
        'B' => '8',
        'b' => '6',
        'g' | 'q' => '9',
        _ => return None,
    })
}

/// Rewrite digit/letter confusions inside numeric-looking words. Delimiters
/// and other words pass through untouched.
pub fn normalize_numeric_tokens(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for token in tokenize(text) {
        match token {
            Token::Word(word) if is_numeric_like(word) => {
                out.extend(word.chars().map(|c| confusable_digit(c).unwrap_or(c)));
            }
            other => out.push_str(other.as_str()),
        }
    }
    out
}

/// Remove ASCII control characters (0x00–0x1F and 0x7F), line breaks
/// included.
pub fn strip_control_chars(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_control()).collect()
}

/// Normalise recognised text:
///
/// 1. No-break spaces become plain spaces; surrounding whitespace (and any
///    byte-order mark) is trimmed.
/// 2. With `numeric`, confusions in numeric-looking words are repaired.
/// 3. Without `emoji_preserve`, control characters are stripped.
pub fn normalize_text(raw: &str, numeric: bool, emoji_preserve: bool) -> String {
    let spaced = raw.replace('\u{00A0}', " ");
    let mut text = spaced
        .trim_matches(|c: char| c.is_whitespace() || c == '\u{FEFF}')
        .to_string();
    if numeric {
        text = normalize_numeric_tokens(&text);
    }
    if !emoji_preserve {
        text = strip_control_chars(&text);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pieces(text: &str) -> Vec<&str> {
        tokenize(text).iter().map(Token::as_str).collect()
    }

    #[test]
    fn time_with_letter_o_is_repaired() {
        assert_eq!(pieces("5:3O PM"), ["5:3O", " ", "PM"]);
        assert_eq!(normalize_numeric_tokens("5:3O PM"), "5:30 PM");
        assert_eq!(normalize_text("5:3O PM", true, false), "5:30 PM");
    }

    #[test]
    fn tokens_concatenate_back_to_input() {
        for input in [
            "Total: $1,2O4.5O (approx) — 3 items\t|  done",
            "",
            "   ",
            "a|b|c",
            "emoji 😀 and ünïcödé",
        ] {
            let joined: String = tokenize(input).iter().map(Token::as_str).collect();
            assert_eq!(joined, input);
        }
    }

    #[test]
    fn delimiters_are_never_rewritten() {
        // `|` is a delimiter here, not a word, so it stays.
        assert_eq!(normalize_numeric_tokens("1O | 2O"), "10 | 20");
        assert_eq!(pieces("1O|2O"), ["1O", "|", "2O"]);
    }

    #[test]
    fn numeric_normalisation_is_idempotent() {
        for input in ["5:3O PM", "IO/OS/2O24", "Order #B42-gq", "hello world", "l0l"] {
            let once = normalize_numeric_tokens(input);
            assert_eq!(normalize_numeric_tokens(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn full_confusion_table() {
        assert_eq!(normalize_numeric_tokens("OolIiSsZzBbgq"), "0011155228699");
    }

    #[test]
    fn words_without_digits_or_confusables_are_kept() {
        assert_eq!(normalize_numeric_tokens("PM CET far"), "PM CET far");
        assert!(!is_numeric_like("PM"));
        assert!(is_numeric_like("5:3O"));
        assert!(is_numeric_like("--"));
        assert!(!is_numeric_like(""));
    }

    #[test]
    fn nbsp_and_trim() {
        assert_eq!(normalize_text("\u{00A0} 42\u{00A0}kg \n", false, false), "42 kg");
    }

    #[test]
    fn leading_byte_order_mark_is_trimmed() {
        assert_eq!(normalize_text("\u{FEFF}5:3O\u{FEFF}", true, true), "5:30");
        assert_eq!(normalize_text("\u{FEFF} total", false, false), "total");
    }

    #[test]
    fn control_chars_are_stripped_unless_preserving() {
        assert_eq!(normalize_text("line one\nline\u{7F} two", false, false), "line oneline two");
        assert_eq!(
            normalize_text("line one\nline two 😀", false, true),
            "line one\nline two 😀"
        );
    }

    #[test]
    fn non_ascii_survives_stripping() {
        assert_eq!(strip_control_chars("café 😀\u{1}"), "café 😀");
    }
}

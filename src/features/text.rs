//! Text normalization and tokenization primitives shared by the pipeline stages.

use serde::{Deserialize, Serialize};

/// Marker prepended to a character token sequence.
pub const TEXT_START: char = '\u{2}';
/// Marker appended to a character token sequence.
pub const TEXT_END: char = '\u{3}';

/// Options for [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub lowercase: bool,
    pub keep_punctuation: bool,
    pub keep_numbers: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            keep_punctuation: false,
            keep_numbers: true,
        }
    }
}

/// Normalize text: case-fold, replace punctuation with spaces, collapse whitespace.
pub fn normalize(text: &str, options: &NormalizeOptions) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        let keep = if ch.is_alphabetic() {
            true
        } else if ch.is_numeric() {
            options.keep_numbers
        } else if ch.is_whitespace() {
            false
        } else {
            options.keep_punctuation
        };
        if !keep {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if options.lowercase {
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Split on whitespace.
pub fn tokenize_words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// One token per character, framed by [`TEXT_START`] and [`TEXT_END`].
pub fn tokenize_chars(text: &str) -> Vec<String> {
    let mut tokens = Vec::with_capacity(text.chars().count() + 2);
    tokens.push(TEXT_START.to_string());
    tokens.extend(text.chars().map(|ch| ch.to_string()));
    tokens.push(TEXT_END.to_string());
    tokens
}

/// Contiguous n-grams of `tokens` joined by `separator`.
///
/// With `all_lengths`, every length from 1 through `n` is emitted, shorter
/// grams first.
pub fn ngrams(tokens: &[String], n: usize, all_lengths: bool, separator: &str) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let min_len = if all_lengths { 1 } else { n };
    let mut out = Vec::new();
    for len in min_len..=n {
        if tokens.len() < len {
            break;
        }
        out.extend(tokens.windows(len).map(|window| window.join(separator)));
    }
    out
}

//! Generic text featurization: word uni/bigram counts plus character trigram
//! counts, each block L2-normalized and concatenated.

use serde::{Deserialize, Serialize};

use super::SparseVector;
use super::bag::Vocabulary;
use super::text::{NormalizeOptions, ngrams, normalize, tokenize_chars, tokenize_words};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturizeTextConfig {
    pub enabled: bool,
    pub word_ngram_length: usize,
    pub char_ngram_length: usize,
    pub max_terms: Option<usize>,
}

impl Default for FeaturizeTextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            word_ngram_length: 2,
            char_ngram_length: 3,
            max_terms: Some(100_000),
        }
    }
}

/// Fitted word and character dictionaries for one text column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFeaturizer {
    pub word_ngram_length: usize,
    pub char_ngram_length: usize,
    words: Vocabulary,
    chars: Vocabulary,
}

impl TextFeaturizer {
    pub fn fit(texts: &[String], config: &FeaturizeTextConfig) -> Self {
        let mut word_docs = Vec::with_capacity(texts.len());
        let mut char_docs = Vec::with_capacity(texts.len());
        for text in texts {
            let (words, chars) = grams(text, config.word_ngram_length, config.char_ngram_length);
            word_docs.push(words);
            char_docs.push(chars);
        }
        Self {
            word_ngram_length: config.word_ngram_length,
            char_ngram_length: config.char_ngram_length,
            words: Vocabulary::fit(&word_docs, config.max_terms, 1),
            chars: Vocabulary::fit(&char_docs, config.max_terms, 1),
        }
    }

    pub fn dim(&self) -> usize {
        self.words.len() + self.chars.len()
    }

    pub fn transform(&self, text: &str) -> SparseVector {
        let (words, chars) = grams(text, self.word_ngram_length, self.char_ngram_length);
        let mut word_block = self.words.count_vector(&words);
        word_block.l2_normalize();
        let mut char_block = self.chars.count_vector(&chars);
        char_block.l2_normalize();
        SparseVector::concat([&word_block, &char_block])
    }
}

fn grams(text: &str, word_n: usize, char_n: usize) -> (Vec<String>, Vec<String>) {
    let lowered = normalize(
        text,
        &NormalizeOptions {
            lowercase: true,
            keep_punctuation: true,
            keep_numbers: true,
        },
    );
    let words = ngrams(&tokenize_words(&lowered), word_n, true, " ");
    let chars = ngrams(&tokenize_chars(&lowered), char_n, false, "");
    (words, chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_unit_length() {
        let texts = vec!["Big red dog".to_string(), "small red cat".to_string()];
        let featurizer = TextFeaturizer::fit(&texts, &FeaturizeTextConfig::default());
        let v = featurizer.transform("big red dog");
        assert_eq!(v.dim, featurizer.dim());

        let words = featurizer.words.len();
        let word_norm: f32 = v
            .iter()
            .filter(|&(idx, _)| (idx as usize) < words)
            .map(|(_, x)| x * x)
            .sum();
        let char_norm: f32 = v
            .iter()
            .filter(|&(idx, _)| (idx as usize) >= words)
            .map(|(_, x)| x * x)
            .sum();
        assert!((word_norm - 1.0).abs() < 1e-5);
        assert!((char_norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unseen_text_maps_to_zero_vector() {
        let texts = vec!["alpha".to_string()];
        let featurizer = TextFeaturizer::fit(&texts, &FeaturizeTextConfig::default());
        assert_eq!(featurizer.transform("zzz").nnz(), 0);
    }
}

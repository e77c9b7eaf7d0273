//! N-gram TF-IDF weighting over a fitted dictionary.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::SparseVector;
use super::bag::Vocabulary;
use super::text::ngrams;

/// How n-gram counts are turned into feature values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Raw term frequency.
    Tf,
    /// Inverse document frequency, once per present term.
    Idf,
    /// Term frequency times inverse document frequency.
    #[default]
    TfIdf,
}

/// Fitted n-gram dictionary with per-slot IDF weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfIdfModel {
    pub ngram_length: usize,
    pub all_lengths: bool,
    pub weighting: Weighting,
    vocabulary: Vocabulary,
    idf: Vec<f32>,
}

impl TfIdfModel {
    /// Fit over tokenized documents; `idf = ln(N / df)`.
    pub fn fit(
        documents: &[Vec<String>],
        ngram_length: usize,
        all_lengths: bool,
        weighting: Weighting,
        max_terms: Option<usize>,
    ) -> Self {
        let grams: Vec<Vec<String>> = documents
            .iter()
            .map(|tokens| ngrams(tokens, ngram_length, all_lengths, ""))
            .collect();
        let vocabulary = Vocabulary::fit(&grams, max_terms, 1);
        let mut df = vec![0u32; vocabulary.len()];
        for doc in &grams {
            let present: BTreeSet<u32> = doc.iter().filter_map(|g| vocabulary.slot(g)).collect();
            for slot in present {
                df[slot as usize] += 1;
            }
        }
        let n_docs = documents.len().max(1) as f64;
        let idf = df
            .iter()
            .map(|&count| {
                if count == 0 {
                    0.0
                } else {
                    (n_docs / f64::from(count)).ln() as f32
                }
            })
            .collect();
        Self {
            ngram_length,
            all_lengths,
            weighting,
            vocabulary,
            idf,
        }
    }

    pub fn dim(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn idf(&self, slot: usize) -> f32 {
        self.idf.get(slot).copied().unwrap_or(0.0)
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn transform(&self, tokens: &[String]) -> SparseVector {
        let grams = ngrams(tokens, self.ngram_length, self.all_lengths, "");
        let counts = self.vocabulary.count_vector(&grams);
        let values = counts.iter().map(|(slot, tf)| {
            let idf = self.idf(slot as usize);
            let value = match self.weighting {
                Weighting::Tf => tf,
                Weighting::Idf => idf,
                Weighting::TfIdf => tf * idf,
            };
            (slot, value)
        });
        SparseVector::from_pairs(self.dim(), values)
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.idf.len() == self.vocabulary.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::text::tokenize_chars;

    #[test]
    fn idf_is_log_inverse_document_frequency() {
        let docs = vec![tokenize_chars("abc"), tokenize_chars("abd"), tokenize_chars("xyz")];
        let model = TfIdfModel::fit(&docs, 3, false, Weighting::TfIdf, None);
        let slot = model.vocabulary().slot("abc").unwrap() as usize;
        assert!((model.idf(slot) - (3.0f64).ln() as f32).abs() < 1e-6);
        let shared = model.vocabulary().slot("\u{2}ab").unwrap() as usize;
        assert!((model.idf(shared) - (1.5f64).ln() as f32).abs() < 1e-6);
        assert!(model.is_consistent());
    }

    #[test]
    fn terms_in_every_document_weigh_nothing() {
        let docs = vec![tokenize_chars("aa"), tokenize_chars("aa")];
        let model = TfIdfModel::fit(&docs, 3, false, Weighting::TfIdf, None);
        assert_eq!(model.transform(&tokenize_chars("aa")).nnz(), 0);

        let tf = TfIdfModel::fit(&docs, 3, false, Weighting::Tf, None);
        assert_eq!(tf.transform(&tokenize_chars("aa")).values, vec![1.0, 1.0]);
    }
}

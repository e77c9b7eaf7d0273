//! Bag-of-words dictionaries and hashed n-gram bags.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::SparseVector;
use super::text::ngrams;

/// Term-to-slot dictionary fitted from a corpus.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: BTreeMap<String, u32>,
}

impl Vocabulary {
    /// Keep terms seen at least `min_count` times, most frequent first, capped at `max_terms`.
    ///
    /// Ties in frequency are broken by term order so the slot assignment is
    /// stable across runs.
    pub fn fit<'a, I, D>(documents: I, max_terms: Option<usize>, min_count: usize) -> Self
    where
        I: IntoIterator<Item = D>,
        D: IntoIterator<Item = &'a String>,
    {
        let mut counts: HashMap<&'a str, usize> = HashMap::new();
        for doc in documents {
            for term in doc {
                *counts.entry(term.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts
            .into_iter()
            .filter(|&(_, count)| count >= min_count.max(1))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        if let Some(max) = max_terms {
            ranked.truncate(max);
        }
        let terms = ranked
            .into_iter()
            .enumerate()
            .map(|(slot, (term, _))| (term.to_string(), slot as u32))
            .collect();
        Self { terms }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn slot(&self, term: &str) -> Option<u32> {
        self.terms.get(term).copied()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }

    /// Term counts over the dictionary; unknown terms are ignored.
    pub fn count_vector(&self, terms: &[String]) -> SparseVector {
        SparseVector::from_pairs(
            self.len(),
            terms
                .iter()
                .filter_map(|term| self.slot(term))
                .map(|slot| (slot, 1.0)),
        )
    }
}

/// Stateless bag of n-grams hashed into `2^hash_bits` slots; collisions add up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedBag {
    pub hash_bits: u32,
    pub seed: u32,
    pub ngram_length: usize,
    pub all_lengths: bool,
}

impl HashedBag {
    pub fn dim(&self) -> usize {
        1usize << self.hash_bits
    }

    pub fn slot(&self, gram: &str) -> u32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(gram.as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        let mask = (1u64 << self.hash_bits) - 1;
        (u64::from_le_bytes(head) & mask) as u32
    }

    pub fn vectorize(&self, tokens: &[String]) -> SparseVector {
        let grams = ngrams(tokens, self.ngram_length, self.all_lengths, " ");
        SparseVector::from_pairs(self.dim(), grams.iter().map(|gram| (self.slot(gram), 1.0)))
    }
}

//! Pretrained word-embedding tables and per-row averaging.
//!
//! Tables are read from the plain-text GloVe/fastText layout: one word per
//! line followed by its space-separated components, optionally preceded by a
//! `<count> <dim>` header line.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{PipelineError, SparseVector};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub enabled: bool,
    /// Embedding text file; relative paths resolve against the data folder.
    pub path: Option<PathBuf>,
    /// Keep only words that occur in the fitting data. The whole table is
    /// stored in the model file otherwise; with this set, words first seen at
    /// scoring time fall back to zero vectors.
    pub restrict_to_vocabulary: bool,
}

impl EmbeddingConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: None,
            restrict_to_vocabulary: false,
        }
    }
}

/// Word vectors of a single dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingTable {
    pub dim: usize,
    words: BTreeMap<String, Vec<f32>>,
}

impl EmbeddingTable {
    pub fn from_entries(
        dim: usize,
        entries: impl IntoIterator<Item = (String, Vec<f32>)>,
    ) -> Result<Self, PipelineError> {
        let mut words = BTreeMap::new();
        for (word, vector) in entries {
            if vector.len() != dim {
                return Err(PipelineError::DimensionMismatch {
                    expected: dim,
                    found: vector.len(),
                });
            }
            words.insert(word, vector);
        }
        Ok(Self { dim, words })
    }

    /// Load a table, keeping only `keep` words when given.
    pub fn load(path: &Path, keep: Option<&BTreeSet<String>>) -> Result<Self, PipelineError> {
        let file = File::open(path).map_err(|source| PipelineError::EmbeddingIo {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = BufReader::new(file);
        let mut dim: Option<usize> = None;
        let mut words = BTreeMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|source| PipelineError::EmbeddingIo {
                path: path.to_path_buf(),
                source,
            })?;
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let rest: Vec<&str> = parts.collect();
            if line_no == 1 && is_header(word, &rest) {
                continue;
            }
            if let Some(keep) = keep {
                if !keep.contains(word) {
                    continue;
                }
            }
            let vector = rest
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|err| format_error(path, line_no, format!("bad component: {err}")))?;
            if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
                return Err(format_error(
                    path,
                    line_no,
                    format!("component {} of `{word}` is not finite", pos + 1),
                ));
            }
            match dim {
                None if vector.is_empty() => {
                    return Err(format_error(path, line_no, "word has no components".into()));
                }
                None => dim = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    return Err(format_error(
                        path,
                        line_no,
                        format!("expected {expected} components, found {}", vector.len()),
                    ));
                }
                Some(_) => {}
            }
            words.insert(word.to_string(), vector);
        }
        let dim = match dim {
            Some(dim) => dim,
            None => header_dim(path)?,
        };
        tracing::debug!(
            "Loaded {} embeddings of dimension {} from {}",
            words.len(),
            dim,
            path.display()
        );
        Ok(Self { dim, words })
    }

    /// Every vector has `dim` finite components.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (word, vector) in &self.words {
            if vector.len() != self.dim {
                return Err(PipelineError::DimensionMismatch {
                    expected: self.dim,
                    found: vector.len(),
                });
            }
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(PipelineError::InvalidConfig(format!(
                    "embedding for `{word}` has a non-finite component"
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.words.get(word).map(Vec::as_slice)
    }

    /// Mean of the token vectors; unknown tokens count as zero vectors.
    pub fn average(&self, tokens: &[String]) -> SparseVector {
        if tokens.is_empty() {
            return SparseVector::zeros(self.dim);
        }
        let mut sum = vec![0.0f32; self.dim];
        for token in tokens {
            if let Some(vector) = self.get(token) {
                for (acc, v) in sum.iter_mut().zip(vector) {
                    *acc += v;
                }
            }
        }
        let count = tokens.len() as f32;
        for value in &mut sum {
            *value /= count;
        }
        SparseVector::from_dense(&sum)
    }
}

fn is_header(first: &str, rest: &[&str]) -> bool {
    rest.len() == 1 && first.parse::<usize>().is_ok() && rest[0].parse::<usize>().is_ok()
}

/// A file filtered down to no words still needs a dimension; take it from the
/// header or the first data line.
fn header_dim(path: &Path) -> Result<usize, PipelineError> {
    let file = File::open(path).map_err(|source| PipelineError::EmbeddingIo {
        path: path.to_path_buf(),
        source,
    })?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|source| PipelineError::EmbeddingIo {
            path: path.to_path_buf(),
            source,
        })?;
    let fields: Vec<&str> = first.split_whitespace().collect();
    match fields.as_slice() {
        [count, dim] if count.parse::<usize>().is_ok() => dim
            .parse::<usize>()
            .map_err(|err| format_error(path, 1, format!("bad header: {err}"))),
        [_, components @ ..] if !components.is_empty() => Ok(components.len()),
        _ => Err(format_error(path, 1, "no embeddings found".into())),
    }
}

fn format_error(path: &Path, line: usize, message: String) -> PipelineError {
    PipelineError::EmbeddingFormat {
        path: path.to_path_buf(),
        line,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_with_header_and_filters_vocabulary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        fs::write(&path, "3 2\ncat 1.0 0.0\ndog 0.0 1.0\nfish 0.5 0.5\n").unwrap();

        let table = EmbeddingTable::load(&path, None).unwrap();
        assert_eq!(table.dim, 2);
        assert_eq!(table.len(), 3);

        let keep: BTreeSet<String> = ["dog".to_string()].into_iter().collect();
        let filtered = EmbeddingTable::load(&path, Some(&keep)).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("dog"), Some(&[0.0, 1.0][..]));

        let none: BTreeSet<String> = BTreeSet::new();
        let empty = EmbeddingTable::load(&path, Some(&none)).unwrap();
        assert_eq!(empty.dim, 2);
        assert!(empty.is_empty());
    }

    #[test]
    fn headerless_file_and_ragged_rows() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("glove.txt");
        fs::write(&good, "the 0.1 0.2 0.3\nof 0.4 0.5 0.6\n").unwrap();
        assert_eq!(EmbeddingTable::load(&good, None).unwrap().dim, 3);

        let ragged = dir.path().join("ragged.txt");
        fs::write(&ragged, "the 0.1 0.2 0.3\nof 0.4 0.5\n").unwrap();
        let err = EmbeddingTable::load(&ragged, None).unwrap_err();
        assert!(matches!(err, PipelineError::EmbeddingFormat { line: 2, .. }));

        let missing = EmbeddingTable::load(&dir.path().join("nope.txt"), None).unwrap_err();
        assert!(matches!(missing, PipelineError::EmbeddingIo { .. }));
    }

    #[test]
    fn non_finite_components_are_rejected() {
        let dir = tempdir().unwrap();
        for (name, body) in [
            ("nan.txt", "volcano 0.5 0.5\nzebra nan 1.0\n"),
            ("inf.txt", "volcano 0.5 0.5\nzebra 1.0 inf\n"),
            ("huge.txt", "volcano 0.5 0.5\nzebra 1e39 1.0\n"),
        ] {
            let path = dir.path().join(name);
            fs::write(&path, body).unwrap();
            let err = EmbeddingTable::load(&path, None).unwrap_err();
            assert!(
                matches!(err, PipelineError::EmbeddingFormat { line: 2, .. }),
                "{name}: {err}"
            );
        }

        let table =
            EmbeddingTable::from_entries(2, [("zebra".to_string(), vec![f32::NAN, 1.0])]).unwrap();
        assert!(matches!(table.validate(), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn default_config_keeps_whole_table() {
        assert!(!EmbeddingConfig::disabled().restrict_to_vocabulary);
        assert_eq!(EmbeddingConfig::disabled(), EmbeddingConfig::default());
    }

    #[test]
    fn average_treats_unknown_tokens_as_zero() {
        let table = EmbeddingTable::from_entries(
            2,
            [
                ("a".to_string(), vec![2.0, 0.0]),
                ("b".to_string(), vec![0.0, 4.0]),
            ],
        )
        .unwrap();
        let tokens: Vec<String> = ["a", "b", "zzz", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(table.average(&tokens).to_dense(), vec![0.5, 2.0]);
        assert_eq!(table.average(&[]).nnz(), 0);
        assert_eq!(table.average(&[]).dim, 2);
    }
}

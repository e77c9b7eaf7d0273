//! Pipeline configuration, fitting and application.
//!
//! [`PipelineConfig::fit`] walks the enabled stages in a fixed order: each
//! stage is fitted on the frame as it stands, recorded as a [`FittedStage`],
//! and applied before the next stage is fitted. The resulting
//! [`FittedPipeline`] replays the recorded stages on new records.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::bag::{HashedBag, Vocabulary};
use super::embedding::{EmbeddingConfig, EmbeddingTable};
use super::featurize::{FeaturizeTextConfig, TextFeaturizer};
use super::ngram::{TfIdfModel, Weighting};
use super::text::{NormalizeOptions, normalize, tokenize_chars, tokenize_words};
use super::{ColumnData, Frame, PipelineError, SparseVector};
use crate::dataset::schema::{PASSAGE_ID, PASSAGE_TEXT, QUERY, QUERY_ID, RecordView};

pub const QUERY_FEATURES: &str = "query_features";
pub const PASSAGE_FEATURES: &str = "passage_features";
pub const NORMALIZED_QUERY: &str = "normalized_query";
pub const NORMALIZED_PASSAGE: &str = "normalized_passage";
pub const QUERY_BOW: &str = "query_bow";
pub const PASSAGE_BOW: &str = "passage_bow";
pub const QUERY_BOB: &str = "query_bob";
pub const PASSAGE_BOB: &str = "passage_bob";
pub const PASSAGE_CHARS: &str = "passage_chars";
pub const BAG_OF_TRICHAR: &str = "bag_of_trichar";
pub const TOKENIZED_QUERY: &str = "tokenized_query";
pub const QUERY_EMBEDDINGS: &str = "query_embeddings";
pub const TOKENIZED_PASSAGE: &str = "tokenized_passage";
pub const PASSAGE_EMBEDDINGS: &str = "passage_embeddings";
pub const IDENTIFIERS: &str = "identifiers";

/// What happens to `query_id` and `passage_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdColumns {
    /// Removed once every text stage has run.
    #[default]
    DropAfterFeaturization,
    /// Removed before the first stage.
    DropBeforeFeaturization,
    /// Exposed to the trainer as a two-value numeric feature column.
    KeepAsFeatures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeTextConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub options: NormalizeOptions,
}

impl Default for NormalizeTextConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            options: NormalizeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordBagConfig {
    pub enabled: bool,
    pub max_terms: Option<usize>,
    pub min_count: usize,
}

impl Default for WordBagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_terms: Some(100_000),
            min_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordHashBagConfig {
    pub enabled: bool,
    pub hash_bits: u32,
    pub seed: u32,
    pub ngram_length: usize,
    pub all_lengths: bool,
}

impl Default for WordHashBagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hash_bits: 12,
            seed: 314_489_979,
            ngram_length: 2,
            all_lengths: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharNgramConfig {
    pub enabled: bool,
    pub ngram_length: usize,
    pub all_lengths: bool,
    pub weighting: Weighting,
    pub max_terms: Option<usize>,
}

impl Default for CharNgramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ngram_length: 3,
            all_lengths: false,
            weighting: Weighting::TfIdf,
            max_terms: Some(100_000),
        }
    }
}

/// Stage toggles and hyperparameters, read from the `[pipeline]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub featurize_text: FeaturizeTextConfig,
    pub normalize_text: NormalizeTextConfig,
    pub word_bag: WordBagConfig,
    pub word_hash_bag: WordHashBagConfig,
    pub char_trigrams: CharNgramConfig,
    pub query_embeddings: EmbeddingConfig,
    pub passage_embeddings: EmbeddingConfig,
    pub id_columns: IdColumns,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            featurize_text: FeaturizeTextConfig::default(),
            normalize_text: NormalizeTextConfig::default(),
            word_bag: WordBagConfig::default(),
            word_hash_bag: WordHashBagConfig::default(),
            char_trigrams: CharNgramConfig::default(),
            query_embeddings: EmbeddingConfig::disabled(),
            passage_embeddings: EmbeddingConfig::disabled(),
            id_columns: IdColumns::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let needs_normalized = [
            ("word_bag", self.word_bag.enabled),
            ("word_hash_bag", self.word_hash_bag.enabled),
            ("query_embeddings", self.query_embeddings.enabled),
            ("passage_embeddings", self.passage_embeddings.enabled),
        ];
        if !self.normalize_text.enabled {
            if let Some((stage, _)) = needs_normalized.iter().find(|(_, enabled)| *enabled) {
                return Err(invalid(format!("{stage} requires normalize_text to be enabled")));
            }
        }
        if self.featurize_text.enabled
            && (self.featurize_text.word_ngram_length == 0 || self.featurize_text.char_ngram_length == 0)
        {
            return Err(invalid("featurize_text n-gram lengths must be at least 1".into()));
        }
        if self.word_hash_bag.enabled {
            if !(1..=24).contains(&self.word_hash_bag.hash_bits) {
                return Err(invalid(format!(
                    "word_hash_bag.hash_bits must lie in 1..=24, got {}",
                    self.word_hash_bag.hash_bits
                )));
            }
            if self.word_hash_bag.ngram_length == 0 {
                return Err(invalid("word_hash_bag.ngram_length must be at least 1".into()));
            }
        }
        if self.char_trigrams.enabled && self.char_trigrams.ngram_length == 0 {
            return Err(invalid("char_trigrams.ngram_length must be at least 1".into()));
        }
        for (name, embeddings) in [
            ("query_embeddings", &self.query_embeddings),
            ("passage_embeddings", &self.passage_embeddings),
        ] {
            if embeddings.enabled && embeddings.path.is_none() {
                return Err(invalid(format!("{name} is enabled but has no path")));
            }
        }
        Ok(())
    }

    /// Copy with relative embedding paths joined onto `base`.
    pub fn resolve_paths(&self, base: &Path) -> Self {
        let mut resolved = self.clone();
        for embeddings in [&mut resolved.query_embeddings, &mut resolved.passage_embeddings] {
            if let Some(path) = embeddings.path.as_mut() {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
        resolved
    }

    /// Fit every enabled stage on `records`.
    pub fn fit<R: RecordView>(&self, records: &[R]) -> Result<FittedPipeline, PipelineError> {
        self.validate()?;
        if records.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let mut fit = Fitting {
            frame: Frame::from_records(records),
            stages: Vec::new(),
        };
        let ids = vec![QUERY_ID.to_string(), PASSAGE_ID.to_string()];

        if self.id_columns == IdColumns::DropBeforeFeaturization {
            fit.push(FittedStage::DropColumns { columns: ids.clone() })?;
        }

        if self.featurize_text.enabled {
            for (input, output) in [(QUERY, QUERY_FEATURES), (PASSAGE_TEXT, PASSAGE_FEATURES)] {
                let featurizer = TextFeaturizer::fit(fit.frame.text(input)?, &self.featurize_text);
                fit.push(FittedStage::FeaturizeText {
                    input: input.to_string(),
                    output: output.to_string(),
                    featurizer,
                })?;
            }
        }

        if self.normalize_text.enabled {
            for (input, output) in [(QUERY, NORMALIZED_QUERY), (PASSAGE_TEXT, NORMALIZED_PASSAGE)] {
                fit.push(FittedStage::NormalizeText {
                    input: input.to_string(),
                    output: output.to_string(),
                    options: self.normalize_text.options.clone(),
                })?;
            }
        }

        if self.word_bag.enabled {
            for (input, output) in [(NORMALIZED_QUERY, QUERY_BOW), (NORMALIZED_PASSAGE, PASSAGE_BOW)] {
                let docs: Vec<Vec<String>> = fit
                    .frame
                    .text(input)?
                    .iter()
                    .map(|text| tokenize_words(text))
                    .collect();
                let vocabulary =
                    Vocabulary::fit(&docs, self.word_bag.max_terms, self.word_bag.min_count);
                fit.push(FittedStage::WordBag {
                    input: input.to_string(),
                    output: output.to_string(),
                    vocabulary,
                })?;
            }
        }

        if self.word_hash_bag.enabled {
            let bag = HashedBag {
                hash_bits: self.word_hash_bag.hash_bits,
                seed: self.word_hash_bag.seed,
                ngram_length: self.word_hash_bag.ngram_length,
                all_lengths: self.word_hash_bag.all_lengths,
            };
            for (input, output) in [(NORMALIZED_QUERY, QUERY_BOB), (NORMALIZED_PASSAGE, PASSAGE_BOB)] {
                fit.push(FittedStage::WordHashBag {
                    input: input.to_string(),
                    output: output.to_string(),
                    bag: bag.clone(),
                })?;
            }
        }

        if self.char_trigrams.enabled {
            fit.push(FittedStage::TokenizeCharacters {
                input: PASSAGE_TEXT.to_string(),
                output: PASSAGE_CHARS.to_string(),
            })?;
            let model = TfIdfModel::fit(
                fit.frame.tokens(PASSAGE_CHARS)?,
                self.char_trigrams.ngram_length,
                self.char_trigrams.all_lengths,
                self.char_trigrams.weighting,
                self.char_trigrams.max_terms,
            );
            fit.push(FittedStage::CharNgrams {
                input: PASSAGE_CHARS.to_string(),
                output: BAG_OF_TRICHAR.to_string(),
                model,
            })?;
        }

        for (config, input, tokens, output) in [
            (&self.query_embeddings, NORMALIZED_QUERY, TOKENIZED_QUERY, QUERY_EMBEDDINGS),
            (
                &self.passage_embeddings,
                NORMALIZED_PASSAGE,
                TOKENIZED_PASSAGE,
                PASSAGE_EMBEDDINGS,
            ),
        ] {
            if !config.enabled {
                continue;
            }
            let Some(path) = config.path.as_deref() else {
                return Err(invalid(format!("{output} is enabled but has no path")));
            };
            fit.push(FittedStage::TokenizeWords {
                input: input.to_string(),
                output: tokens.to_string(),
            })?;
            let keep: Option<BTreeSet<String>> = if config.restrict_to_vocabulary {
                Some(fit.frame.tokens(tokens)?.iter().flatten().cloned().collect())
            } else {
                None
            };
            let table = EmbeddingTable::load(path, keep.as_ref())?;
            fit.push(FittedStage::WordEmbeddings {
                input: tokens.to_string(),
                output: output.to_string(),
                table,
            })?;
        }

        match self.id_columns {
            IdColumns::DropAfterFeaturization => {
                fit.push(FittedStage::DropColumns { columns: ids })?;
            }
            IdColumns::KeepAsFeatures => {
                fit.push(FittedStage::IdentifierFeatures {
                    inputs: ids,
                    output: IDENTIFIERS.to_string(),
                })?;
            }
            IdColumns::DropBeforeFeaturization => {}
        }

        let feature_columns = fit.frame.vector_columns();
        if feature_columns.is_empty() {
            return Err(PipelineError::NoFeatures);
        }
        let mut feature_dim = 0;
        for column in &feature_columns {
            feature_dim += fit.frame.vectors(column)?.0;
        }
        tracing::info!(
            "Fitted feature pipeline: {} stages, {} feature columns, {} dimensions",
            fit.stages.len(),
            feature_columns.len(),
            feature_dim
        );
        Ok(FittedPipeline {
            stages: fit.stages,
            feature_columns,
            feature_dim,
        })
    }
}

struct Fitting {
    frame: Frame,
    stages: Vec<FittedStage>,
}

impl Fitting {
    fn push(&mut self, stage: FittedStage) -> Result<(), PipelineError> {
        stage.apply(&mut self.frame)?;
        tracing::debug!("Applied stage {}", stage.name());
        self.stages.push(stage);
        Ok(())
    }
}

/// One fitted transform and the columns it reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FittedStage {
    FeaturizeText {
        input: String,
        output: String,
        featurizer: TextFeaturizer,
    },
    NormalizeText {
        input: String,
        output: String,
        options: NormalizeOptions,
    },
    WordBag {
        input: String,
        output: String,
        vocabulary: Vocabulary,
    },
    WordHashBag {
        input: String,
        output: String,
        bag: HashedBag,
    },
    TokenizeCharacters {
        input: String,
        output: String,
    },
    CharNgrams {
        input: String,
        output: String,
        model: TfIdfModel,
    },
    TokenizeWords {
        input: String,
        output: String,
    },
    WordEmbeddings {
        input: String,
        output: String,
        table: EmbeddingTable,
    },
    IdentifierFeatures {
        inputs: Vec<String>,
        output: String,
    },
    DropColumns {
        columns: Vec<String>,
    },
}

impl FittedStage {
    pub fn name(&self) -> &'static str {
        match self {
            FittedStage::FeaturizeText { .. } => "featurize_text",
            FittedStage::NormalizeText { .. } => "normalize_text",
            FittedStage::WordBag { .. } => "word_bag",
            FittedStage::WordHashBag { .. } => "word_hash_bag",
            FittedStage::TokenizeCharacters { .. } => "tokenize_characters",
            FittedStage::CharNgrams { .. } => "char_ngrams",
            FittedStage::TokenizeWords { .. } => "tokenize_words",
            FittedStage::WordEmbeddings { .. } => "word_embeddings",
            FittedStage::IdentifierFeatures { .. } => "identifier_features",
            FittedStage::DropColumns { .. } => "drop_columns",
        }
    }

    /// Read this stage's inputs from `frame` and append its output column.
    pub fn apply(&self, frame: &mut Frame) -> Result<(), PipelineError> {
        match self {
            FittedStage::FeaturizeText {
                input,
                output,
                featurizer,
            } => {
                let rows = frame.text(input)?.iter().map(|t| featurizer.transform(t)).collect();
                frame.insert(output, vectors(featurizer.dim(), rows))
            }
            FittedStage::NormalizeText {
                input,
                output,
                options,
            } => {
                let rows = frame.text(input)?.iter().map(|t| normalize(t, options)).collect();
                frame.insert(output, ColumnData::Text(rows))
            }
            FittedStage::WordBag {
                input,
                output,
                vocabulary,
            } => {
                let rows = frame
                    .text(input)?
                    .iter()
                    .map(|t| vocabulary.count_vector(&tokenize_words(t)))
                    .collect();
                frame.insert(output, vectors(vocabulary.len(), rows))
            }
            FittedStage::WordHashBag { input, output, bag } => {
                let rows = frame
                    .text(input)?
                    .iter()
                    .map(|t| bag.vectorize(&tokenize_words(t)))
                    .collect();
                frame.insert(output, vectors(bag.dim(), rows))
            }
            FittedStage::TokenizeCharacters { input, output } => {
                let rows = frame.text(input)?.iter().map(|t| tokenize_chars(t)).collect();
                frame.insert(output, ColumnData::Tokens(rows))
            }
            FittedStage::CharNgrams {
                input,
                output,
                model,
            } => {
                let rows = frame.tokens(input)?.iter().map(|t| model.transform(t)).collect();
                frame.insert(output, vectors(model.dim(), rows))
            }
            FittedStage::TokenizeWords { input, output } => {
                let rows = frame.text(input)?.iter().map(|t| tokenize_words(t)).collect();
                frame.insert(output, ColumnData::Tokens(rows))
            }
            FittedStage::WordEmbeddings {
                input,
                output,
                table,
            } => {
                let rows = frame.tokens(input)?.iter().map(|t| table.average(t)).collect();
                frame.insert(output, vectors(table.dim, rows))
            }
            FittedStage::IdentifierFeatures { inputs, output } => {
                let columns = inputs
                    .iter()
                    .map(|name| frame.ints(name))
                    .collect::<Result<Vec<_>, _>>()?;
                let rows = (0..frame.len())
                    .map(|row| {
                        let dense: Vec<f32> = columns.iter().map(|col| col[row] as f32).collect();
                        SparseVector::from_dense(&dense)
                    })
                    .collect();
                frame.insert(output, vectors(inputs.len(), rows))
            }
            FittedStage::DropColumns { columns } => {
                frame.drop_columns(columns);
                Ok(())
            }
        }
    }

    fn check(&self) -> Result<(), PipelineError> {
        match self {
            FittedStage::CharNgrams { model, .. } if !model.is_consistent() => Err(invalid(
                "char n-gram dictionary and IDF table differ in length".into(),
            )),
            FittedStage::WordHashBag { bag, .. } if !(1..=24).contains(&bag.hash_bits) => {
                Err(invalid(format!("hash_bits {} out of range", bag.hash_bits)))
            }
            FittedStage::WordEmbeddings { table, .. } => table.validate(),
            _ => Ok(()),
        }
    }
}

/// Fitted stages plus the ordered feature columns they produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub stages: Vec<FittedStage>,
    pub feature_columns: Vec<String>,
    pub feature_dim: usize,
}

impl FittedPipeline {
    /// Structural checks for a pipeline read back from disk.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.feature_columns.is_empty() || self.feature_dim == 0 {
            return Err(PipelineError::NoFeatures);
        }
        for stage in &self.stages {
            stage.check()?;
        }
        Ok(())
    }

    /// Run every stage over `records` and return the full frame.
    pub fn transform<R: RecordView>(&self, records: &[R]) -> Result<Frame, PipelineError> {
        let mut frame = Frame::from_records(records);
        for stage in &self.stages {
            stage.apply(&mut frame)?;
        }
        Ok(frame)
    }

    /// Final model input for each record: feature columns concatenated in order.
    pub fn featurize<R: RecordView>(&self, records: &[R]) -> Result<Vec<SparseVector>, PipelineError> {
        let frame = self.transform(records)?;
        let columns = self
            .feature_columns
            .iter()
            .map(|name| frame.vectors(name).map(|(_, rows)| rows))
            .collect::<Result<Vec<_>, _>>()?;
        let mut out = Vec::with_capacity(frame.len());
        for row in 0..frame.len() {
            let vector = SparseVector::concat(columns.iter().map(|col| &col[row]));
            if vector.dim != self.feature_dim {
                return Err(PipelineError::DimensionMismatch {
                    expected: self.feature_dim,
                    found: vector.dim,
                });
            }
            out.push(vector);
        }
        Ok(out)
    }

    pub fn featurize_one<R: RecordView>(&self, record: &R) -> Result<SparseVector, PipelineError> {
        let mut rows = self.featurize(std::slice::from_ref(record))?;
        rows.pop().ok_or(PipelineError::EmptyInput)
    }
}

fn vectors(dim: usize, rows: Vec<SparseVector>) -> ColumnData {
    ColumnData::Vectors { dim, rows }
}

fn invalid(message: String) -> PipelineError {
    PipelineError::InvalidConfig(message)
}

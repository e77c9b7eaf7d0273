use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while fitting or applying the feature pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline cannot be fitted on an empty table")]
    EmptyInput,
    #[error("Column '{0}' is not present in the frame")]
    MissingColumn(String),
    #[error("Column '{column}' holds {found} values, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("Column '{column}' has {found} rows, frame has {expected}")]
    RowCount {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("Pipeline produced no feature columns")]
    NoFeatures,
    #[error("Feature vector has dimension {found}, pipeline expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to read embedding file {path}: {source}")]
    EmbeddingIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed embedding file {path} at line {line}: {message}")]
    EmbeddingFormat {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

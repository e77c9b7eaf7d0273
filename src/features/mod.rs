//! Text feature pipeline.
//!
//! Records are lifted into a columnar [`Frame`]; each pipeline stage reads named
//! columns and appends new ones. The concatenation of every vector column left
//! after the last stage is the model input.

pub mod bag;
pub mod embedding;
mod error;
pub mod featurize;
pub mod frame;
pub mod ngram;
pub mod pipeline;
pub mod text;

pub use error::PipelineError;
pub use frame::{ColumnData, Frame, SparseVector};
pub use pipeline::{FittedPipeline, FittedStage, IdColumns, PipelineConfig};

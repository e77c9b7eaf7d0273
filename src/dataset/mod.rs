//! Record schema, tab-separated loading, and train/test splitting.

pub mod loader;
pub mod schema;
pub mod split;

pub use loader::{
    LineResult, LoadError, LoaderOptions, ParseErrorKind, load_records, load_unlabelled,
    read_rows_lenient,
};
pub use schema::{
    ColumnKind, ColumnSpec, Prediction, QueryRecord, RecordView, ScoredRecord, UnlabelledRecord,
};
pub use split::{Split, SplitConfig, SplitError, split, split_with_validation};

//! Input and output record shapes.
//!
//! Column names here are the names the feature pipeline reads from a
//! [`crate::features::Frame`], so renaming one is a model-format change.

use serde::{Deserialize, Serialize};

pub const QUERY_ID: &str = "query_id";
pub const QUERY: &str = "query";
pub const PASSAGE_TEXT: &str = "passage_text";
pub const LABEL: &str = "label";
pub const PASSAGE_ID: &str = "passage_id";

/// Declared type of a delimited input column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Int,
    Text,
    Bool,
}

impl ColumnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Int => "int",
            ColumnKind::Text => "text",
            ColumnKind::Bool => "bool",
        }
    }
}

/// One column of the input schema: name, type and zero-based field ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub ordinal: usize,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            ordinal,
        }
    }
}

/// Five-column training schema: id, query, passage, label, passage id.
pub fn labelled_schema() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(QUERY_ID, ColumnKind::Int, 0),
        ColumnSpec::new(QUERY, ColumnKind::Text, 1),
        ColumnSpec::new(PASSAGE_TEXT, ColumnKind::Text, 2),
        ColumnSpec::new(LABEL, ColumnKind::Bool, 3),
        ColumnSpec::new(PASSAGE_ID, ColumnKind::Int, 4),
    ]
}

/// Four-column scoring schema (no label).
pub fn unlabelled_schema() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(QUERY_ID, ColumnKind::Int, 0),
        ColumnSpec::new(QUERY, ColumnKind::Text, 1),
        ColumnSpec::new(PASSAGE_TEXT, ColumnKind::Text, 2),
        ColumnSpec::new(PASSAGE_ID, ColumnKind::Int, 3),
    ]
}

/// Read access to the fields the feature pipeline consumes.
pub trait RecordView {
    fn query_id(&self) -> i64;
    fn query(&self) -> &str;
    fn passage_text(&self) -> &str;
    fn passage_id(&self) -> i64;
}

/// A labelled query/passage pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: i64,
    pub query: String,
    pub passage_text: String,
    pub label: bool,
    pub passage_id: i64,
}

impl QueryRecord {
    pub fn new(
        query_id: i64,
        query: impl Into<String>,
        passage_text: impl Into<String>,
        label: bool,
        passage_id: i64,
    ) -> Self {
        Self {
            query_id,
            query: query.into(),
            passage_text: passage_text.into(),
            label,
            passage_id,
        }
    }
}

impl RecordView for QueryRecord {
    fn query_id(&self) -> i64 {
        self.query_id
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn passage_text(&self) -> &str {
        &self.passage_text
    }

    fn passage_id(&self) -> i64 {
        self.passage_id
    }
}

/// A query/passage pair awaiting a prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlabelledRecord {
    pub query_id: i64,
    pub query: String,
    pub passage_text: String,
    pub passage_id: i64,
}

impl From<QueryRecord> for UnlabelledRecord {
    fn from(record: QueryRecord) -> Self {
        Self {
            query_id: record.query_id,
            query: record.query,
            passage_text: record.passage_text,
            passage_id: record.passage_id,
        }
    }
}

impl RecordView for UnlabelledRecord {
    fn query_id(&self) -> i64 {
        self.query_id
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn passage_text(&self) -> &str {
        &self.passage_text
    }

    fn passage_id(&self) -> i64 {
        self.passage_id
    }
}

/// Model output for one record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// `score > 0`.
    pub predicted_label: bool,
    /// Sigmoid of the raw score.
    pub probability: f32,
    /// Raw ensemble score (log-odds).
    pub score: f32,
}

/// Prediction joined with the identifiers of the record it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub query_id: i64,
    pub passage_id: i64,
    pub prediction: Prediction,
}

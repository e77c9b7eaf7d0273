//! Columnar in-memory table passed between pipeline stages.

use serde::{Deserialize, Serialize};

use super::PipelineError;
use crate::dataset::schema::{PASSAGE_ID, PASSAGE_TEXT, QUERY, QUERY_ID, RecordView};

/// Sparse `f32` vector with strictly increasing indices.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SparseVector {
    /// Logical length of the vector.
    pub dim: usize,
    /// Positions of the stored values, sorted and unique.
    pub indices: Vec<u32>,
    /// Values aligned with `indices`; zeros are never stored.
    pub values: Vec<f32>,
}

impl SparseVector {
    /// All-zero vector of length `dim`.
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from `(index, value)` pairs in any order; duplicate indices are summed.
    pub fn from_pairs(dim: usize, pairs: impl IntoIterator<Item = (u32, f32)>) -> Self {
        let mut pairs: Vec<(u32, f32)> = pairs
            .into_iter()
            .filter(|&(idx, _)| (idx as usize) < dim)
            .collect();
        pairs.sort_by_key(|&(idx, _)| idx);
        let mut indices: Vec<u32> = Vec::with_capacity(pairs.len());
        let mut values: Vec<f32> = Vec::with_capacity(pairs.len());
        for (idx, value) in pairs {
            match indices.last() {
                Some(&last) if last == idx => {
                    if let Some(v) = values.last_mut() {
                        *v += value;
                    }
                }
                _ => {
                    indices.push(idx);
                    values.push(value);
                }
            }
        }
        let mut out = Self { dim, indices, values };
        out.drop_zeros();
        out
    }

    pub fn from_dense(values: &[f32]) -> Self {
        Self::from_pairs(
            values.len(),
            values
                .iter()
                .enumerate()
                .map(|(idx, &value)| (idx as u32, value)),
        )
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Value at `index`, zero when unset or out of range.
    pub fn get(&self, index: usize) -> f32 {
        match self.indices.binary_search(&(index as u32)) {
            Ok(pos) => self.values[pos],
            Err(_) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn to_dense(&self) -> Vec<f32> {
        let mut dense = vec![0.0; self.dim];
        for (idx, value) in self.iter() {
            dense[idx as usize] = value;
        }
        dense
    }

    /// Scale to unit Euclidean length; the zero vector is left unchanged.
    pub fn l2_normalize(&mut self) {
        let norm = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 && norm.is_finite() {
            for value in &mut self.values {
                *value /= norm;
            }
        }
    }

    /// Concatenate vectors end to end, offsetting each part by the dimensions before it.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a SparseVector>) -> Self {
        let mut out = Self::default();
        for part in parts {
            let offset = out.dim as u32;
            out.indices.extend(part.indices.iter().map(|&idx| idx + offset));
            out.values.extend_from_slice(&part.values);
            out.dim += part.dim;
        }
        out
    }

    fn drop_zeros(&mut self) {
        if self.values.iter().all(|&v| v != 0.0) {
            return;
        }
        let (indices, values): (Vec<u32>, Vec<f32>) = self
            .indices
            .iter()
            .zip(&self.values)
            .filter(|&(_, &v)| v != 0.0)
            .map(|(&i, &v)| (i, v))
            .unzip();
        self.indices = indices;
        self.values = values;
    }
}

/// Values of one named column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int(Vec<i64>),
    Bool(Vec<bool>),
    Text(Vec<String>),
    Tokens(Vec<Vec<String>>),
    Vectors { dim: usize, rows: Vec<SparseVector> },
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(values) => values.len(),
            ColumnData::Bool(values) => values.len(),
            ColumnData::Text(values) => values.len(),
            ColumnData::Tokens(values) => values.len(),
            ColumnData::Vectors { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnData::Int(_) => "int",
            ColumnData::Bool(_) => "bool",
            ColumnData::Text(_) => "text",
            ColumnData::Tokens(_) => "tokens",
            ColumnData::Vectors { .. } => "vector",
        }
    }
}

/// Named columns of equal length, kept in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    rows: usize,
    columns: Vec<(String, ColumnData)>,
}

impl Frame {
    /// Empty frame with a fixed row count.
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            columns: Vec::new(),
        }
    }

    /// Identifier and text columns of `records`; labels stay outside the frame.
    pub fn from_records<R: RecordView>(records: &[R]) -> Self {
        let mut frame = Self::with_rows(records.len());
        frame.columns.push((
            QUERY_ID.to_string(),
            ColumnData::Int(records.iter().map(|r| r.query_id()).collect()),
        ));
        frame.columns.push((
            QUERY.to_string(),
            ColumnData::Text(records.iter().map(|r| r.query().to_string()).collect()),
        ));
        frame.columns.push((
            PASSAGE_TEXT.to_string(),
            ColumnData::Text(records.iter().map(|r| r.passage_text().to_string()).collect()),
        ));
        frame.columns.push((
            PASSAGE_ID.to_string(),
            ColumnData::Int(records.iter().map(|r| r.passage_id()).collect()),
        ));
        frame
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, data)| data)
    }

    fn require(&self, name: &str) -> Result<&ColumnData, PipelineError> {
        self.column(name)
            .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
    }

    pub fn ints(&self, name: &str) -> Result<&[i64], PipelineError> {
        match self.require(name)? {
            ColumnData::Int(values) => Ok(values),
            other => Err(type_error(name, "int", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&[String], PipelineError> {
        match self.require(name)? {
            ColumnData::Text(values) => Ok(values),
            other => Err(type_error(name, "text", other)),
        }
    }

    pub fn tokens(&self, name: &str) -> Result<&[Vec<String>], PipelineError> {
        match self.require(name)? {
            ColumnData::Tokens(values) => Ok(values),
            other => Err(type_error(name, "tokens", other)),
        }
    }

    /// Dimension and rows of a vector column.
    pub fn vectors(&self, name: &str) -> Result<(usize, &[SparseVector]), PipelineError> {
        match self.require(name)? {
            ColumnData::Vectors { dim, rows } => Ok((*dim, rows)),
            other => Err(type_error(name, "vector", other)),
        }
    }

    /// Append a column; existing columns are never overwritten.
    pub fn insert(&mut self, name: impl Into<String>, data: ColumnData) -> Result<(), PipelineError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(PipelineError::DuplicateColumn(name));
        }
        if data.len() != self.rows {
            return Err(PipelineError::RowCount {
                column: name,
                expected: self.rows,
                found: data.len(),
            });
        }
        self.columns.push((name, data));
        Ok(())
    }

    /// Remove the named columns; names not present are ignored.
    pub fn drop_columns(&mut self, names: &[String]) {
        self.columns
            .retain(|(name, _)| !names.iter().any(|drop| drop == name));
    }

    /// Names of vector columns in insertion order.
    pub fn vector_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|(_, data)| matches!(data, ColumnData::Vectors { .. }))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

fn type_error(column: &str, expected: &'static str, found: &ColumnData) -> PipelineError {
    PipelineError::ColumnType {
        column: column.to_string(),
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::QueryRecord;

    #[test]
    fn from_pairs_sorts_merges_and_drops_zeros() {
        let v = SparseVector::from_pairs(6, [(4, 1.0), (1, 2.0), (4, 0.5), (2, 0.0), (9, 3.0)]);
        assert_eq!(v.indices, vec![1, 4]);
        assert_eq!(v.values, vec![2.0, 1.5]);
        assert_eq!(v.get(4), 1.5);
        assert_eq!(v.get(3), 0.0);
    }

    #[test]
    fn concat_offsets_indices() {
        let a = SparseVector::from_dense(&[0.0, 1.0]);
        let b = SparseVector::from_dense(&[2.0, 0.0, 3.0]);
        let joined = SparseVector::concat([&a, &b]);
        assert_eq!(joined.dim, 5);
        assert_eq!(joined.to_dense(), vec![0.0, 1.0, 2.0, 0.0, 3.0]);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_alone() {
        let mut v = SparseVector::from_dense(&[3.0, 4.0]);
        v.l2_normalize();
        assert_eq!(v.values, vec![0.6, 0.8]);
        let mut zero = SparseVector::zeros(3);
        zero.l2_normalize();
        assert_eq!(zero.nnz(), 0);
    }

    #[test]
    fn frame_rejects_duplicates_and_wrong_lengths() {
        let records = vec![
            QueryRecord::new(1, "q", "p", true, 10),
            QueryRecord::new(2, "q2", "p2", false, 11),
        ];
        let mut frame = Frame::from_records(&records);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.ints(QUERY_ID).unwrap(), &[1, 2]);
        assert!(matches!(
            frame.insert(QUERY, ColumnData::Text(vec![])),
            Err(PipelineError::DuplicateColumn(_))
        ));
        assert!(matches!(
            frame.insert("extra", ColumnData::Bool(vec![true])),
            Err(PipelineError::RowCount { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            frame.tokens(QUERY),
            Err(PipelineError::ColumnType { expected: "tokens", .. })
        ));

        frame.drop_columns(&[QUERY_ID.to_string(), PASSAGE_ID.to_string()]);
        assert!(!frame.has_column(QUERY_ID));
        assert!(frame.has_column(PASSAGE_TEXT));
    }
}

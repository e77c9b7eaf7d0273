//! Delimited text loader for query/passage records.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::schema::{
    ColumnKind, ColumnSpec, LABEL, PASSAGE_ID, PASSAGE_TEXT, QUERY, QUERY_ID, QueryRecord,
    UnlabelledRecord, labelled_schema, unlabelled_schema,
};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}:{line}: {kind}")]
    Parse {
        path: PathBuf,
        line: usize,
        kind: ParseErrorKind,
    },
    #[error("invalid schema: {0}")]
    Schema(String),
}

/// Why a single input row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("expected at least {expected} fields, found {found}")]
    MissingFields { expected: usize, found: usize },
    #[error("column `{column}`: `{value}` is not an integer")]
    InvalidInt { column: String, value: String },
    #[error("column `{column}`: `{value}` is not a boolean (expected 0, 1, true or false)")]
    InvalidBool { column: String, value: String },
    #[error("line is not valid UTF-8 (first bad byte at offset {offset})")]
    InvalidUtf8 { offset: usize },
}

/// How to split lines into typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Field separator (tab for TSV input).
    pub delimiter: char,
    /// Skip the first line of the file.
    pub has_header: bool,
    /// Declared columns; every declared ordinal must be present on each row.
    pub schema: Vec<ColumnSpec>,
}

impl LoaderOptions {
    /// Five-column labelled layout used for training data.
    pub fn labelled(has_header: bool) -> Self {
        Self {
            delimiter: '\t',
            has_header,
            schema: labelled_schema(),
        }
    }

    /// Four-column layout used for scoring input.
    pub fn unlabelled(has_header: bool) -> Self {
        Self {
            delimiter: '\t',
            has_header,
            schema: unlabelled_schema(),
        }
    }

    fn min_fields(&self) -> usize {
        self.schema
            .iter()
            .map(|column| column.ordinal + 1)
            .max()
            .unwrap_or(0)
    }
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self::labelled(true)
    }
}

/// Parsed value of one declared column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Bool(bool),
}

/// Record types buildable from a row of typed fields.
pub trait FromRow: Sized {
    /// Columns the record needs, in the order [`FromRow::from_fields`] receives them.
    fn required_columns() -> &'static [(&'static str, ColumnKind)];

    /// Build the record; `None` when the field shapes do not match `required_columns`.
    fn from_fields(fields: Vec<FieldValue>) -> Option<Self>;
}

impl FromRow for QueryRecord {
    fn required_columns() -> &'static [(&'static str, ColumnKind)] {
        &[
            (QUERY_ID, ColumnKind::Int),
            (QUERY, ColumnKind::Text),
            (PASSAGE_TEXT, ColumnKind::Text),
            (LABEL, ColumnKind::Bool),
            (PASSAGE_ID, ColumnKind::Int),
        ]
    }

    fn from_fields(fields: Vec<FieldValue>) -> Option<Self> {
        let [
            FieldValue::Int(query_id),
            FieldValue::Text(query),
            FieldValue::Text(passage_text),
            FieldValue::Bool(label),
            FieldValue::Int(passage_id),
        ] = <[FieldValue; 5]>::try_from(fields).ok()?
        else {
            return None;
        };
        Some(QueryRecord {
            query_id,
            query,
            passage_text,
            label,
            passage_id,
        })
    }
}

impl FromRow for UnlabelledRecord {
    fn required_columns() -> &'static [(&'static str, ColumnKind)] {
        &[
            (QUERY_ID, ColumnKind::Int),
            (QUERY, ColumnKind::Text),
            (PASSAGE_TEXT, ColumnKind::Text),
            (PASSAGE_ID, ColumnKind::Int),
        ]
    }

    fn from_fields(fields: Vec<FieldValue>) -> Option<Self> {
        let [
            FieldValue::Int(query_id),
            FieldValue::Text(query),
            FieldValue::Text(passage_text),
            FieldValue::Int(passage_id),
        ] = <[FieldValue; 4]>::try_from(fields).ok()?
        else {
            return None;
        };
        Some(UnlabelledRecord {
            query_id,
            query,
            passage_text,
            passage_id,
        })
    }
}

/// Outcome for one non-blank input line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineResult<T> {
    /// One-based line number in the file.
    pub line: usize,
    pub row: Result<T, ParseErrorKind>,
}

/// Load labelled records, failing on the first malformed row.
pub fn load_records(path: &Path, options: &LoaderOptions) -> Result<Vec<QueryRecord>, LoadError> {
    let records = load_strict(path, options)?;
    tracing::info!("Loaded {} labelled records from {}", records.len(), path.display());
    Ok(records)
}

/// Load unlabelled scoring records, failing on the first malformed row.
pub fn load_unlabelled(
    path: &Path,
    options: &LoaderOptions,
) -> Result<Vec<UnlabelledRecord>, LoadError> {
    let records = load_strict(path, options)?;
    tracing::info!("Loaded {} unlabelled records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse every non-blank data line, keeping per-line failures instead of aborting.
///
/// Only I/O and schema problems fail the whole call.
pub fn read_rows_lenient<T: FromRow>(
    path: &Path,
    options: &LoaderOptions,
) -> Result<Vec<LineResult<T>>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_rows(BufReader::new(file), options, path)
}

fn load_strict<T: FromRow>(path: &Path, options: &LoaderOptions) -> Result<Vec<T>, LoadError> {
    read_rows_lenient::<T>(path, options)?
        .into_iter()
        .map(|result| {
            result.row.map_err(|kind| LoadError::Parse {
                path: path.to_path_buf(),
                line: result.line,
                kind,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct PlannedColumn {
    name: &'static str,
    kind: ColumnKind,
    ordinal: usize,
}

fn plan_columns<T: FromRow>(options: &LoaderOptions) -> Result<Vec<PlannedColumn>, LoadError> {
    T::required_columns()
        .iter()
        .map(|&(name, kind)| {
            let spec = options
                .schema
                .iter()
                .find(|column| column.name == name)
                .ok_or_else(|| LoadError::Schema(format!("missing column `{name}`")))?;
            if spec.kind != kind {
                return Err(LoadError::Schema(format!(
                    "column `{name}` declared as {}, expected {}",
                    spec.kind.as_str(),
                    kind.as_str()
                )));
            }
            Ok(PlannedColumn {
                name,
                kind,
                ordinal: spec.ordinal,
            })
        })
        .collect()
}

fn read_rows<T: FromRow, R: BufRead>(
    reader: R,
    options: &LoaderOptions,
    path: &Path,
) -> Result<Vec<LineResult<T>>, LoadError> {
    let plan = plan_columns::<T>(options)?;
    let min_fields = options.min_fields();
    let mut out = Vec::new();
    for (idx, bytes) in reader.split(b'\n').enumerate() {
        let bytes = bytes.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if idx == 0 && options.has_header {
            continue;
        }
        // Undecodable bytes reject only their own line.
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(err) => {
                out.push(LineResult {
                    line: idx + 1,
                    row: Err(ParseErrorKind::InvalidUtf8 {
                        offset: err.utf8_error().valid_up_to(),
                    }),
                });
                continue;
            }
        };
        let line = line.strip_suffix('\r').unwrap_or(&line);
        let line = if idx == 0 {
            line.trim_start_matches('\u{feff}')
        } else {
            line
        };
        if line.trim().is_empty() {
            continue;
        }
        let row = parse_line(line, options.delimiter, min_fields, &plan).and_then(|fields| {
            T::from_fields(fields).ok_or(ParseErrorKind::MissingFields {
                expected: plan.len(),
                found: 0,
            })
        });
        out.push(LineResult { line: idx + 1, row });
    }
    Ok(out)
}

fn parse_line(
    line: &str,
    delimiter: char,
    min_fields: usize,
    plan: &[PlannedColumn],
) -> Result<Vec<FieldValue>, ParseErrorKind> {
    let fields: Vec<&str> = line.split(delimiter).collect();
    if fields.len() < min_fields {
        return Err(ParseErrorKind::MissingFields {
            expected: min_fields,
            found: fields.len(),
        });
    }
    plan.iter()
        .map(|column| {
            let raw = fields[column.ordinal];
            match column.kind {
                ColumnKind::Text => Ok(FieldValue::Text(raw.to_string())),
                ColumnKind::Int => raw.trim().parse::<i64>().map(FieldValue::Int).map_err(|_| {
                    ParseErrorKind::InvalidInt {
                        column: column.name.to_string(),
                        value: raw.to_string(),
                    }
                }),
                ColumnKind::Bool => parse_bool(raw).map(FieldValue::Bool).ok_or_else(|| {
                    ParseErrorKind::InvalidBool {
                        column: column.name.to_string(),
                        value: raw.to_string(),
                    }
                }),
            }
        })
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    let value = raw.trim();
    if value == "1" || value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value == "0" || value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "QueryId\tQuery\tPassageText\tLabel\tPassageID\n";
    const ROWS: &str = "1\twhat is rust\tRust is a systems language.\t1\t10\n\
                        1\twhat is rust\tBananas are yellow.\t0\t11\n\
                        2\tcapital of france\tParis is the capital of France.\ttrue\t20\n";

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn header_flag_on_headered_file_yields_data_rows() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "train.tsv", &format!("{HEADER}{ROWS}"));
        let records = load_records(&path, &LoaderOptions::labelled(true)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[2],
            QueryRecord::new(
                2,
                "capital of france",
                "Paris is the capital of France.",
                true,
                20
            )
        );
    }

    #[test]
    fn no_header_flag_on_headerless_file_keeps_every_row() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "train.tsv", ROWS);
        let records = load_records(&path, &LoaderOptions::labelled(false)).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].query_id, 1);
    }

    #[test]
    fn no_header_flag_on_headered_file_surfaces_header_as_bad_row() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "train.tsv", &format!("{HEADER}{ROWS}"));
        let options = LoaderOptions::labelled(false);

        let lenient = read_rows_lenient::<QueryRecord>(&path, &options).unwrap();
        assert_eq!(lenient.len(), 4);
        assert_eq!(lenient[0].line, 1);
        assert!(lenient[0].row.is_err());
        assert!(lenient[1..].iter().all(|result| result.row.is_ok()));

        let err = load_records(&path, &options).unwrap_err();
        match err {
            LoadError::Parse { line, kind, .. } => {
                assert_eq!(line, 1);
                assert!(matches!(kind, ParseErrorKind::InvalidInt { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn undecodable_line_is_a_row_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mixed.tsv");
        let mut bytes = ROWS.as_bytes().to_vec();
        bytes.extend_from_slice(b"3\tbad \xff\xfe query\tpassage\t0\t30\n");
        bytes.extend_from_slice(b"4\tok\tfine\t1\t40\n");
        std::fs::write(&path, bytes).unwrap();
        let options = LoaderOptions::labelled(false);

        let lenient = read_rows_lenient::<QueryRecord>(&path, &options).unwrap();
        assert_eq!(lenient.len(), 5);
        assert_eq!(lenient[3].line, 4);
        assert_eq!(lenient[3].row, Err(ParseErrorKind::InvalidUtf8 { offset: 6 }));
        assert_eq!(lenient[4].row.as_ref().unwrap().query_id, 4);

        match load_records(&path, &options).unwrap_err() {
            LoadError::Parse { line, kind, .. } => {
                assert_eq!(line, 4);
                assert!(matches!(kind, ParseErrorKind::InvalidUtf8 { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_short_rows_and_bad_labels() {
        let dir = tempdir().unwrap();
        let short = write(dir.path(), "short.tsv", "1\tq\tp\t1\n");
        let err = load_records(&short, &LoaderOptions::labelled(false)).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Parse {
                kind: ParseErrorKind::MissingFields {
                    expected: 5,
                    found: 4
                },
                ..
            }
        ));

        let bad_label = write(dir.path(), "label.tsv", "1\tq\tp\tmaybe\t2\n");
        let err = load_records(&bad_label, &LoaderOptions::labelled(false)).unwrap_err();
        assert!(matches!(
            err,
            LoadError::Parse {
                kind: ParseErrorKind::InvalidBool { .. },
                ..
            }
        ));
    }

    #[test]
    fn skips_blank_lines_and_crlf() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "crlf.tsv",
            "1\tq\tp\tFALSE\t2\r\n\r\n3\tq2\tp2\t1\t4\r\n",
        );
        let records = load_records(&path, &LoaderOptions::labelled(false)).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].label);
        assert_eq!(records[1].passage_id, 4);
    }

    #[test]
    fn loads_unlabelled_layout() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "eval.tsv", "7\tq\tsome passage\t70\n");
        let records = load_unlabelled(&path, &LoaderOptions::unlabelled(false)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].passage_id, 70);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = load_records(&dir.path().join("absent.tsv"), &LoaderOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn schema_must_declare_required_columns() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "train.tsv", ROWS);
        let mut options = LoaderOptions::labelled(false);
        options.schema.retain(|column| column.name != LABEL);
        let err = load_records(&path, &options).unwrap_err();
        assert!(matches!(err, LoadError::Schema(_)));
    }
}

//! Error taxonomy for a pipeline run.
//!
//! Every variant is fatal: a run either produces all four reports from one
//! pair of fetches or it produces none of them.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn one statistics row into a [`crate::stats::SegmentRecord`].
#[derive(Debug, Error, PartialEq)]
pub enum ExtractionError {
    #[error("row has no `data` field")]
    MissingData,
    #[error("`data` field is not valid JSON: {0}")]
    InvalidData(String),
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is not {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("widget `{0}` not found")]
    MissingWidget(&'static str),
    #[error("widget `{name}` appears {count} times")]
    DuplicateWidget { name: &'static str, count: usize },
    #[error("widget `{0}` has malformed items")]
    MalformedItems(&'static str),
    #[error("item `{0}` is not an integer count")]
    InvalidItem(String),
    #[error(transparent)]
    Overflow(#[from] CountOverflow),
}

/// A count or a sum of counts does not fit in an `i64`.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
#[error("`{0}` overflows a 64-bit count")]
pub struct CountOverflow(pub &'static str);

/// Failure to read a query-result payload or one of its rows.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON body: {0}")]
    InvalidBody(#[source] serde_json::Error),
    #[error("unexpected response structure: no `query_result.data.rows`")]
    MissingRows,
    #[error("`query_result.data.rows` is not an array")]
    RowsNotArray,
    #[error("first row `data` is not valid JSON: {0}")]
    InvalidMetadata(#[source] serde_json::Error),
    #[error("reference field `{0}` missing or invalid")]
    InvalidReference(&'static str),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to fetch {name}: {reason}")]
    Fetch { name: String, reason: String },

    #[error("failed to extract statistics row {row}: {error}")]
    Extraction {
        row: usize,
        #[source]
        error: ExtractionError,
    },

    #[error("{scope}: {source}")]
    Overflow {
        scope: String,
        #[source]
        source: CountOverflow,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn fetch(name: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::Fetch {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn overflow(scope: impl Into<String>, source: CountOverflow) -> Self {
        PipelineError::Overflow {
            scope: scope.into(),
            source,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        PipelineError::Io {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

use thiserror::Error;

use crate::data::model::{SeriesId, SeriesKey};

/// Typed failures surfaced by the pipeline.
///
/// Cell-level problems (an unparseable date, a non-numeric value) never show
/// up here: they are absorbed into `None` dates and `NaN` values.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("series '{0}' is not available in this dataset")]
    MissingSeries(SeriesId),

    #[error("no date column found in header row")]
    MissingDateColumn,

    #[error("required series missing from header row: {}", join_keys(.0))]
    MissingRequiredSeries(Vec<SeriesKey>),

    #[error("headers '{first}' and '{second}' both resolve to series '{key}'")]
    AmbiguousHeader {
        key: SeriesKey,
        first: String,
        second: String,
    },

    #[error("series '{0}' already exists")]
    DuplicateSeries(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("no dataset loaded")]
    NotLoaded,

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

fn join_keys(keys: &[SeriesKey]) -> String {
    keys.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

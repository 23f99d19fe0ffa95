//! Error type shared by the loading and aggregation stages.

use thiserror::Error;

/// Errors produced while building or summarising an event table.
#[derive(Error, Debug)]
pub enum StatsError {
    /// Neither a raw export nor a saved snapshot was supplied.
    #[error("one of an input file or a snapshot must be specified")]
    MissingInput,

    /// A required column is absent from the CSV header.
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    /// A date bound given by the caller could not be parsed.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// Aggregation was asked to work on a table with no events.
    #[error("No classifications left to aggregate")]
    EmptyTable,

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StatsError>;

//! Error types for Occupancy Flux

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input rows: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid time of day: {0}")]
    InvalidTime(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid count: {0} (count must be at least 1)")]
    InvalidCount(u32),

    #[error("Malformed interval on {date}: in {in_time}, out {out_time} does not end after it starts")]
    MalformedInterval {
        date: NaiveDate,
        in_time: NaiveTime,
        out_time: NaiveTime,
    },

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

//! Interval parsing
//!
//! Turns cleaned input rows (`Date`, `In Room`, `Out Room`, `Count`) into
//! [`IntervalRecord`]s with absolute start/end timestamps. Rows missing either
//! time are dropped; an out-time at or before the in-time rolls over to the
//! next day.

use crate::error::ComputeError;
use crate::types::{IntervalRecord, RawRow};
use chrono::{NaiveDate, NaiveTime};
use tracing::debug;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%Y-%m-%d %H:%M:%S"];
const TIME_FORMATS: [&str; 2] = ["%H:%M", "%H:%M:%S"];

/// Outcome of parsing a batch of rows
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub records: Vec<IntervalRecord>,
    /// Indices of rows dropped for a missing in/out time
    pub dropped: Vec<usize>,
}

/// A row that could not be turned into a record
#[derive(Debug)]
pub struct RowError {
    pub index: usize,
    pub error: ComputeError,
}

/// Parser for raw input rows
pub struct IntervalParser;

impl IntervalParser {
    /// Parse a JSON string containing an array of rows
    pub fn parse_array(json: &str) -> Result<Vec<RawRow>, ComputeError> {
        let rows: Vec<RawRow> = serde_json::from_str(json)?;
        Ok(rows)
    }

    /// Parse NDJSON (newline-delimited JSON) containing rows
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawRow>, ComputeError> {
        let mut rows = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRow>(trimmed) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(rows)
    }

    /// Parse either a JSON array or NDJSON, decided by the first non-blank
    /// character
    pub fn parse_str(input: &str) -> Result<Vec<RawRow>, ComputeError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Convert rows to interval records.
    ///
    /// Rows with an empty or missing time are skipped and reported in
    /// [`ParsedRows::dropped`]. The first malformed field aborts the batch.
    pub fn to_records(rows: &[RawRow]) -> Result<ParsedRows, ComputeError> {
        let mut parsed = ParsedRows::default();

        for (index, row) in rows.iter().enumerate() {
            match Self::parse_row(row)? {
                Some(record) => parsed.records.push(record),
                None => parsed.dropped.push(index),
            }
        }

        debug!(
            kept = parsed.records.len(),
            dropped = parsed.dropped.len(),
            "parsed interval rows"
        );

        Ok(parsed)
    }

    /// Parse one row. `Ok(None)` means the row has no usable times.
    pub fn parse_row(row: &RawRow) -> Result<Option<IntervalRecord>, ComputeError> {
        let (in_raw, out_raw) = match (non_empty(&row.in_room), non_empty(&row.out_room)) {
            (Some(i), Some(o)) => (i, o),
            _ => return Ok(None),
        };

        let date = parse_date(&row.date)?;
        let in_time = parse_time(in_raw)?;
        let out_time = parse_time(out_raw)?;
        let count = row.count.unwrap_or(1);

        IntervalRecord::new(date, in_time, out_time, count).map(Some)
    }

    /// Check every row and collect the ones that fail, without stopping
    pub fn validate_rows(rows: &[RawRow]) -> Vec<RowError> {
        rows.iter()
            .enumerate()
            .filter_map(|(index, row)| {
                Self::parse_row(row)
                    .err()
                    .map(|error| RowError { index, error })
            })
            .collect()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse a calendar date in one of the accepted layouts
pub fn parse_date(raw: &str) -> Result<NaiveDate, ComputeError> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| {
            NaiveDate::parse_from_str(trimmed, fmt)
                .ok()
                .or_else(|| {
                    chrono::NaiveDateTime::parse_from_str(trimmed, fmt)
                        .ok()
                        .map(|dt| dt.date())
                })
        })
        .ok_or_else(|| ComputeError::DateParseError(raw.to_string()))
}

/// Parse an `HH:MM` (or `HH:MM:SS`) time of day
pub fn parse_time(raw: &str) -> Result<NaiveTime, ComputeError> {
    let trimmed = raw.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| ComputeError::InvalidTime(raw.to_string()))
}

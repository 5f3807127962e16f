//! Rollup normalization
//!
//! This module turns rollup sums into "typical occurrence" statistics.
//! - Each row is divided by a per-key divisor chosen by a [`Divisor`] policy
//! - Results are rounded half away from zero to integers
//! - A zero divisor yields a zero row, never NaN or an error

use crate::error::ComputeError;
use crate::period;
use crate::types::{
    BucketizedRow, DateRange, Dimension, GroupKey, NormalizedMatrix, NormalizedRow, RollupMatrix,
    RollupRow, HOURS_PER_DAY,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Per-key divisor policy
#[derive(Debug, Clone, PartialEq)]
pub enum Divisor {
    /// Number of calendar dates in the range that match each key
    CalendarRange(DateRange),
    /// Number of distinct months seen in the rows being normalized (minimum 1)
    DistinctMonths(usize),
    /// Same constant for every key
    Fixed(f64),
    /// Number of distinct observed dates that match each key
    ObservedDates(BTreeSet<NaiveDate>),
    /// Number of distinct months that contributed to each row (minimum 1)
    ContributingMonths,
}

impl Divisor {
    /// Distinct months among the dates of `rows`
    pub fn distinct_months_of(rows: &[BucketizedRow]) -> Self {
        Divisor::DistinctMonths(period::distinct_months(rows.iter().map(|r| r.date)))
    }

    /// Distinct dates of `rows`
    pub fn observed_dates_of(rows: &[BucketizedRow]) -> Self {
        Divisor::ObservedDates(rows.iter().map(|r| r.date).collect())
    }

    /// Divisor for one key. [`Divisor::ContributingMonths`] needs the row
    /// itself and falls back to 1 here.
    pub fn for_key(&self, key: &GroupKey) -> f64 {
        match self {
            Divisor::CalendarRange(range) => f64::from(calendar_occurrences(range, key)),
            Divisor::DistinctMonths(months) => (*months).max(1) as f64,
            Divisor::Fixed(value) => *value,
            Divisor::ObservedDates(dates) => {
                dates.iter().filter(|d| date_matches(**d, key)).count() as f64
            }
            Divisor::ContributingMonths => 1.0,
        }
    }

    /// Divisor for one rollup row
    pub fn for_row(&self, row: &RollupRow) -> f64 {
        match self {
            Divisor::ContributingMonths => row.months.max(1) as f64,
            _ => self.for_key(&row.key),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Divisor::CalendarRange(_) => "calendar_range",
            Divisor::DistinctMonths(_) => "distinct_months",
            Divisor::Fixed(_) => "fixed",
            Divisor::ObservedDates(_) => "observed_dates",
            Divisor::ContributingMonths => "contributing_months",
        }
    }
}

/// How week-of-month heatmaps are averaged
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekNormalization {
    /// Distinct months present in the week's rows (minimum 1)
    #[default]
    DistinctMonths,
    /// Constant divisor
    Fixed(f64),
}

impl WeekNormalization {
    /// Resolve against the rows of one week
    pub fn divisor(&self, week_rows: &[BucketizedRow]) -> Divisor {
        match self {
            WeekNormalization::DistinctMonths => Divisor::distinct_months_of(week_rows),
            WeekNormalization::Fixed(value) => Divisor::Fixed(*value),
        }
    }

    /// Divisor for a week-of-month rollup, where each row only holds the
    /// rows carrying its own week label
    pub fn week_divisor(&self) -> Divisor {
        match self {
            WeekNormalization::DistinctMonths => Divisor::ContributingMonths,
            WeekNormalization::Fixed(value) => Divisor::Fixed(*value),
        }
    }
}

/// Normalizer for converting rollups to integer matrices
pub struct Normalizer;

impl Normalizer {
    /// Divide each row by the number of dates in `[start_date, end_date]`
    /// matching its key.
    ///
    /// Week-of-month matrices are averaged per month instead: each week row
    /// is divided by the distinct months that contributed to it, so a week
    /// row reads as a typical week rather than a typical day.
    pub fn normalize(
        rollup: &RollupMatrix,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<NormalizedMatrix, ComputeError> {
        let range = DateRange::new(start_date, end_date)?;
        if let Some(row) = rollup
            .rows
            .iter()
            .find(|r| r.key.dimension() != rollup.dimension)
        {
            return Err(ComputeError::DimensionMismatch(format!(
                "row {} in a {} matrix",
                row.key,
                rollup.dimension.as_str()
            )));
        }
        let policy = match rollup.dimension {
            Dimension::WeekOfMonth => WeekNormalization::DistinctMonths.week_divisor(),
            _ => Divisor::CalendarRange(range),
        };
        Ok(Self::normalize_with(rollup, &policy))
    }

    /// Divide each row by the divisor `policy` assigns to its key
    pub fn normalize_with(rollup: &RollupMatrix, policy: &Divisor) -> NormalizedMatrix {
        let rows = rollup
            .rows
            .iter()
            .map(|row| {
                let divisor = policy.for_row(row);
                let mut hours = [0i64; HOURS_PER_DAY];
                for (out, value) in hours.iter_mut().zip(row.hours.iter()) {
                    *out = divide_round(*value, divisor);
                }
                NormalizedRow {
                    key: row.key,
                    divisor,
                    hours,
                }
            })
            .collect();

        debug!(
            dimension = rollup.dimension.as_str(),
            policy = policy.name(),
            "normalized rollup"
        );

        NormalizedMatrix {
            dimension: rollup.dimension,
            rows,
        }
    }
}

/// `value / divisor` rounded half away from zero; non-positive divisors give 0
pub fn divide_round(value: f64, divisor: f64) -> i64 {
    if divisor <= 0.0 || !divisor.is_finite() {
        return 0;
    }
    let quotient = value / divisor;
    if quotient.is_finite() {
        quotient.round() as i64
    } else {
        0
    }
}

fn calendar_occurrences(range: &DateRange, key: &GroupKey) -> u32 {
    match key {
        GroupKey::Weekday(w) => period::weekday_occurrences(range)[period::weekday_index(*w)],
        GroupKey::Week(w) => period::week_of_month_occurrences(range)[usize::from(w.number() - 1)],
        GroupKey::Month(m) => period::month_occurrences(range, *m),
        GroupKey::Date(d) => u32::from(range.contains(*d)),
    }
}

fn date_matches(date: NaiveDate, key: &GroupKey) -> bool {
    match key {
        GroupKey::Weekday(w) => period::weekday(date) == *w,
        GroupKey::Week(w) => period::week_of_month(date) == *w,
        GroupKey::Month(m) => period::month_key(date) == *m,
        GroupKey::Date(d) => date == *d,
    }
}

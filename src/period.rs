//! Period assignment
//!
//! Classifies calendar dates into the grouping keys used by rollups:
//! - English weekday name, canonical order Sunday..Saturday
//! - Week of month by day-of-month bucket (1-7, 8-14, 15-21, 22-28, 29-31)
//! - Year-month with a `"YYYY-MM"` sort key and `"Mon YY"` display label
//!
//! Also counts how often each key occurs in a calendar range, which the
//! normalizer uses as its divisor.

use crate::types::{DateRange, WeekOfMonth, YearMonth};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serializer;
use std::collections::BTreeSet;

/// Canonical weekday row order
pub const WEEKDAY_ORDER: [Weekday; 7] = [
    Weekday::Sun,
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
];

/// English day name
pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

/// Parse a full English day name. Abbreviations and other spellings are not
/// part of the canonical set.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    WEEKDAY_ORDER
        .into_iter()
        .find(|w| weekday_name(*w) == name)
}

/// Position of a weekday in [`WEEKDAY_ORDER`]
pub fn weekday_index(weekday: Weekday) -> usize {
    weekday.num_days_from_sunday() as usize
}

pub fn weekday(date: NaiveDate) -> Weekday {
    date.weekday()
}

pub fn week_of_month(date: NaiveDate) -> WeekOfMonth {
    WeekOfMonth::from_day(date.day())
}

pub fn month_key(date: NaiveDate) -> YearMonth {
    YearMonth::of(date)
}

pub(crate) fn serialize_weekday<S: Serializer>(
    weekday: &chrono::Weekday,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(weekday_name(*weekday))
}

/// Number of dates in `range` falling on each weekday, indexed like
/// [`WEEKDAY_ORDER`]
pub fn weekday_occurrences(range: &DateRange) -> [u32; 7] {
    let mut counts = [0u32; 7];
    for date in range.days() {
        counts[weekday_index(date.weekday())] += 1;
    }
    counts
}

/// Number of dates in `range` falling in each week-of-month bucket, indexed
/// like [`WeekOfMonth::ALL`]
pub fn week_of_month_occurrences(range: &DateRange) -> [u32; 5] {
    let mut counts = [0u32; 5];
    for date in range.days() {
        counts[usize::from(week_of_month(date).number() - 1)] += 1;
    }
    counts
}

/// Number of dates in `range` that belong to `month`
pub fn month_occurrences(range: &DateRange, month: YearMonth) -> u32 {
    range.days().filter(|d| YearMonth::of(*d) == month).count() as u32
}

/// Every month intersecting `range`, chronological
pub fn months_in_range(range: &DateRange) -> Vec<YearMonth> {
    let last = YearMonth::of(range.end);
    let mut months = Vec::new();
    let mut current = YearMonth::of(range.start);
    while current <= last {
        months.push(current);
        current = current.succ();
    }
    months
}

/// Distinct months among `dates`
pub fn distinct_months<I>(dates: I) -> usize
where
    I: IntoIterator<Item = NaiveDate>,
{
    dates
        .into_iter()
        .map(YearMonth::of)
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekday_names_round_trip() {
        for w in WEEKDAY_ORDER {
            assert_eq!(parse_weekday(weekday_name(w)), Some(w));
        }
        assert_eq!(parse_weekday("monday"), None);
        assert_eq!(parse_weekday("Funday"), None);
    }

    #[test]
    fn test_canonical_order_starts_sunday() {
        assert_eq!(weekday_index(Weekday::Sun), 0);
        assert_eq!(weekday_index(Weekday::Sat), 6);
        assert_eq!(weekday(d(2025, 1, 6)), Weekday::Mon);
    }

    #[test]
    fn test_january_2025_weekday_occurrences() {
        // Jan 1 2025 is a Wednesday: Wed/Thu/Fri occur 5 times, the rest 4
        let range = DateRange::new(d(2025, 1, 1), d(2025, 1, 31)).unwrap();
        let counts = weekday_occurrences(&range);
        assert_eq!(counts, [4, 4, 4, 5, 5, 5, 4]);
    }

    #[test]
    fn test_week_of_month_occurrences_february() {
        let range = DateRange::new(d(2025, 2, 1), d(2025, 2, 28)).unwrap();
        assert_eq!(week_of_month_occurrences(&range), [7, 7, 7, 7, 0]);

        let range = DateRange::new(d(2024, 2, 1), d(2024, 2, 29)).unwrap();
        assert_eq!(week_of_month_occurrences(&range), [7, 7, 7, 7, 1]);
    }

    #[test]
    fn test_months_in_range_spans_year_end() {
        let range = DateRange::new(d(2024, 11, 20), d(2025, 2, 3)).unwrap();
        let months = months_in_range(&range);
        assert_eq!(
            months,
            vec![
                YearMonth::new(2024, 11),
                YearMonth::new(2024, 12),
                YearMonth::new(2025, 1),
                YearMonth::new(2025, 2),
            ]
        );
        assert_eq!(month_occurrences(&range, YearMonth::new(2024, 11)), 11);
        assert_eq!(month_occurrences(&range, YearMonth::new(2025, 2)), 3);
    }

    #[test]
    fn test_distinct_months() {
        let dates = vec![d(2025, 1, 29), d(2025, 1, 30), d(2025, 3, 31)];
        assert_eq!(distinct_months(dates), 2);
        assert_eq!(distinct_months(Vec::new()), 0);
    }
}

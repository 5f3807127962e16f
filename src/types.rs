//! Core types for the Occupancy Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw rows, interval records, bucketized rows, rollup matrices and
//! normalized matrices.

use crate::error::ComputeError;
use crate::period;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Number of hourly buckets in one day
pub const HOURS_PER_DAY: usize = 24;

/// One value per hour-of-day bucket, index `h` covers `[h:00, h+1:00)`
pub type HourValues = [f64; HOURS_PER_DAY];

/// How an interval contributes to an hour bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketMode {
    /// Full count if the interval overlaps the bucket at all
    #[default]
    Presence,
    /// Count times the fractional hours of overlap
    Duration,
}

impl BucketMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketMode::Presence => "presence",
            BucketMode::Duration => "duration",
        }
    }
}

/// Grouping dimension for rollups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Sunday..Saturday
    Weekday,
    /// Week 1..Week 5
    WeekOfMonth,
    /// Chronological year-month
    Month,
    /// One row per calendar date touched
    Date,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Weekday => "weekday",
            Dimension::WeekOfMonth => "week_of_month",
            Dimension::Month => "month",
            Dimension::Date => "date",
        }
    }
}

/// How a weekday's total is expressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalMode {
    /// Sum of the 24 hourly values
    #[default]
    Sum,
    /// Sum divided by 24 (average concurrently present)
    AveragePerHour,
}

/// Week-of-month bucket by day-of-month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WeekOfMonth {
    #[serde(rename = "Week 1")]
    Week1,
    #[serde(rename = "Week 2")]
    Week2,
    #[serde(rename = "Week 3")]
    Week3,
    #[serde(rename = "Week 4")]
    Week4,
    #[serde(rename = "Week 5")]
    Week5,
}

impl WeekOfMonth {
    /// Canonical order
    pub const ALL: [WeekOfMonth; 5] = [
        WeekOfMonth::Week1,
        WeekOfMonth::Week2,
        WeekOfMonth::Week3,
        WeekOfMonth::Week4,
        WeekOfMonth::Week5,
    ];

    /// Classify a day-of-month (1-31)
    pub fn from_day(day: u32) -> Self {
        match day {
            0..=7 => WeekOfMonth::Week1,
            8..=14 => WeekOfMonth::Week2,
            15..=21 => WeekOfMonth::Week3,
            22..=28 => WeekOfMonth::Week4,
            _ => WeekOfMonth::Week5,
        }
    }

    /// 1-based week number
    pub fn number(&self) -> u8 {
        match self {
            WeekOfMonth::Week1 => 1,
            WeekOfMonth::Week2 => 2,
            WeekOfMonth::Week3 => 3,
            WeekOfMonth::Week4 => 4,
            WeekOfMonth::Week5 => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        WeekOfMonth::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    pub fn label(&self) -> &'static str {
        match self {
            WeekOfMonth::Week1 => "Week 1",
            WeekOfMonth::Week2 => "Week 2",
            WeekOfMonth::Week3 => "Week 3",
            WeekOfMonth::Week4 => "Week 4",
            WeekOfMonth::Week5 => "Week 5",
        }
    }

    /// Parse a canonical label; anything else is `None`
    pub fn from_label(label: &str) -> Option<Self> {
        WeekOfMonth::ALL.into_iter().find(|w| w.label() == label)
    }
}

impl fmt::Display for WeekOfMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn of(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month())
    }

    /// First day of this month
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// The following month
    pub fn succ(&self) -> Self {
        if self.month >= 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }

    /// Sort key, `"YYYY-MM"`
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// Display label, `"Jan 25"`
    pub fn label(&self) -> String {
        match self.first_day() {
            Some(date) => date.format("%b %y").to_string(),
            None => self.key(),
        }
    }

    /// Parse a `"YYYY-MM"` key
    pub fn from_key(key: &str) -> Option<Self> {
        let (year, month) = key.split_once('-')?;
        let ym = Self::new(year.parse().ok()?, month.parse().ok()?);
        ym.first_day().map(|_| ym)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Row key of a rollup matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    Weekday(Weekday),
    Week(WeekOfMonth),
    Month(YearMonth),
    Date(NaiveDate),
}

impl GroupKey {
    pub fn dimension(&self) -> Dimension {
        match self {
            GroupKey::Weekday(_) => Dimension::Weekday,
            GroupKey::Week(_) => Dimension::WeekOfMonth,
            GroupKey::Month(_) => Dimension::Month,
            GroupKey::Date(_) => Dimension::Date,
        }
    }

    /// Parse a label in the given dimension. Labels outside the canonical
    /// set yield `None`.
    pub fn parse(dimension: Dimension, label: &str) -> Option<Self> {
        match dimension {
            Dimension::Weekday => period::parse_weekday(label).map(GroupKey::Weekday),
            Dimension::WeekOfMonth => WeekOfMonth::from_label(label).map(GroupKey::Week),
            Dimension::Month => YearMonth::from_key(label).map(GroupKey::Month),
            Dimension::Date => NaiveDate::parse_from_str(label, "%Y-%m-%d")
                .ok()
                .map(GroupKey::Date),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Weekday(w) => f.write_str(period::weekday_name(*w)),
            GroupKey::Week(w) => f.write_str(w.label()),
            GroupKey::Month(m) => write!(f, "{m}"),
            GroupKey::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ComputeError> {
        if start > end {
            return Err(ComputeError::InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Smallest range covering every record's date
    pub fn covering(records: &[IntervalRecord]) -> Option<Self> {
        let start = records.iter().map(|r| r.date()).min()?;
        let end = records.iter().map(|r| r.date()).max()?;
        Some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, in order
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// One row of the cleaned input table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "In Room", default)]
    pub in_room: Option<String>,
    #[serde(rename = "Out Room", default)]
    pub out_room: Option<String>,
    #[serde(rename = "Count", default)]
    pub count: Option<u32>,
}

/// A parsed stay with absolute start and end timestamps
///
/// Construction guarantees `count >= 1` and `end > start`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IntervalRecord {
    date: NaiveDate,
    in_time: NaiveTime,
    out_time: NaiveTime,
    count: u32,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl IntervalRecord {
    /// Build a record, rolling `end` forward one day when it does not come
    /// after `start`. Equal in/out times therefore mean a 24-hour stay.
    pub fn new(
        date: NaiveDate,
        in_time: NaiveTime,
        out_time: NaiveTime,
        count: u32,
    ) -> Result<Self, ComputeError> {
        if count == 0 {
            return Err(ComputeError::InvalidCount(count));
        }

        let start = date.and_time(in_time);
        let mut end = date.and_time(out_time);
        if end <= start {
            end += Duration::days(1);
        }
        if end <= start {
            return Err(ComputeError::MalformedInterval {
                date,
                in_time,
                out_time,
            });
        }

        Ok(Self {
            date,
            in_time,
            out_time,
            count,
            start,
            end,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn in_time(&self) -> NaiveTime {
        self.in_time
    }

    pub fn out_time(&self) -> NaiveTime {
        self.out_time
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Length of the stay in hours
    pub fn duration_hours(&self) -> f64 {
        (self.end - self.start).num_seconds() as f64 / 3600.0
    }

    /// Whether the stay reaches into a later calendar day. Ending exactly at
    /// midnight does not count.
    pub fn crosses_midnight(&self) -> bool {
        self.last_day() > self.date
    }

    /// Last calendar date with a non-empty overlap
    pub fn last_day(&self) -> NaiveDate {
        (self.end - Duration::nanoseconds(1)).date()
    }
}

/// Hourly contributions of one record to one calendar date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketizedRow {
    /// Source record
    pub record: IntervalRecord,
    /// Calendar date these buckets belong to
    pub date: NaiveDate,
    #[serde(serialize_with = "period::serialize_weekday")]
    pub weekday: Weekday,
    pub week_of_month: WeekOfMonth,
    pub mode: BucketMode,
    pub hours: HourValues,
}

impl BucketizedRow {
    pub fn total(&self) -> f64 {
        self.hours.iter().sum()
    }

    /// Row key for the given dimension
    pub fn key(&self, dimension: Dimension) -> GroupKey {
        match dimension {
            Dimension::Weekday => GroupKey::Weekday(self.weekday),
            Dimension::WeekOfMonth => GroupKey::Week(self.week_of_month),
            Dimension::Month => GroupKey::Month(YearMonth::of(self.date)),
            Dimension::Date => GroupKey::Date(self.date),
        }
    }
}

/// One row of a rollup matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupRow {
    pub key: GroupKey,
    pub hours: HourValues,
    /// Distinct calendar months among the bucketized rows summed into this row
    pub months: usize,
}

impl RollupRow {
    pub fn zeroed(key: GroupKey) -> Self {
        Self {
            key,
            hours: [0.0; HOURS_PER_DAY],
            months: 0,
        }
    }

    /// Sum of the 24 hourly values, optionally divided by 24
    pub fn total(&self, mode: TotalMode) -> f64 {
        let sum: f64 = self.hours.iter().sum();
        match mode {
            TotalMode::Sum => sum,
            TotalMode::AveragePerHour => sum / HOURS_PER_DAY as f64,
        }
    }
}

/// Group key → 24 aggregate values, rows in canonical order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupMatrix {
    pub dimension: Dimension,
    pub rows: Vec<RollupRow>,
}

impl RollupMatrix {
    pub fn get(&self, key: &GroupKey) -> Option<&HourValues> {
        self.rows.iter().find(|r| &r.key == key).map(|r| &r.hours)
    }

    pub fn keys(&self) -> Vec<GroupKey> {
        self.rows.iter().map(|r| r.key).collect()
    }

    /// Per-key totals in row order
    pub fn totals(&self, mode: TotalMode) -> Vec<(GroupKey, f64)> {
        self.rows.iter().map(|r| (r.key, r.total(mode))).collect()
    }

    pub fn is_all_zero(&self) -> bool {
        self.rows.iter().all(|r| r.hours.iter().all(|v| *v == 0.0))
    }
}

/// One row of a normalized matrix
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub key: GroupKey,
    /// Divisor applied to this row (0 means the row was forced to zero)
    pub divisor: f64,
    pub hours: [i64; HOURS_PER_DAY],
}

/// Rollup divided per key and rounded half away from zero
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMatrix {
    pub dimension: Dimension,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedMatrix {
    pub fn get(&self, key: &GroupKey) -> Option<&[i64; HOURS_PER_DAY]> {
        self.rows.iter().find(|r| &r.key == key).map(|r| &r.hours)
    }

    pub fn is_all_zero(&self) -> bool {
        self.rows.iter().all(|r| r.hours.iter().all(|v| *v == 0))
    }
}

/// Scalar total for one weekday
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeekdayTotal {
    #[serde(serialize_with = "period::serialize_weekday")]
    pub weekday: Weekday,
    pub total: f64,
}

/// Sum of record counts for one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlySummary {
    pub month: YearMonth,
    pub label: String,
    pub count: u64,
}

/// Per-weekday count of source records, divided and rounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekdayCount {
    #[serde(serialize_with = "period::serialize_weekday")]
    pub weekday: Weekday,
    pub count: i64,
}

/// Normalized weekday matrix for one week of month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekHeatmap {
    pub week: WeekOfMonth,
    /// Divisor applied to the week's sums
    pub divisor: f64,
    pub matrix: NormalizedMatrix,
    /// Record counts per weekday dated in this week, divided the same way
    pub counts: Vec<WeekdayCount>,
}

// ============================================================================
// Output payload
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadProvenance {
    pub mode: BucketMode,
    pub record_count: usize,
    /// Reference range used for normalization, if any
    pub date_range: Option<DateRange>,
    /// SHA-256 of the input records
    pub input_hash: String,
    pub computed_at_utc: String,
}

/// Result section of a payload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadBody {
    Heatmap { matrix: NormalizedMatrix },
    Rollup { matrix: RollupMatrix },
    WeekHeatmaps { weeks: Vec<WeekHeatmap> },
    WeekdayTotals {
        total_mode: TotalMode,
        totals: Vec<WeekdayTotal>,
    },
    MonthlySummary { months: Vec<MonthlySummary> },
}

/// Self-describing output document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupancyPayload {
    pub schema_version: String,
    pub producer: PayloadProducer,
    pub provenance: PayloadProvenance,
    pub body: PayloadBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_same_day_interval() {
        let rec = IntervalRecord::new(d(2025, 1, 6), t(8, 0), t(12, 0), 1).unwrap();
        assert_eq!(rec.end(), d(2025, 1, 6).and_time(t(12, 0)));
        assert!((rec.duration_hours() - 4.0).abs() < 1e-9);
        assert!(!rec.crosses_midnight());
    }

    #[test]
    fn test_cross_midnight_interval() {
        let rec = IntervalRecord::new(d(2025, 1, 6), t(23, 30), t(0, 15), 2).unwrap();
        assert_eq!(rec.end(), d(2025, 1, 7).and_time(t(0, 15)));
        assert!((rec.duration_hours() - 0.75).abs() < 1e-9);
        assert!(rec.crosses_midnight());
    }

    #[test]
    fn test_equal_times_is_full_day() {
        let rec = IntervalRecord::new(d(2025, 1, 6), t(9, 0), t(9, 0), 1).unwrap();
        assert!((rec.duration_hours() - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_count_rejected() {
        let err = IntervalRecord::new(d(2025, 1, 6), t(8, 0), t(9, 0), 0).unwrap_err();
        assert!(matches!(err, ComputeError::InvalidCount(0)));
    }

    #[test]
    fn test_week_of_month_boundaries() {
        assert_eq!(WeekOfMonth::from_day(1), WeekOfMonth::Week1);
        assert_eq!(WeekOfMonth::from_day(7), WeekOfMonth::Week1);
        assert_eq!(WeekOfMonth::from_day(8), WeekOfMonth::Week2);
        assert_eq!(WeekOfMonth::from_day(21), WeekOfMonth::Week3);
        assert_eq!(WeekOfMonth::from_day(28), WeekOfMonth::Week4);
        assert_eq!(WeekOfMonth::from_day(29), WeekOfMonth::Week5);
        assert_eq!(WeekOfMonth::from_day(31), WeekOfMonth::Week5);
        assert_eq!(WeekOfMonth::from_number(5), Some(WeekOfMonth::Week5));
        assert_eq!(WeekOfMonth::from_number(0), None);
        assert_eq!(WeekOfMonth::from_number(6), None);
    }

    #[test]
    fn test_year_month_labels() {
        let ym = YearMonth::of(d(2025, 1, 17));
        assert_eq!(ym.key(), "2025-01");
        assert_eq!(ym.label(), "Jan 25");
        assert_eq!(YearMonth::new(2024, 12).succ(), YearMonth::new(2025, 1));
        assert_eq!(YearMonth::from_key("2025-02"), Some(YearMonth::new(2025, 2)));
        assert_eq!(YearMonth::from_key("2025-13"), None);
    }

    #[test]
    fn test_group_key_parse_rejects_noise() {
        assert_eq!(
            GroupKey::parse(Dimension::Weekday, "Monday"),
            Some(GroupKey::Weekday(Weekday::Mon))
        );
        assert_eq!(GroupKey::parse(Dimension::Weekday, "Mon"), None);
        assert_eq!(GroupKey::parse(Dimension::WeekOfMonth, "Week 6"), None);
        assert_eq!(
            GroupKey::parse(Dimension::WeekOfMonth, "Week 5"),
            Some(GroupKey::Week(WeekOfMonth::Week5))
        );
    }

    #[test]
    fn test_date_range_validation() {
        assert!(DateRange::new(d(2025, 1, 2), d(2025, 1, 1)).is_err());
        let range = DateRange::new(d(2025, 1, 1), d(2025, 1, 31)).unwrap();
        assert_eq!(range.days().count(), 31);
        assert!(range.contains(d(2025, 1, 31)));
        assert!(!range.contains(d(2025, 2, 1)));
    }
}

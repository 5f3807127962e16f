//! Grouping and rollup
//!
//! Sums bucketized rows per group key into wide matrices (one row per key, 24
//! hour columns). Row order is always canonical: Sunday..Saturday for
//! weekdays, Week 1..Week 5 for week of month, chronological for months and
//! dates. Canonical keys with no data get an all-zero row; keys outside the
//! canonical set are dropped.

use crate::normalizer::divide_round;
use crate::period::{self, WEEKDAY_ORDER};
use crate::types::{
    BucketizedRow, DateRange, Dimension, GroupKey, HourValues, IntervalRecord, MonthlySummary,
    RollupMatrix, RollupRow, TotalMode, WeekOfMonth, WeekdayCount, WeekdayTotal, YearMonth,
};
use chrono::Datelike;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Rollup engine for grouping bucketized rows
pub struct RollupEngine;

impl RollupEngine {
    /// Sum hourly values per key of `dimension`.
    ///
    /// Weekday and week-of-month matrices always carry the full canonical key
    /// set, even for empty input. Month and date matrices carry the keys that
    /// occur in the data.
    pub fn rollup(rows: &[BucketizedRow], dimension: Dimension) -> RollupMatrix {
        let keys = match dimension {
            Dimension::Weekday | Dimension::WeekOfMonth => canonical_keys(dimension),
            Dimension::Month | Dimension::Date => {
                observed_keys(rows.iter().map(|r| r.key(dimension)))
            }
        };

        accumulate(
            dimension,
            keys,
            rows.iter()
                .map(|r| (r.key(dimension), &r.hours, Some(YearMonth::of(r.date)))),
        )
    }

    /// Like [`RollupEngine::rollup`], restricted to rows dated inside `range`.
    /// Month and date matrices get a row for every month/date in the range.
    pub fn rollup_in_range(
        rows: &[BucketizedRow],
        dimension: Dimension,
        range: &DateRange,
    ) -> RollupMatrix {
        let keys = match dimension {
            Dimension::Weekday | Dimension::WeekOfMonth => canonical_keys(dimension),
            Dimension::Month => period::months_in_range(range)
                .into_iter()
                .map(GroupKey::Month)
                .collect(),
            Dimension::Date => range.days().map(GroupKey::Date).collect(),
        };

        accumulate(
            dimension,
            keys,
            rows.iter()
                .filter(|r| range.contains(r.date))
                .map(|r| (r.key(dimension), &r.hours, Some(YearMonth::of(r.date)))),
        )
    }

    /// Per-date matrix, chronological
    pub fn rollup_by_date(rows: &[BucketizedRow]) -> RollupMatrix {
        Self::rollup(rows, Dimension::Date)
    }

    /// Weekday × hour matrix over the rows of one week of month
    pub fn rollup_week(rows: &[BucketizedRow], week: WeekOfMonth) -> RollupMatrix {
        accumulate(
            Dimension::Weekday,
            canonical_keys(Dimension::Weekday),
            rows.iter()
                .filter(|r| r.week_of_month == week)
                .map(|r| (GroupKey::Weekday(r.weekday), &r.hours, Some(YearMonth::of(r.date)))),
        )
    }

    /// Roll up rows that arrive with string labels (e.g. a previously
    /// exported matrix). Labels that do not parse in `dimension` are dropped.
    pub fn rollup_labelled<'a, I>(entries: I, dimension: Dimension) -> RollupMatrix
    where
        I: IntoIterator<Item = (&'a str, &'a HourValues)>,
    {
        let mut parsed = Vec::new();
        let mut skipped = 0usize;
        for (label, hours) in entries {
            match GroupKey::parse(dimension, label) {
                Some(key) => parsed.push((key, hours)),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                skipped,
                dimension = dimension.as_str(),
                "dropped rows with non-canonical labels"
            );
        }

        let keys = match dimension {
            Dimension::Weekday | Dimension::WeekOfMonth => canonical_keys(dimension),
            Dimension::Month | Dimension::Date => observed_keys(parsed.iter().map(|(k, _)| *k)),
        };

        accumulate(
            dimension,
            keys,
            parsed.into_iter().map(|(key, hours)| (key, hours, None)),
        )
    }

    /// Sum of all 24 hourly values per weekday, Sunday..Saturday
    pub fn weekly_total(rows: &[BucketizedRow]) -> Vec<WeekdayTotal> {
        Self::weekly_total_with(rows, TotalMode::Sum, None)
    }

    /// Weekday totals, optionally averaged per hour and per calendar
    /// occurrence of the weekday in `range`. A weekday that never occurs in
    /// the range totals 0.
    pub fn weekly_total_with(
        rows: &[BucketizedRow],
        mode: TotalMode,
        range: Option<&DateRange>,
    ) -> Vec<WeekdayTotal> {
        let matrix = Self::rollup(rows, Dimension::Weekday);
        let occurrences = range.map(period::weekday_occurrences);

        matrix
            .rows
            .iter()
            .filter_map(|row| match row.key {
                GroupKey::Weekday(weekday) => Some((weekday, row.total(mode))),
                _ => None,
            })
            .map(|(weekday, total)| {
                let total = match occurrences {
                    Some(counts) => {
                        let days = counts[period::weekday_index(weekday)];
                        if days == 0 {
                            0.0
                        } else {
                            total / f64::from(days)
                        }
                    }
                    None => total,
                };
                WeekdayTotal { weekday, total }
            })
            .collect()
    }

    /// Sum of record counts per month, chronological
    pub fn monthly_summary(records: &[IntervalRecord]) -> Vec<MonthlySummary> {
        let mut by_month: BTreeMap<YearMonth, u64> = BTreeMap::new();
        for record in records {
            *by_month.entry(YearMonth::of(record.date())).or_insert(0) += u64::from(record.count());
        }

        by_month
            .into_iter()
            .map(|(month, count)| MonthlySummary {
                month,
                label: month.label(),
                count,
            })
            .collect()
    }

    /// Per-weekday sum of record counts for records dated in `week`, divided
    /// by `divisor` and rounded half away from zero. A zero divisor yields 0.
    pub fn week_count_summary(
        records: &[IntervalRecord],
        week: WeekOfMonth,
        divisor: f64,
    ) -> Vec<WeekdayCount> {
        let mut sums = [0u64; 7];
        for record in records
            .iter()
            .filter(|r| period::week_of_month(r.date()) == week)
        {
            sums[period::weekday_index(period::weekday(record.date()))] += u64::from(record.count());
        }

        WEEKDAY_ORDER
            .into_iter()
            .map(|weekday| {
                let sum = sums[period::weekday_index(weekday)] as f64;
                WeekdayCount {
                    weekday,
                    count: divide_round(sum, divisor),
                }
            })
            .collect()
    }
}

/// Fixed key set for weekday and week-of-month; empty for data-driven
/// dimensions
pub fn canonical_keys(dimension: Dimension) -> Vec<GroupKey> {
    match dimension {
        Dimension::Weekday => WEEKDAY_ORDER.into_iter().map(GroupKey::Weekday).collect(),
        Dimension::WeekOfMonth => WeekOfMonth::ALL.into_iter().map(GroupKey::Week).collect(),
        Dimension::Month | Dimension::Date => Vec::new(),
    }
}

/// Distinct keys in chronological (or canonical) order
fn observed_keys<I>(keys: I) -> Vec<GroupKey>
where
    I: IntoIterator<Item = GroupKey>,
{
    let mut seen = HashSet::new();
    let mut keys: Vec<GroupKey> = keys.into_iter().filter(|k| seen.insert(*k)).collect();
    keys.sort_by_key(sort_key);
    keys
}

fn sort_key(key: &GroupKey) -> (i32, u32, u32) {
    match key {
        GroupKey::Month(m) => (m.year, m.month, 0),
        GroupKey::Date(d) => (d.year(), d.month(), d.day()),
        GroupKey::Weekday(w) => (0, 0, period::weekday_index(*w) as u32),
        GroupKey::Week(w) => (0, 0, u32::from(w.number())),
    }
}

/// Left-join `entries` onto `keys`: entries whose key is not in `keys` are
/// dropped, keys without entries stay zero. Each entry may name the month it
/// came from; rows count the distinct months they received.
fn accumulate<'a, I>(dimension: Dimension, keys: Vec<GroupKey>, entries: I) -> RollupMatrix
where
    I: IntoIterator<Item = (GroupKey, &'a HourValues, Option<YearMonth>)>,
{
    let index: HashMap<GroupKey, usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let mut rows: Vec<RollupRow> = keys.into_iter().map(RollupRow::zeroed).collect();
    let mut months: Vec<HashSet<YearMonth>> = vec![HashSet::new(); rows.len()];

    let mut summed = 0usize;
    for (key, hours, month) in entries {
        let Some(&i) = index.get(&key) else {
            continue;
        };
        for (acc, value) in rows[i].hours.iter_mut().zip(hours.iter()) {
            *acc += value;
        }
        if let Some(month) = month {
            months[i].insert(month);
        }
        summed += 1;
    }
    for (row, seen) in rows.iter_mut().zip(months) {
        row.months = seen.len();
    }

    debug!(
        dimension = dimension.as_str(),
        keys = rows.len(),
        summed,
        "rolled up rows"
    );

    RollupMatrix { dimension, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucketizer::Bucketizer;
    use crate::types::{BucketMode, HOURS_PER_DAY};
    use chrono::{NaiveDate, NaiveTime, Weekday};

    fn record(date: (i32, u32, u32), in_hm: (u32, u32), out_hm: (u32, u32), count: u32) -> IntervalRecord {
        IntervalRecord::new(
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            NaiveTime::from_hms_opt(in_hm.0, in_hm.1, 0).unwrap(),
            NaiveTime::from_hms_opt(out_hm.0, out_hm.1, 0).unwrap(),
            count,
        )
        .unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_weekday_rollup_is_canonical_for_empty_input() {
        let matrix = RollupEngine::rollup(&[], Dimension::Weekday);
        let labels: Vec<String> = matrix.rows.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(
            labels,
            vec!["Sunday", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"]
        );
        assert!(matrix.is_all_zero());
    }

    #[test]
    fn test_week_rollup_keeps_empty_week_five() {
        let rows = Bucketizer::bucketize(&[record((2025, 1, 6), (8, 0), (9, 0), 1)], BucketMode::Presence);
        let matrix = RollupEngine::rollup(&rows, Dimension::WeekOfMonth);
        assert_eq!(matrix.rows.len(), 5);
        assert_eq!(matrix.rows[4].key, GroupKey::Week(WeekOfMonth::Week5));
        assert!(matrix.rows[4].hours.iter().all(|v| *v == 0.0));
        assert_eq!(matrix.get(&GroupKey::Week(WeekOfMonth::Week1)).unwrap()[8], 1.0);
    }

    #[test]
    fn test_weekday_rollup_sums_counts() {
        let records = vec![
            record((2025, 1, 6), (8, 0), (12, 0), 1),
            record((2025, 1, 13), (8, 0), (12, 0), 1),
            record((2025, 1, 7), (10, 0), (11, 0), 5),
        ];
        let rows = Bucketizer::bucketize(&records, BucketMode::Presence);
        let matrix = RollupEngine::rollup(&rows, Dimension::Weekday);

        let monday = matrix.get(&GroupKey::Weekday(Weekday::Mon)).unwrap();
        for h in 0..HOURS_PER_DAY {
            let expected = if (8..12).contains(&h) { 2.0 } else { 0.0 };
            assert_eq!(monday[h], expected, "hour {h}");
        }
        assert_eq!(matrix.get(&GroupKey::Weekday(Weekday::Tue)).unwrap()[10], 5.0);
    }

    #[test]
    fn test_month_rollup_is_chronological() {
        let records = vec![
            record((2025, 3, 2), (8, 0), (9, 0), 1),
            record((2024, 12, 31), (8, 0), (9, 0), 1),
            record((2025, 1, 15), (8, 0), (9, 0), 2),
        ];
        let rows = Bucketizer::bucketize(&records, BucketMode::Presence);
        let matrix = RollupEngine::rollup(&rows, Dimension::Month);
        let keys: Vec<String> = matrix.rows.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["2024-12", "2025-01", "2025-03"]);
    }

    #[test]
    fn test_rollup_in_range_fills_months_and_filters() {
        let records = vec![
            record((2025, 1, 15), (8, 0), (9, 0), 1),
            record((2025, 4, 1), (8, 0), (9, 0), 1),
        ];
        let rows = Bucketizer::bucketize(&records, BucketMode::Presence);
        let range = DateRange::new(d(2025, 1, 1), d(2025, 3, 31)).unwrap();
        let matrix = RollupEngine::rollup_in_range(&rows, Dimension::Month, &range);
        let keys: Vec<String> = matrix.rows.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(keys, vec!["2025-01", "2025-02", "2025-03"]);
        assert_eq!(matrix.rows[0].hours[8], 1.0);
        assert!(matrix.rows[1].hours.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_rollup_by_date_splits_cross_midnight() {
        let rows = Bucketizer::bucketize(
            &[record((2025, 1, 6), (23, 30), (0, 15), 1)],
            BucketMode::Presence,
        );
        let matrix = RollupEngine::rollup_by_date(&rows);
        assert_eq!(matrix.rows.len(), 2);
        assert_eq!(matrix.get(&GroupKey::Date(d(2025, 1, 6))).unwrap()[23], 1.0);
        assert_eq!(matrix.get(&GroupKey::Date(d(2025, 1, 7))).unwrap()[0], 1.0);
    }

    #[test]
    fn test_rollup_week_filters_by_week() {
        let records = vec![
            record((2025, 1, 30), (8, 0), (9, 0), 1), // Thursday, Week 5
            record((2025, 1, 2), (8, 0), (9, 0), 1),  // Thursday, Week 1
        ];
        let rows = Bucketizer::bucketize(&records, BucketMode::Presence);
        let matrix = RollupEngine::rollup_week(&rows, WeekOfMonth::Week5);
        assert_eq!(matrix.rows.len(), 7);
        assert_eq!(matrix.get(&GroupKey::Weekday(Weekday::Thu)).unwrap()[8], 1.0);
        assert_eq!(matrix.get(&GroupKey::Weekday(Weekday::Sun)).unwrap()[8], 0.0);
    }

    #[test]
    fn test_labelled_rollup_drops_noise() {
        let mut ones = [0.0; HOURS_PER_DAY];
        ones[3] = 1.0;
        let entries = vec![("Monday", &ones), ("Mon", &ones), ("Monday", &ones), ("", &ones)];
        let matrix = RollupEngine::rollup_labelled(entries, Dimension::Weekday);
        assert_eq!(matrix.rows.len(), 7);
        assert_eq!(matrix.get(&GroupKey::Weekday(Weekday::Mon)).unwrap()[3], 2.0);
        let total: f64 = matrix.rows.iter().map(|r| r.total(TotalMode::Sum)).sum();
        assert_eq!(total, 2.0);
    }

    #[test]
    fn test_weekly_total_forms() {
        let rows = Bucketizer::bucketize(
            &[record((2025, 1, 6), (0, 0), (0, 0), 1)],
            BucketMode::Presence,
        );
        // Full-day stay starting Monday midnight stays on Monday
        let totals = RollupEngine::weekly_total(&rows);
        assert_eq!(totals.len(), 7);
        assert_eq!(totals[1].weekday, Weekday::Mon);
        assert_eq!(totals[1].total, 24.0);

        let range = DateRange::new(d(2025, 1, 6), d(2025, 1, 19)).unwrap();
        let averaged = RollupEngine::weekly_total_with(&rows, TotalMode::AveragePerHour, Some(&range));
        assert!((averaged[1].total - 0.5).abs() < 1e-9);

        let single_day = DateRange::new(d(2025, 1, 6), d(2025, 1, 6)).unwrap();
        let averaged = RollupEngine::weekly_total_with(&rows, TotalMode::Sum, Some(&single_day));
        assert_eq!(averaged[0].total, 0.0);
    }

    #[test]
    fn test_monthly_summary_sums_counts() {
        let records = vec![
            record((2025, 2, 3), (8, 0), (9, 0), 2),
            record((2025, 1, 6), (8, 0), (9, 0), 1),
            record((2025, 1, 7), (8, 0), (9, 0), 4),
        ];
        let summary = RollupEngine::monthly_summary(&records);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].label, "Jan 25");
        assert_eq!(summary[0].count, 5);
        assert_eq!(summary[1].month.key(), "2025-02");
        assert_eq!(summary[1].count, 2);
    }

    #[test]
    fn test_week_count_summary_divides_and_rounds() {
        let records = vec![
            record((2025, 1, 6), (8, 0), (9, 0), 2),  // Monday, Week 1
            record((2025, 2, 3), (8, 0), (9, 0), 2),  // Monday, Week 1
            record((2025, 1, 13), (8, 0), (9, 0), 9), // Week 2, ignored
        ];
        let summary = RollupEngine::week_count_summary(&records, WeekOfMonth::Week1, 3.0);
        assert_eq!(summary[1].weekday, Weekday::Mon);
        assert_eq!(summary[1].count, 1); // 4 / 3 = 1.33
        assert!(summary.iter().filter(|c| c.weekday != Weekday::Mon).all(|c| c.count == 0));

        // 4 / 8 sits exactly on the half and rounds up, like the heatmap cells
        let summary = RollupEngine::week_count_summary(&records, WeekOfMonth::Week1, 8.0);
        assert_eq!(summary[1].count, 1);

        for divisor in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let summary = RollupEngine::week_count_summary(&records, WeekOfMonth::Week1, divisor);
            assert!(summary.iter().all(|c| c.count == 0), "divisor {divisor}");
        }
    }
}

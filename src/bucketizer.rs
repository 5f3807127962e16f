//! Hourly bucketization
//!
//! Distributes each interval across the 24 one-hour buckets of every calendar
//! date it touches.
//! - Presence: bucket gets the full count if the interval overlaps it at all
//! - Duration: bucket gets count × hours of true overlap (unrounded)
//!
//! A stay crossing midnight yields one row for its start date and one for each
//! following date it reaches, each row labelled with its own weekday and week
//! of month.

use crate::period;
use crate::types::{BucketMode, BucketizedRow, HourValues, IntervalRecord, HOURS_PER_DAY};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::debug;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Bucketizer for computing hourly contributions
pub struct Bucketizer;

impl Bucketizer {
    /// Bucketize every record in the given mode
    pub fn bucketize(records: &[IntervalRecord], mode: BucketMode) -> Vec<BucketizedRow> {
        let rows: Vec<BucketizedRow> = records
            .iter()
            .flat_map(|record| Self::bucketize_record(record, mode))
            .collect();

        debug!(
            records = records.len(),
            rows = rows.len(),
            mode = mode.as_str(),
            "bucketized records"
        );

        rows
    }

    /// One row per calendar date the record overlaps, in date order
    pub fn bucketize_record(record: &IntervalRecord, mode: BucketMode) -> Vec<BucketizedRow> {
        debug_assert!(record.end() > record.start(), "interval must end after start");

        record
            .date()
            .iter_days()
            .take_while(|day| *day <= record.last_day())
            .map(|day| BucketizedRow {
                record: record.clone(),
                date: day,
                weekday: period::weekday(day),
                week_of_month: period::week_of_month(day),
                mode,
                hours: day_buckets(record, day, mode),
            })
            .collect()
    }
}

/// Contributions of `record` to the 24 buckets of `day`
pub fn day_buckets(record: &IntervalRecord, day: NaiveDate, mode: BucketMode) -> HourValues {
    let mut hours = [0.0; HOURS_PER_DAY];
    let count = f64::from(record.count());

    for (h, value) in hours.iter_mut().enumerate() {
        let (bucket_start, bucket_end) = bucket_bounds(day, h);
        *value = match mode {
            BucketMode::Presence => {
                if record.start() < bucket_end && record.end() > bucket_start {
                    count
                } else {
                    0.0
                }
            }
            BucketMode::Duration => {
                count * overlap_seconds(record, bucket_start, bucket_end) / SECONDS_PER_HOUR
            }
        };
    }

    hours
}

/// `[h:00, h+1:00)` on `day`; bucket 23 ends at midnight of the next day
fn bucket_bounds(day: NaiveDate, hour: usize) -> (NaiveDateTime, NaiveDateTime) {
    let midnight = day.and_time(chrono::NaiveTime::MIN);
    let start = midnight + Duration::hours(hour as i64);
    (start, start + Duration::hours(1))
}

fn overlap_seconds(record: &IntervalRecord, start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    let from = record.start().max(start);
    let to = record.end().min(end);
    (to - from).num_seconds().max(0) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Weekday};
    use crate::types::WeekOfMonth;

    fn record(date: (i32, u32, u32), in_hm: (u32, u32), out_hm: (u32, u32), count: u32) -> IntervalRecord {
        IntervalRecord::new(
            NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            NaiveTime::from_hms_opt(in_hm.0, in_hm.1, 0).unwrap(),
            NaiveTime::from_hms_opt(out_hm.0, out_hm.1, 0).unwrap(),
            count,
        )
        .unwrap()
    }

    fn nonzero(hours: &HourValues) -> Vec<usize> {
        (0..HOURS_PER_DAY).filter(|h| hours[*h] != 0.0).collect()
    }

    #[test]
    fn test_presence_short_stay_marks_whole_bucket() {
        let rec = record((2025, 1, 6), (8, 10), (8, 50), 3);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Presence);
        assert_eq!(rows.len(), 1);
        assert_eq!(nonzero(&rows[0].hours), vec![8]);
        assert_eq!(rows[0].hours[8], 3.0);
    }

    #[test]
    fn test_presence_boundaries_are_half_open() {
        // 08:00-10:00 touches buckets 8 and 9 but not 10
        let rec = record((2025, 1, 6), (8, 0), (10, 0), 1);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Presence);
        assert_eq!(nonzero(&rows[0].hours), vec![8, 9]);
    }

    #[test]
    fn test_duration_conservation_within_day() {
        let rec = record((2025, 1, 6), (8, 10), (13, 25), 1);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Duration);
        assert_eq!(rows.len(), 1);
        let sum: f64 = rows[0].hours.iter().sum();
        assert!((sum - rec.duration_hours()).abs() < 1e-9);
        assert!((rows[0].hours[8] - 50.0 / 60.0).abs() < 1e-9);
        assert!((rows[0].hours[13] - 25.0 / 60.0).abs() < 1e-9);
        assert_eq!(rows[0].hours[9], 1.0);
    }

    #[test]
    fn test_duration_scaled_by_count() {
        let rec = record((2025, 1, 6), (10, 0), (10, 30), 4);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Duration);
        assert!((rows[0].hours[10] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_midnight_presence_splits_days() {
        let rec = record((2025, 1, 6), (23, 30), (0, 15), 2);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Presence);
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
        assert_eq!(rows[0].weekday, Weekday::Mon);
        assert_eq!(nonzero(&rows[0].hours), vec![23]);
        assert_eq!(rows[0].hours[23], 2.0);

        assert_eq!(rows[1].date, NaiveDate::from_ymd_opt(2025, 1, 7).unwrap());
        assert_eq!(rows[1].weekday, Weekday::Tue);
        assert_eq!(nonzero(&rows[1].hours), vec![0]);
        assert_eq!(rows[1].hours[0], 2.0);
    }

    #[test]
    fn test_cross_midnight_duration_conserves_total() {
        let rec = record((2025, 1, 31), (22, 0), (2, 30), 1);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Duration);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].week_of_month, WeekOfMonth::Week5);
        assert_eq!(rows[1].week_of_month, WeekOfMonth::Week1);
        let total: f64 = rows.iter().map(|r| r.total()).sum();
        assert!((total - 4.5).abs() < 1e-9);
        assert!((rows[1].hours[2] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_stay_ending_at_midnight_stays_on_one_day() {
        let rec = record((2025, 1, 6), (22, 0), (0, 0), 1);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Presence);
        assert_eq!(rows.len(), 1);
        assert_eq!(nonzero(&rows[0].hours), vec![22, 23]);
    }

    #[test]
    fn test_equal_times_cover_full_day_across_two_dates() {
        let rec = record((2025, 1, 6), (9, 0), (9, 0), 1);
        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Presence);
        assert_eq!(rows.len(), 2);
        assert_eq!(nonzero(&rows[0].hours), (9..24).collect::<Vec<_>>());
        assert_eq!(nonzero(&rows[1].hours), (0..9).collect::<Vec<_>>());

        let rows = Bucketizer::bucketize_record(&rec, BucketMode::Duration);
        let total: f64 = rows.iter().map(|r| r.total()).sum();
        assert!((total - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_bucketize_empty_input() {
        assert!(Bucketizer::bucketize(&[], BucketMode::Duration).is_empty());
    }
}

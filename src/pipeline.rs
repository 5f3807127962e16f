//! Pipeline orchestration
//!
//! This module provides the public API for Occupancy Flux.
//! It orchestrates the full pipeline from raw attendance rows to JSON output:
//! parse → bucketize → rollup → normalize → encode.

use crate::bucketizer::Bucketizer;
use crate::cache::{content_hash, CacheStats, MemoCache};
use crate::config::AnalysisConfig;
use crate::encoder::{EncodeContext, HeatmapEncoder};
use crate::error::ComputeError;
use crate::interval::IntervalParser;
use crate::normalizer::{Divisor, Normalizer, WeekNormalization};
use crate::rollup::RollupEngine;
use crate::types::{
    BucketMode, BucketizedRow, DateRange, Dimension, GroupKey, IntervalRecord, MonthlySummary,
    NormalizedMatrix, PayloadBody, RollupMatrix, TotalMode, WeekHeatmap, WeekOfMonth,
    WeekdayTotal,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Convert raw attendance rows to a normalized heatmap payload.
///
/// # Arguments
/// * `raw_json` - JSON array or NDJSON of `{"Date", "In Room", "Out Room", "Count"}` rows
/// * `mode` - Presence or duration bucketing
/// * `dimension` - Grouping dimension of the heatmap
///
/// Normalization uses the span of the data as the reference range.
///
/// # Example
/// ```ignore
/// let payload = rows_to_heatmap(rows_json, BucketMode::Presence, Dimension::Weekday)?;
/// ```
pub fn rows_to_heatmap(
    raw_json: String,
    mode: BucketMode,
    dimension: Dimension,
) -> Result<String, ComputeError> {
    let config = AnalysisConfig {
        mode,
        dimension,
        ..Default::default()
    };
    let mut processor = OccupancyProcessor::with_config(config)?;
    let records = processor.parse_records(&raw_json)?;
    processor.heatmap_json(&records)
}

/// Weekday × hour presence heatmap for raw attendance rows
pub fn presence_heatmap(raw_json: String) -> Result<String, ComputeError> {
    rows_to_heatmap(raw_json, BucketMode::Presence, Dimension::Weekday)
}

/// Weekday × hour duration heatmap for raw attendance rows
pub fn duration_heatmap(raw_json: String) -> Result<String, ComputeError> {
    rows_to_heatmap(raw_json, BucketMode::Duration, Dimension::Weekday)
}

#[derive(Serialize)]
struct CacheKey<'a> {
    stage: &'static str,
    records: &'a [IntervalRecord],
    mode: BucketMode,
    dimension: Option<Dimension>,
    date_range: Option<DateRange>,
    week_normalization: WeekNormalization,
}

/// Stateful processor holding configuration and memoized results.
///
/// Use this when the same records are analysed several ways; bucketized rows
/// and heatmaps are computed once per distinct input.
pub struct OccupancyProcessor {
    config: AnalysisConfig,
    bucket_cache: MemoCache<Vec<BucketizedRow>>,
    heatmap_cache: MemoCache<NormalizedMatrix>,
    encoder: HeatmapEncoder,
    pretty: bool,
}

impl Default for OccupancyProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl OccupancyProcessor {
    /// Create a new processor with default settings
    pub fn new() -> Self {
        Self::build(AnalysisConfig::default())
    }

    /// Create a processor with the given configuration
    pub fn with_config(config: AnalysisConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: AnalysisConfig) -> Self {
        Self {
            bucket_cache: MemoCache::new(config.cache_capacity),
            heatmap_cache: MemoCache::new(config.cache_capacity),
            encoder: HeatmapEncoder::new(),
            pretty: true,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Pretty-print encoded payloads (the default) or emit single-line JSON
    pub fn set_pretty_output(&mut self, pretty: bool) {
        self.pretty = pretty;
    }

    /// Combined statistics of the internal caches
    pub fn cache_stats(&self) -> CacheStats {
        let buckets = self.bucket_cache.stats();
        let heatmaps = self.heatmap_cache.stats();
        CacheStats {
            hits: buckets.hits + heatmaps.hits,
            misses: buckets.misses + heatmaps.misses,
            entries: buckets.entries + heatmaps.entries,
        }
    }

    pub fn clear_cache(&mut self) {
        self.bucket_cache.clear();
        self.heatmap_cache.clear();
    }

    /// Parse a JSON array or NDJSON of raw rows into records.
    /// Rows without both times are skipped.
    pub fn parse_records(&self, input: &str) -> Result<Vec<IntervalRecord>, ComputeError> {
        let rows = IntervalParser::parse_str(input)?;
        let parsed = IntervalParser::to_records(&rows)?;
        if !parsed.dropped.is_empty() {
            warn!(
                dropped = parsed.dropped.len(),
                "skipped rows without in/out time"
            );
        }
        Ok(parsed.records)
    }

    /// Configured range, or the span of the records' dates
    pub fn reference_range(&self, records: &[IntervalRecord]) -> Option<DateRange> {
        self.config
            .date_range
            .or_else(|| DateRange::covering(records))
    }

    /// Bucketized rows for all records in the configured mode
    pub fn bucketize(
        &mut self,
        records: &[IntervalRecord],
    ) -> Result<Vec<BucketizedRow>, ComputeError> {
        let key = self.cache_key("bucketize", records, None)?;
        let mode = self.config.mode;
        Ok(self
            .bucket_cache
            .get_or_insert_with(key, || Bucketizer::bucketize(records, mode)))
    }

    /// Rollup over `dimension`. With a configured range, rows outside it are
    /// excluded and month/date keys cover the whole range.
    pub fn rollup(
        &mut self,
        records: &[IntervalRecord],
        dimension: Dimension,
    ) -> Result<RollupMatrix, ComputeError> {
        let rows = self.bucketize(records)?;
        Ok(match self.config.date_range {
            Some(range) => RollupEngine::rollup_in_range(&rows, dimension, &range),
            None => RollupEngine::rollup(&rows, dimension),
        })
    }

    /// Divide a rollup by per-key occurrences in the reference range.
    /// Week-of-month rollups follow the configured week normalization.
    pub fn normalize(&self, rollup: &RollupMatrix, records: &[IntervalRecord]) -> NormalizedMatrix {
        if rollup.dimension == Dimension::WeekOfMonth {
            let divisor = self.config.week_normalization.week_divisor();
            return Normalizer::normalize_with(rollup, &divisor);
        }
        let divisor = match self.reference_range(records) {
            Some(range) => Divisor::CalendarRange(range),
            // No records and no configured range: every row is zero
            None => Divisor::ObservedDates(BTreeSet::new()),
        };
        Normalizer::normalize_with(rollup, &divisor)
    }

    /// Normalized heatmap over `dimension`
    pub fn heatmap(
        &mut self,
        records: &[IntervalRecord],
        dimension: Dimension,
    ) -> Result<NormalizedMatrix, ComputeError> {
        let key = self.cache_key("heatmap", records, Some(dimension))?;
        if let Some(matrix) = self.heatmap_cache.get(&key) {
            return Ok(matrix.clone());
        }

        let rollup = self.rollup(records, dimension)?;
        let matrix = self.normalize(&rollup, records);
        self.heatmap_cache.insert(key, matrix.clone());
        Ok(matrix)
    }

    /// Weekday × hour heatmap of one week of month, averaged per the
    /// configured week normalization
    pub fn week_heatmap(
        &mut self,
        records: &[IntervalRecord],
        week: WeekOfMonth,
    ) -> Result<WeekHeatmap, ComputeError> {
        let week_rows: Vec<BucketizedRow> = self
            .rows_in_range(records)?
            .into_iter()
            .filter(|r| r.week_of_month == week)
            .collect();

        let divisor = self.config.week_normalization.divisor(&week_rows);
        let divisor_value = divisor.for_key(&GroupKey::Week(week));
        let matrix = Normalizer::normalize_with(&RollupEngine::rollup_week(&week_rows, week), &divisor);
        let counts = RollupEngine::week_count_summary(
            &self.records_in_range(records),
            week,
            divisor_value,
        );

        debug!(
            week = week.label(),
            rows = week_rows.len(),
            divisor = divisor_value,
            "computed week heatmap"
        );

        Ok(WeekHeatmap {
            week,
            divisor: divisor_value,
            matrix,
            counts,
        })
    }

    /// Week heatmaps for Week 1..Week 5
    pub fn week_heatmaps(
        &mut self,
        records: &[IntervalRecord],
    ) -> Result<Vec<WeekHeatmap>, ComputeError> {
        WeekOfMonth::ALL
            .into_iter()
            .map(|week| self.week_heatmap(records, week))
            .collect()
    }

    /// Weekday totals in the configured form. The per-hour average is also
    /// divided by each weekday's occurrences in the reference range.
    pub fn weekly_total(
        &mut self,
        records: &[IntervalRecord],
    ) -> Result<Vec<WeekdayTotal>, ComputeError> {
        let rows = self.rows_in_range(records)?;
        Ok(match self.config.total_mode {
            TotalMode::Sum => RollupEngine::weekly_total_with(&rows, TotalMode::Sum, None),
            TotalMode::AveragePerHour => {
                let range = self.reference_range(records);
                RollupEngine::weekly_total_with(&rows, TotalMode::AveragePerHour, range.as_ref())
            }
        })
    }

    /// Record counts per month, restricted to the configured range
    pub fn monthly_summary(&self, records: &[IntervalRecord]) -> Vec<MonthlySummary> {
        RollupEngine::monthly_summary(&self.records_in_range(records))
    }

    /// Heatmap over the configured dimension, encoded as a JSON payload
    pub fn heatmap_json(&mut self, records: &[IntervalRecord]) -> Result<String, ComputeError> {
        let matrix = self.heatmap(records, self.config.dimension)?;
        self.encode(records, PayloadBody::Heatmap { matrix })
    }

    pub fn week_heatmaps_json(&mut self, records: &[IntervalRecord]) -> Result<String, ComputeError> {
        let weeks = self.week_heatmaps(records)?;
        self.encode(records, PayloadBody::WeekHeatmaps { weeks })
    }

    pub fn weekly_total_json(&mut self, records: &[IntervalRecord]) -> Result<String, ComputeError> {
        let totals = self.weekly_total(records)?;
        self.encode(
            records,
            PayloadBody::WeekdayTotals {
                total_mode: self.config.total_mode,
                totals,
            },
        )
    }

    pub fn monthly_summary_json(&self, records: &[IntervalRecord]) -> Result<String, ComputeError> {
        let months = self.monthly_summary(records);
        self.encode(records, PayloadBody::MonthlySummary { months })
    }

    /// Wrap `body` in a payload describing `records` and this configuration
    pub fn encode(
        &self,
        records: &[IntervalRecord],
        body: PayloadBody,
    ) -> Result<String, ComputeError> {
        let context = EncodeContext {
            records,
            mode: self.config.mode,
            date_range: self.reference_range(records),
        };
        if self.pretty {
            self.encoder.encode_to_json(&context, body)
        } else {
            self.encoder.encode_to_compact_json(&context, body)
        }
    }

    pub fn week_normalization(&self) -> WeekNormalization {
        self.config.week_normalization
    }

    fn rows_in_range(
        &mut self,
        records: &[IntervalRecord],
    ) -> Result<Vec<BucketizedRow>, ComputeError> {
        let rows = self.bucketize(records)?;
        Ok(match self.config.date_range {
            Some(range) => rows.into_iter().filter(|r| range.contains(r.date)).collect(),
            None => rows,
        })
    }

    fn records_in_range(&self, records: &[IntervalRecord]) -> Vec<IntervalRecord> {
        match self.config.date_range {
            Some(range) => records
                .iter()
                .filter(|r| range.contains(r.date()))
                .cloned()
                .collect(),
            None => records.to_vec(),
        }
    }

    fn cache_key(
        &self,
        stage: &'static str,
        records: &[IntervalRecord],
        dimension: Option<Dimension>,
    ) -> Result<String, ComputeError> {
        content_hash(&CacheKey {
            stage,
            records,
            mode: self.config.mode,
            dimension,
            date_range: self.config.date_range,
            week_normalization: self.config.week_normalization,
        })
    }
}

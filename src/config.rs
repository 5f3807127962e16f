//! Analysis configuration
//!
//! Settings that select between the variant behaviors of the pipeline (bucket
//! mode, total form, week normalization rule, date range). Loadable from TOML:
//!
//! ```toml
//! mode = "duration"
//! dimension = "weekday"
//! total_mode = "average_per_hour"
//! week_normalization = { fixed = 3.0 }
//! cache_capacity = 16
//!
//! [date_range]
//! start = "2025-01-01"
//! end = "2025-03-31"
//! ```

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::ComputeError;
use crate::normalizer::WeekNormalization;
use crate::types::{BucketMode, DateRange, Dimension, TotalMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub mode: BucketMode,
    pub dimension: Dimension,
    pub total_mode: TotalMode,
    pub week_normalization: WeekNormalization,
    /// Reference range for normalization; defaults to the span of the data
    pub date_range: Option<DateRange>,
    pub cache_capacity: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: BucketMode::Presence,
            dimension: Dimension::Weekday,
            total_mode: TotalMode::Sum,
            week_normalization: WeekNormalization::DistinctMonths,
            date_range: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ComputeError> {
        let config: AnalysisConfig =
            toml::from_str(content).map_err(|e| ComputeError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ComputeError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ComputeError> {
        toml::to_string(self).map_err(|e| ComputeError::ConfigError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if let Some(range) = self.date_range {
            DateRange::new(range.start, range.end)?;
        }
        if let WeekNormalization::Fixed(value) = self.week_normalization {
            if !(value.is_finite() && value > 0.0) {
                return Err(ComputeError::ConfigError(format!(
                    "week_normalization divisor must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_full_document() {
        let config = AnalysisConfig::from_toml_str(
            r#"
            mode = "duration"
            dimension = "week_of_month"
            total_mode = "average_per_hour"
            week_normalization = { fixed = 3.0 }
            cache_capacity = 8

            [date_range]
            start = "2025-01-01"
            end = "2025-03-31"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, BucketMode::Duration);
        assert_eq!(config.dimension, Dimension::WeekOfMonth);
        assert_eq!(config.total_mode, TotalMode::AveragePerHour);
        assert_eq!(config.week_normalization, WeekNormalization::Fixed(3.0));
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(
            config.date_range.unwrap().end,
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );
    }

    #[test]
    fn test_inverted_range_rejected() {
        let result = AnalysisConfig::from_toml_str(
            r#"
            [date_range]
            start = "2025-03-01"
            end = "2025-01-01"
            "#,
        );
        assert!(matches!(result, Err(ComputeError::InvalidDateRange { .. })));
    }

    #[test]
    fn test_non_positive_week_divisor_rejected() {
        let result = AnalysisConfig::from_toml_str("week_normalization = { fixed = 0.0 }");
        assert!(matches!(result, Err(ComputeError::ConfigError(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = AnalysisConfig::from_toml_str("modee = \"presence\"");
        assert!(matches!(result, Err(ComputeError::ConfigError(_))));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = AnalysisConfig {
            mode: BucketMode::Duration,
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(AnalysisConfig::from_toml_str(&text).unwrap(), config);
    }
}

//! Occupancy Flux - hourly occupancy and duration-of-stay aggregation
//!
//! Flux turns attendance intervals (date, in-time, out-time, headcount) into
//! hour-of-day heatmaps through a deterministic pipeline: interval parsing →
//! hourly bucketization → grouping/rollup → normalization → payload encoding.
//!
//! ## Modes
//!
//! - **Presence**: a stay counts fully in every hour it touches
//! - **Duration**: a stay contributes the fraction of each hour it covers

pub mod bucketizer;
pub mod cache;
pub mod config;
pub mod encoder;
pub mod error;
pub mod interval;
pub mod normalizer;
pub mod period;
pub mod pipeline;
pub mod rollup;
pub mod types;

pub use bucketizer::Bucketizer;
pub use config::AnalysisConfig;
pub use error::ComputeError;
pub use interval::IntervalParser;
pub use normalizer::{Divisor, Normalizer, WeekNormalization};
pub use pipeline::{duration_heatmap, presence_heatmap, rows_to_heatmap, OccupancyProcessor};
pub use rollup::RollupEngine;
pub use types::{BucketMode, DateRange, Dimension, GroupKey, IntervalRecord, TotalMode};

/// Flux version embedded in all payloads
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for payloads
pub const PRODUCER_NAME: &str = "occupancy-flux";

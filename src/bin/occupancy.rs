//! Occupancy CLI - Command-line interface for Occupancy Flux
//!
//! Commands:
//! - heatmap: Normalized hour-of-day heatmap over one grouping dimension
//! - weeks: Weekday heatmaps for each week of the month
//! - totals: Per-weekday totals
//! - monthly: Record counts per month
//! - validate: Check input rows without computing anything
//! - doctor: Diagnose configuration and environment

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chrono::NaiveDate;
use occupancy_flux::config::AnalysisConfig;
use occupancy_flux::interval::{parse_date, IntervalParser};
use occupancy_flux::normalizer::WeekNormalization;
use occupancy_flux::pipeline::OccupancyProcessor;
use occupancy_flux::types::{
    BucketMode, DateRange, Dimension, IntervalRecord, PayloadBody, TotalMode, WeekOfMonth,
};
use occupancy_flux::{ComputeError, FLUX_VERSION, PRODUCER_NAME};

/// Occupancy - hourly occupancy and duration-of-stay heatmaps
#[derive(Parser)]
#[command(name = "occupancy")]
#[command(version = FLUX_VERSION)]
#[command(about = "Aggregate attendance intervals into hourly heatmaps", long_about = None)]
struct Cli {
    /// Log pipeline stages to stderr (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalized heatmap over one grouping dimension
    Heatmap {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Grouping dimension (overrides config)
        #[arg(long)]
        dimension: Option<DimensionArg>,
    },

    /// Weekday heatmaps for Week 1..Week 5 of the month
    Weeks {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Only this week of month (1-5); all five by default
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        week: Option<u8>,

        /// Divide week sums by this constant instead of the number of months
        #[arg(long)]
        fixed_divisor: Option<f64>,
    },

    /// Per-weekday totals
    Totals {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Report totals divided by 24 and by each weekday's day count
        #[arg(long)]
        average_per_hour: bool,
    },

    /// Sum of record counts per month
    Monthly {
        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Validate input rows
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct AnalysisArgs {
    /// Input file path (use - for stdin); JSON array or NDJSON rows
    #[arg(short, long)]
    input: PathBuf,

    /// Output file path (use - for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// TOML analysis config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bucketing mode (overrides config)
    #[arg(long)]
    mode: Option<ModeArg>,

    /// First date of the reference range (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date_arg, requires = "end")]
    start: Option<NaiveDate>,

    /// Last date of the reference range (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date_arg, requires = "start")]
    end: Option<NaiveDate>,

    /// Output format
    #[arg(long, default_value = "json-pretty")]
    output_format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Full count in every hour the stay touches
    Presence,
    /// Count times the hours actually spent in each bucket
    Duration,
}

impl From<ModeArg> for BucketMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Presence => BucketMode::Presence,
            ModeArg::Duration => BucketMode::Duration,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DimensionArg {
    /// Sunday..Saturday
    Weekday,
    /// Week 1..Week 5 of the month
    WeekOfMonth,
    /// Calendar month
    Month,
    /// Calendar date
    Date,
}

impl From<DimensionArg> for Dimension {
    fn from(dimension: DimensionArg) -> Self {
        match dimension {
            DimensionArg::Weekday => Dimension::Weekday,
            DimensionArg::WeekOfMonth => Dimension::WeekOfMonth,
            DimensionArg::Month => Dimension::Month,
            DimensionArg::Date => Dimension::Date,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays a clean JSON stream; `RUST_LOG` overrides
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<(), OccupancyCliError> {
    match cli.command {
        Commands::Heatmap {
            analysis,
            dimension,
        } => {
            let mut config = load_config(&analysis)?;
            if let Some(dimension) = dimension {
                config.dimension = dimension.into();
            }
            run_analysis(&analysis, config, |processor, records| {
                processor.heatmap_json(records)
            })
        }

        Commands::Weeks {
            analysis,
            week,
            fixed_divisor,
        } => {
            let mut config = load_config(&analysis)?;
            if let Some(divisor) = fixed_divisor {
                config.week_normalization = WeekNormalization::Fixed(divisor);
            }
            match week.and_then(WeekOfMonth::from_number) {
                Some(week) => run_analysis(&analysis, config, |processor, records| {
                    let heatmap = processor.week_heatmap(records, week)?;
                    processor.encode(
                        records,
                        PayloadBody::WeekHeatmaps {
                            weeks: vec![heatmap],
                        },
                    )
                }),
                None => run_analysis(&analysis, config, |processor, records| {
                    processor.week_heatmaps_json(records)
                }),
            }
        }

        Commands::Totals {
            analysis,
            average_per_hour,
        } => {
            let mut config = load_config(&analysis)?;
            if average_per_hour {
                config.total_mode = TotalMode::AveragePerHour;
            }
            run_analysis(&analysis, config, |processor, records| {
                processor.weekly_total_json(records)
            })
        }

        Commands::Monthly { analysis } => {
            let config = load_config(&analysis)?;
            run_analysis(&analysis, config, |processor, records| {
                processor.monthly_summary_json(records)
            })
        }

        Commands::Validate { input, json } => cmd_validate(&input, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(args: &AnalysisArgs) -> Result<AnalysisConfig, OccupancyCliError> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_file(path)?,
        None => AnalysisConfig::default(),
    };

    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if let (Some(start), Some(end)) = (args.start, args.end) {
        config.date_range = Some(DateRange::new(start, end)?);
    }

    Ok(config)
}

fn run_analysis<F>(
    args: &AnalysisArgs,
    config: AnalysisConfig,
    compute: F,
) -> Result<(), OccupancyCliError>
where
    F: FnOnce(&mut OccupancyProcessor, &[IntervalRecord]) -> Result<String, ComputeError>,
{
    let input_data = read_input(&args.input)?;
    let mut processor = OccupancyProcessor::with_config(config)?;
    processor.set_pretty_output(matches!(args.output_format, OutputFormat::JsonPretty));
    let records = processor.parse_records(&input_data)?;

    if records.is_empty() {
        return Err(OccupancyCliError::NoRecords);
    }

    info!(records = records.len(), "loaded records");

    let output_data = compute(&mut processor, &records)?;

    if args.output.to_string_lossy() == "-" {
        println!("{}", output_data);
    } else {
        fs::write(&args.output, output_data)?;
    }

    Ok(())
}

fn cmd_validate(input: &Path, json: bool) -> Result<(), OccupancyCliError> {
    let input_data = read_input(input)?;
    let rows = IntervalParser::parse_str(&input_data)?;

    let errors = IntervalParser::validate_rows(&rows);
    let without_times = rows
        .iter()
        .filter(|row| matches!(IntervalParser::parse_row(row), Ok(None)))
        .count();

    let report = ValidationReport {
        total_rows: rows.len(),
        valid_rows: rows.len() - errors.len() - without_times,
        skipped_rows: without_times,
        invalid_rows: errors.len(),
        errors: errors
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                date: rows.get(r.index).map(|row| row.date.clone()),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total rows:   {}", report.total_rows);
        println!("Valid rows:   {}", report.valid_rows);
        println!("Skipped rows: {} (missing in/out time)", report.skipped_rows);
        println!("Invalid rows: {}", report.invalid_rows);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Row {} ({}): {}",
                    err.index,
                    err.date.as_deref().unwrap_or("unknown"),
                    err.error
                );
            }
        }
    }

    if report.invalid_rows > 0 {
        Err(OccupancyCliError::ValidationFailed(report.invalid_rows))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), OccupancyCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "flux_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Occupancy Flux version {}", FLUX_VERSION),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            match AnalysisConfig::from_file(config_path) {
                Ok(config) => {
                    let range = config
                        .date_range
                        .map(|r| format!("{} to {}", r.start, r.end))
                        .unwrap_or_else(|| "span of the data".to_string());
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid (mode {}, dimension {}, range {})",
                            config.mode.as_str(),
                            config.dimension.as_str(),
                            range
                        ),
                    });
                    if config.cache_capacity == 0 {
                        checks.push(DoctorCheck {
                            name: "cache".to_string(),
                            status: CheckStatus::Warning,
                            message: "cache_capacity is 0, results will not be memoized"
                                .to_string(),
                        });
                    }
                }
                Err(e) => {
                    checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: e.to_string(),
                    });
                }
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            });
        }
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass rows with --input <file>)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Occupancy Doctor Report");
        println!("=======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(OccupancyCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, OccupancyCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).map_err(|e| e.to_string())
}

// Error types

#[derive(Debug)]
enum OccupancyCliError {
    Io(io::Error),
    Compute(ComputeError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for OccupancyCliError {
    fn from(e: io::Error) -> Self {
        OccupancyCliError::Io(e)
    }
}

impl From<ComputeError> for OccupancyCliError {
    fn from(e: ComputeError) -> Self {
        OccupancyCliError::Compute(e)
    }
}

impl From<serde_json::Error> for OccupancyCliError {
    fn from(e: serde_json::Error) -> Self {
        OccupancyCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<OccupancyCliError> for CliError {
    fn from(e: OccupancyCliError) -> Self {
        match e {
            OccupancyCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            OccupancyCliError::Compute(e) => {
                let (code, hint) = match &e {
                    ComputeError::ConfigError(_) | ComputeError::InvalidDateRange { .. } => {
                        ("CONFIG_ERROR", "Check the config file and --start/--end")
                    }
                    ComputeError::JsonError(_) | ComputeError::ParseError(_) => (
                        "PARSE_ERROR",
                        "Input must be a JSON array or NDJSON of Date/In Room/Out Room/Count rows",
                    ),
                    _ => ("INVALID_ROW", "Run 'occupancy validate' for details"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            OccupancyCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            OccupancyCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No rows with both in and out times found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            OccupancyCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} rows failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            OccupancyCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_rows: usize,
    valid_rows: usize,
    skipped_rows: usize,
    invalid_rows: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    date: Option<String>,
    error: String,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

//! Harvest forecast CLI
//!
//! Forecasts the harvest date, growth days and yield of one stored
//! cultivation cycle, reading history from a JSON snapshot.

mod commands;
mod output;

use clap::Parser;
use commands::predict::{forecast_cycle, PredictArgs};
use forecast_lib::{ArtifactPaths, PartialHarvest, StructuredLogger};
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Harvest forecast for a single cultivation cycle
#[derive(Parser)]
#[command(name = "harvest-predict")]
#[command(author, version, about = "Forecast harvest date and yield for a cultivation cycle", long_about = None)]
pub struct Cli {
    /// Cycle to forecast
    #[arg(long)]
    pub cycle_id: i64,

    /// Blend a partial-harvest estimate into the yield
    #[arg(long)]
    pub apply_partial: bool,

    /// Weight harvested so far
    #[arg(long)]
    pub partial_yield: Option<f64>,

    /// Fraction of the crop harvested so far
    #[arg(long)]
    pub partial_ratio: Option<f64>,

    /// Cycle snapshot with cycles, harvests and weather
    #[arg(long, env = "FORECAST_DATA_PATH")]
    pub data: PathBuf,

    /// Days model artifact
    #[arg(long, env = "FORECAST_MODEL_PATH_DAYS")]
    pub model_days: Option<PathBuf>,

    /// Yield model artifact
    #[arg(long, env = "FORECAST_MODEL_PATH_YIELD")]
    pub model_yield: Option<PathBuf>,

    /// Preprocessor artifact
    #[arg(long, env = "FORECAST_PREPROC_PATH")]
    pub preproc: Option<PathBuf>,

    /// Feature metadata file
    #[arg(long, env = "FORECAST_FEATURE_META_PATH")]
    pub feature_meta: Option<PathBuf>,

    /// Features that must be present (comma-separated)
    #[arg(long, env = "FORECAST_REQUIRED_FEATURES", value_delimiter = ',')]
    pub required_features: Vec<String>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Enable verbose logging on stderr
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    fn predict_args(&self) -> PredictArgs {
        PredictArgs {
            cycle_id: self.cycle_id,
            data: self.data.clone(),
            paths: ArtifactPaths {
                days_model: self.model_days.clone(),
                yield_model: self.model_yield.clone(),
                preprocessor: self.preproc.clone(),
                feature_meta: self.feature_meta.clone(),
                required_features: self
                    .required_features
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            partial: PartialHarvest {
                apply: self.apply_partial,
                partial_yield: self.partial_yield,
                partial_ratio: self.partial_ratio,
            },
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let logger = StructuredLogger::new("harvest-predict");
    let outcome =
        forecast_cycle(&cli.predict_args(), &logger).and_then(|f| output::print_forecast(&f, cli.format));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e), cli.format);
            ExitCode::FAILURE
        }
    }
}

//! CLI entry point for the bike-share demand forecaster.
//!
//! Provides subcommands for the full model evaluation, a dataset summary,
//! and a daily breakdown of rides by weather condition.

use anyhow::Result;
use bikeshare_forecast::config::PipelineConfig;
use bikeshare_forecast::output::{
    print_metrics, write_conditions, write_dataset_summary, write_evaluation,
};
use bikeshare_forecast::pipeline::run_evaluation;
use bikeshare_forecast::summary::{daily_conditions, dataset_summary};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bikeshare_forecast")]
#[command(
    about = "Forecast hourly bike-share demand from weather and calendar features",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Directory of hourly weather CSV files
    #[arg(long)]
    weather_dir: Option<PathBuf>,

    /// Root of the trip CSV tree
    #[arg(long)]
    trips_dir: Option<PathBuf>,

    /// Directory to write artifacts to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl SourceArgs {
    fn resolve(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(dir) = self.weather_dir {
            config.weather_dir = dir;
        }
        if let Some(dir) = self.trips_dir {
            config.trips_dir = dir;
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train and evaluate every enabled model, writing metrics and prediction traces
    Evaluate {
        #[command(flatten)]
        sources: SourceArgs,

        /// Override the random seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Summarise the trip dataset by day
    Summary {
        #[command(flatten)]
        sources: SourceArgs,
    },
    /// Average daily rides by rain and temperature condition
    Conditions {
        #[command(flatten)]
        sources: SourceArgs,

        /// Temperature (°C) at or above which a day counts as warm
        #[arg(long)]
        warm_threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/bikeshare_forecast.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare_forecast.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate { sources, seed } => {
            let mut config = sources.resolve()?;
            if let Some(seed) = seed {
                config.seed = seed;
            }

            let run = run_evaluation(&config).await?;
            print_metrics(&run.results)?;
            for (model, (r2, cv_mean)) in run.scoreboard() {
                info!(model, r2, cv_mean, "Score");
            }
            write_evaluation(&config.output_dir, &run)?;
        }
        Commands::Summary { sources } => {
            let config = sources.resolve()?;
            let summary = dataset_summary(&config).await?;
            for (metric, value) in summary.metrics() {
                info!(metric, value = %value, "Dataset summary");
            }
            write_dataset_summary(&config.output_dir, &summary)?;
        }
        Commands::Conditions {
            sources,
            warm_threshold,
        } => {
            let mut config = sources.resolve()?;
            if let Some(threshold) = warm_threshold {
                config.warm_threshold = threshold;
            }
            let rows = daily_conditions(&config).await?;
            write_conditions(&config.output_dir, &rows)?;
        }
    }

    Ok(())
}

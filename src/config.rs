//! Run configuration.
//!
//! Every tunable the pipeline uses lives in [`PipelineConfig`]. It is stored
//! as a plain JSON object on disk and every field is optional:
//! ```json
//! {
//!   "interval": "hourly",
//!   "train_fraction": 0.8,
//!   "outlier_passes": [
//!     { "column": "ride_count", "multiplier": 1.5 },
//!     { "column": "wind", "multiplier": 1.0 }
//!   ]
//! }
//! ```
//! Command-line flags are applied on top of the file afterwards.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::align::IntervalWidth;
use crate::error::PipelineError;
use crate::models::ModelsConfig;
use crate::outlier::{OutlierPass, TrimColumn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the weather `*.csv` files (not searched recursively).
    pub weather_dir: PathBuf,
    /// Root of the trip file tree (searched recursively).
    pub trips_dir: PathBuf,
    /// Where evaluation artifacts are written.
    pub output_dir: PathBuf,

    /// Bucket width used to align rides and weather.
    pub interval: IntervalWidth,
    /// Numeric codes the weather source uses for "no reading".
    pub sentinel_values: Vec<f64>,

    /// Trip files must end with this suffix.
    pub trip_file_suffix: String,
    /// Files starting with any of these prefixes are metadata artifacts.
    pub skip_file_prefixes: Vec<String>,
    /// Directories with these names are never descended into.
    pub skip_dir_names: Vec<String>,

    /// Inclusive date range applied to the merged dataset.
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,

    /// IQR trims, applied in order; each pass sees only the rows the previous kept.
    pub outlier_passes: Vec<OutlierPass>,
    /// Share of rows (oldest first) used for training.
    pub train_fraction: f64,
    /// Number of forward-chaining cross-validation folds.
    pub cv_splits: usize,
    /// Seed for every stochastic model component.
    pub seed: u64,
    /// Maximum number of trip files parsed at once.
    pub concurrency: usize,

    pub models: ModelsConfig,

    /// Plausible trip duration range, used by duration-derived summaries.
    pub duration: DurationBounds,
    /// Temperature (°C) separating cool from warm days in the condition summary.
    pub warm_threshold: f64,
}

/// Inclusive trip duration bounds in minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DurationBounds {
    pub min_minutes: f64,
    pub max_minutes: f64,
}

impl Default for DurationBounds {
    fn default() -> Self {
        Self {
            min_minutes: 1.0,
            max_minutes: 1440.0,
        }
    }
}

impl DurationBounds {
    pub fn contains(&self, minutes: f64) -> bool {
        minutes >= self.min_minutes && minutes <= self.max_minutes
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            weather_dir: PathBuf::from("data/weather_raw"),
            trips_dir: PathBuf::from("data/bikes_raw"),
            output_dir: PathBuf::from("output/evaluation_results"),
            interval: IntervalWidth::Hourly,
            sentinel_values: vec![-999.0, -9999.0],
            trip_file_suffix: "-divvy-tripdata.csv".to_string(),
            skip_file_prefixes: vec!["._".to_string()],
            skip_dir_names: vec!["__MACOSX".to_string()],
            date_start: None,
            date_end: None,
            outlier_passes: vec![OutlierPass {
                column: TrimColumn::RideCount,
                multiplier: 1.5,
            }],
            train_fraction: 0.8,
            cv_splits: 5,
            seed: 42,
            concurrency: 4,
            models: ModelsConfig::default(),
            duration: DurationBounds::default(),
            warm_threshold: 15.0,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`. Missing keys take their defaults.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file '{path}'"))?;
        Ok(config)
    }

    /// Rejects values no stage can work with.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return invalid(format!(
                "train_fraction must lie strictly between 0 and 1, got {}",
                self.train_fraction
            ));
        }
        if self.cv_splits < 2 {
            return invalid(format!("cv_splits must be at least 2, got {}", self.cv_splits));
        }
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1".to_string());
        }
        if let Some(pass) = self
            .outlier_passes
            .iter()
            .find(|p| !(p.multiplier.is_finite() && p.multiplier >= 0.0))
        {
            return invalid(format!(
                "outlier multiplier for {} must be a non-negative number, got {}",
                pass.column.name(),
                pass.multiplier
            ));
        }
        if let (Some(start), Some(end)) = (self.date_start, self.date_end) {
            if start > end {
                return invalid(format!("date_start {start} is after date_end {end}"));
            }
        }
        if self.duration.min_minutes > self.duration.max_minutes {
            return invalid(format!(
                "duration bounds are inverted: {} > {}",
                self.duration.min_minutes, self.duration.max_minutes
            ));
        }
        self.models.validate()
    }
}

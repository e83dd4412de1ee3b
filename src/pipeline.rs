//! End-to-end orchestration: load → align → derive → trim → evaluate.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::align::{self, AlignedSeries, IntervalWidth, RideCountLoad, WeatherSeries};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::evaluate::{EvaluationPlan, EvaluationResult, evaluate_all};
use crate::features::{self, FeatureVector};
use crate::loader::weather::{WeatherLoad, load_weather};
use crate::loader::{DropCounts, SourceFilter, TripRequirement, discover_files};
use crate::outlier::{PassReport, apply_passes};
use crate::split::split_index;

/// Row and drop counts at every stage, written to `run_summary.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub interval: IntervalWidth,
    pub weather_files: usize,
    pub trip_files: usize,
    pub weather_files_skipped: DropCounts,
    pub trip_files_skipped: DropCounts,
    pub weather_observations: usize,
    pub trips: u64,
    pub weather_drops: DropCounts,
    pub trip_drops: DropCounts,
    pub weather_duplicates: usize,
    pub ride_intervals: usize,
    pub weather_intervals: usize,
    pub merged_intervals: usize,
    pub ride_only_intervals: usize,
    pub weather_only_intervals: usize,
    pub incomplete_intervals: usize,
    pub zero_filled_intervals: usize,
    pub outside_date_range: usize,
    pub outlier_passes: Vec<PassReport>,
    pub rows_after_outliers: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Both sources, loaded and put on the same interval grid.
pub struct MergedSources {
    pub weather: WeatherLoad,
    pub weather_series: WeatherSeries,
    pub rides: RideCountLoad,
    /// Trip-tree entries passed over by name.
    pub trip_files_skipped: DropCounts,
    pub aligned: AlignedSeries,
    /// Joined intervals removed by the configured date range.
    pub outside_date_range: usize,
}

/// Loads trips and weather at `width` and inner-joins them.
#[tracing::instrument(skip(config))]
pub async fn load_and_align(
    config: &PipelineConfig,
    width: IntervalWidth,
    requirement: TripRequirement,
) -> Result<MergedSources> {
    let weather = load_weather(
        &config.weather_dir,
        &SourceFilter::weather(config),
        &config.sentinel_values,
    )?;
    let trip_files = discover_files(&config.trips_dir, &SourceFilter::trips(config), true)?;
    if trip_files.files.is_empty() {
        warn!(dir = %config.trips_dir.display(), "No trip files found");
    }
    let rides =
        align::load_ride_counts(trip_files.files, width, requirement, config.concurrency).await?;

    let weather_series = align::resample_weather(&weather.observations, width);
    let mut aligned = align::align(&rides.counts, &weather_series, width);
    let outside = align::restrict_dates(&mut aligned.buckets, config.date_start, config.date_end);
    if outside > 0 {
        info!(removed = outside, "Dropped intervals outside the date range");
    }

    Ok(MergedSources {
        weather,
        weather_series,
        rides,
        trip_files_skipped: trip_files.skipped,
        aligned,
        outside_date_range: outside,
    })
}

/// The training table plus the bookkeeping that produced it.
pub struct PreparedData {
    pub rows: Vec<FeatureVector>,
    pub summary: RunSummary,
}

/// Builds the feature table the models train on, failing if no rows survive.
pub async fn prepare(config: &PipelineConfig) -> Result<PreparedData> {
    config.validate()?;
    let merged = load_and_align(config, config.interval, TripRequirement::StartOnly).await?;

    let mut weather_drops = merged.weather.drops.clone();
    weather_drops.add("conflicting_observations", merged.weather_series.conflicts);

    let mut summary = RunSummary {
        interval: config.interval,
        weather_files: merged.weather.files,
        trip_files: merged.rides.files,
        weather_files_skipped: merged.weather.skipped_files.clone(),
        trip_files_skipped: merged.trip_files_skipped.clone(),
        weather_observations: merged.weather.observations.len(),
        trips: merged.rides.trips,
        weather_drops,
        trip_drops: merged.rides.drops.clone(),
        weather_duplicates: merged.weather_series.duplicates,
        ride_intervals: merged.rides.counts.len(),
        weather_intervals: merged.weather_series.values.len(),
        merged_intervals: merged.aligned.buckets.len(),
        ride_only_intervals: merged.aligned.ride_only,
        weather_only_intervals: merged.aligned.weather_only,
        incomplete_intervals: merged.aligned.incomplete,
        zero_filled_intervals: merged.aligned.zero_filled,
        outside_date_range: merged.outside_date_range,
        ..Default::default()
    };

    if merged.aligned.buckets.is_empty() {
        return Err(PipelineError::EmptyResult("alignment".to_string()).into());
    }

    let derived = features::derive_all(&merged.aligned.buckets);
    let (rows, reports) = apply_passes(derived, &config.outlier_passes);
    summary.outlier_passes = reports;
    summary.rows_after_outliers = rows.len();
    if rows.is_empty() {
        return Err(PipelineError::EmptyResult("outlier filtering".to_string()).into());
    }

    summary.train_rows = split_index(rows.len(), config.train_fraction);
    summary.test_rows = rows.len() - summary.train_rows;
    Ok(PreparedData { rows, summary })
}

pub struct EvaluationRun {
    pub summary: RunSummary,
    pub results: Vec<EvaluationResult>,
}

impl EvaluationRun {
    /// Model name → (R², CV mean) for quick comparison in logs.
    pub fn scoreboard(&self) -> BTreeMap<&'static str, (f64, f64)> {
        self.results
            .iter()
            .map(|r| (r.model.name(), (r.r2, r.cv.mean)))
            .collect()
    }
}

/// Runs the full pipeline for every enabled model.
#[tracing::instrument(skip(config))]
pub async fn run_evaluation(config: &PipelineConfig) -> Result<EvaluationRun> {
    let prepared = prepare(config).await?;
    let plan = EvaluationPlan {
        models: &config.models,
        train_fraction: config.train_fraction,
        cv_splits: config.cv_splits,
        seed: config.seed,
    };

    let rows = prepared.rows;
    let results = evaluate_all(&plan, &rows)?;

    info!(
        models = results.len(),
        rows = prepared.summary.rows_after_outliers,
        train = prepared.summary.train_rows,
        test = prepared.summary.test_rows,
        "Evaluation finished"
    );
    Ok(EvaluationRun {
        summary: prepared.summary,
        results,
    })
}

//! Daily descriptive summaries built from the same loaders and aligner.

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::align::{IntervalBucket, IntervalCounts, IntervalWidth, load_ride_counts};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::loader::{SourceFilter, TripRequirement, discover_files};
use crate::outlier::iqr_band;
use crate::pipeline::load_and_align;

const DAILY_IQR_FACTOR: f64 = 1.5;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub total_files: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_covered: usize,
    pub total_rides: u64,
    pub avg_rides_per_day: f64,
    pub avg_rides_per_hour: f64,
}

impl DatasetSummary {
    /// `metric,value` rows in report order.
    pub fn metrics(&self) -> Vec<(&'static str, String)> {
        vec![
            ("total_files", self.total_files.to_string()),
            ("start_date", self.start_date.format("%Y-%m-%d").to_string()),
            ("end_date", self.end_date.format("%Y-%m-%d").to_string()),
            ("days_covered", self.days_covered.to_string()),
            ("total_rides", self.total_rides.to_string()),
            ("avg_rides_per_day", self.avg_rides_per_day.to_string()),
            ("avg_rides_per_hour", self.avg_rides_per_hour.to_string()),
        ]
    }
}

/// Summarises daily ride counts after trimming days outside the 1.5·IQR band.
pub fn summarize_daily_counts(
    daily: &IntervalCounts,
    total_files: usize,
) -> Result<DatasetSummary, PipelineError> {
    let filled = daily.filled(IntervalWidth::Daily);
    let values: Vec<f64> = filled.iter().map(|(_, c)| c as f64).collect();
    let band = iqr_band(&values, DAILY_IQR_FACTOR)
        .ok_or_else(|| PipelineError::EmptyResult("dataset summary".to_string()))?;

    let kept: Vec<(NaiveDate, u64)> = filled
        .iter()
        .filter(|(_, c)| band.contains(*c as f64))
        .map(|(day, c)| (day.date(), c))
        .collect();
    let (Some(first), Some(last)) = (kept.first(), kept.last()) else {
        return Err(PipelineError::EmptyResult("dataset summary".to_string()));
    };

    let total_rides: u64 = kept.iter().map(|(_, c)| c).sum();
    let per_day = total_rides as f64 / kept.len() as f64;
    Ok(DatasetSummary {
        total_files,
        start_date: first.0,
        end_date: last.0,
        days_covered: kept.len(),
        total_rides,
        avg_rides_per_day: round2(per_day),
        avg_rides_per_hour: round2(per_day / 24.0),
    })
}

/// Loads trips with a plausible duration and summarises their daily counts.
#[tracing::instrument(skip(config))]
pub async fn dataset_summary(config: &PipelineConfig) -> Result<DatasetSummary> {
    config.validate()?;
    let found = discover_files(&config.trips_dir, &SourceFilter::trips(config), true)?;
    let total_files = found.files.len();
    let load = load_ride_counts(
        found.files,
        IntervalWidth::Daily,
        TripRequirement::Duration(config.duration),
        config.concurrency,
    )
    .await?;

    let summary = summarize_daily_counts(&load.counts, total_files)?;
    info!(
        days = summary.days_covered,
        rides = summary.total_rides,
        avg_per_day = summary.avg_rides_per_day,
        "Dataset summary computed"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    RainCool,
    DryCool,
    RainWarm,
    DryWarm,
}

impl Condition {
    pub const ALL: [Condition; 4] = [
        Condition::RainCool,
        Condition::DryCool,
        Condition::RainWarm,
        Condition::DryWarm,
    ];

    pub fn classify(temperature: f64, precipitation: f64, warm_threshold: f64) -> Self {
        match (temperature >= warm_threshold, precipitation > 0.0) {
            (false, true) => Condition::RainCool,
            (false, false) => Condition::DryCool,
            (true, true) => Condition::RainWarm,
            (true, false) => Condition::DryWarm,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Condition::RainCool => "rain_cool",
            Condition::DryCool => "dry_cool",
            Condition::RainWarm => "rain_warm",
            Condition::DryWarm => "dry_warm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionRow {
    pub condition: &'static str,
    pub days: usize,
    pub avg_rides: Option<f64>,
}

/// Average daily rides per condition, every condition present in fixed order.
pub fn condition_summary(days: &[IntervalBucket], warm_threshold: f64) -> Vec<ConditionRow> {
    Condition::ALL
        .iter()
        .map(|condition| {
            let rides: Vec<u64> = days
                .iter()
                .filter(|d| {
                    Condition::classify(
                        d.weather.temperature,
                        d.weather.precipitation,
                        warm_threshold,
                    ) == *condition
                })
                .map(|d| d.ride_count)
                .collect();
            let avg_rides = (!rides.is_empty())
                .then(|| round2(rides.iter().sum::<u64>() as f64 / rides.len() as f64));
            ConditionRow {
                condition: condition.label(),
                days: rides.len(),
                avg_rides,
            }
        })
        .collect()
}

/// Joins daily ride counts with daily weather and groups days by condition.
#[tracing::instrument(skip(config))]
pub async fn daily_conditions(config: &PipelineConfig) -> Result<Vec<ConditionRow>> {
    config.validate()?;
    let merged = load_and_align(config, IntervalWidth::Daily, TripRequirement::StartOnly).await?;
    if merged.aligned.buckets.is_empty() {
        return Err(PipelineError::EmptyResult("daily alignment".to_string()).into());
    }

    let rows = condition_summary(&merged.aligned.buckets, config.warm_threshold);
    for row in &rows {
        info!(condition = row.condition, days = row.days, avg_rides = row.avg_rides, "Condition");
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::WeatherValues;
    use chrono::NaiveDateTime;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 8, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_summary_trims_outlier_days() {
        let mut daily = IntervalCounts::default();
        for (d, count) in [(1, 100), (2, 110), (3, 90), (4, 105), (5, 5000), (6, 95)] {
            daily.add(day(d), count);
        }

        let summary = summarize_daily_counts(&daily, 3).unwrap();
        assert_eq!(summary.days_covered, 5);
        assert_eq!(summary.total_rides, 500);
        assert_eq!(summary.avg_rides_per_day, 100.0);
        assert_eq!(summary.avg_rides_per_hour, 4.17);
        assert_eq!(summary.start_date, NaiveDate::from_ymd_opt(2023, 8, 1).unwrap());
        assert_eq!(summary.end_date, NaiveDate::from_ymd_opt(2023, 8, 6).unwrap());
        assert_eq!(summary.metrics()[0], ("total_files", "3".to_string()));
    }

    #[test]
    fn test_summary_of_nothing_is_empty_result() {
        let err = summarize_daily_counts(&IntervalCounts::default(), 0).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult(_)));
    }

    #[test]
    fn test_classify_uses_inclusive_warm_threshold() {
        assert_eq!(Condition::classify(14.9, 0.2, 15.0), Condition::RainCool);
        assert_eq!(Condition::classify(15.0, 0.0, 15.0), Condition::DryWarm);
        assert_eq!(Condition::classify(20.0, 1.0, 15.0), Condition::RainWarm);
        assert_eq!(Condition::classify(-2.0, 0.0, 15.0), Condition::DryCool);
    }

    #[test]
    fn test_condition_summary_reports_every_category() {
        let bucket = |d: u32, rides: u64, temperature: f64, precipitation: f64| IntervalBucket {
            timestamp: day(d),
            ride_count: rides,
            weather: WeatherValues {
                temperature,
                precipitation,
                humidity: 60.0,
                wind: 3.0,
                pressure: 1010.0,
            },
        };
        let days = [
            bucket(1, 300, 22.0, 0.0),
            bucket(2, 500, 25.0, 0.0),
            bucket(3, 120, 18.0, 4.0),
            bucket(4, 80, 8.0, 0.0),
        ];

        let rows = condition_summary(&days, 15.0);
        let labels: Vec<&str> = rows.iter().map(|r| r.condition).collect();
        assert_eq!(labels, vec!["rain_cool", "dry_cool", "rain_warm", "dry_warm"]);
        assert_eq!(rows[0].days, 0);
        assert_eq!(rows[0].avg_rides, None);
        assert_eq!(rows[3].avg_rides, Some(400.0));
        assert_eq!(rows[2].avg_rides, Some(120.0));
    }
}

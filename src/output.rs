//! Artifact writing for evaluation runs and summaries.
//!
//! Tables are written as CSV with a header row, the run bookkeeping as
//! pretty-printed JSON, and everything together as a single HTML report.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::evaluate::EvaluationResult;
use crate::pipeline::EvaluationRun;
use crate::summary::{ConditionRow, DatasetSummary};

#[derive(Serialize)]
struct MetricsRow<'a> {
    model: &'a str,
    r2: f64,
    mse: f64,
    mae: f64,
    cv_r2_mean: f64,
    cv_r2_std: f64,
}

#[derive(Serialize)]
struct SeasonalRow<'a> {
    model: &'a str,
    season: &'a str,
    n: usize,
    r2: f64,
    weight: f64,
    weighted_r2: f64,
}

#[derive(Serialize)]
struct MetricValue<'a> {
    metric: &'a str,
    value: &'a str,
}

fn metrics_row(result: &EvaluationResult) -> MetricsRow<'static> {
    MetricsRow {
        model: result.model.name(),
        r2: result.r2,
        mse: result.mse,
        mae: result.mae,
        cv_r2_mean: result.cv.mean,
        cv_r2_std: result.cv.std,
    }
}

/// Writes `rows` to a fresh CSV file at `path`, header first.
pub fn write_records<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to create '{}'", path.display()))?;

    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = count, "CSV written");
    Ok(())
}

/// Logs the overall metrics table as pretty-printed JSON.
pub fn print_metrics(results: &[EvaluationResult]) -> Result<()> {
    let rows: Vec<_> = results.iter().map(metrics_row).collect();
    info!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

/// Writes every artifact of an evaluation run into `dir` and returns the paths written.
#[tracing::instrument(skip(run), fields(dir = %dir.display()))]
pub fn write_evaluation(dir: &Path, run: &EvaluationRun) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
    let mut written = Vec::new();

    for result in &run.results {
        let name = result.model.name();

        let path = dir.join(format!("{name}_feature_weights.csv"));
        write_records(&path, &result.attribution)?;
        written.push(path);

        let path = dir.join(format!("{name}_seasonal_metrics.csv"));
        write_records(
            &path,
            result.seasonal.seasons.iter().map(|m| SeasonalRow {
                model: name,
                season: m.season.name(),
                n: m.n,
                r2: m.r2,
                weight: m.weight,
                weighted_r2: m.weighted_r2,
            }),
        )?;
        written.push(path);

        let path = dir.join(format!("{name}_predictions_test.csv"));
        write_records(&path, &result.test_trace)?;
        written.push(path);

        let path = dir.join(format!("{name}_predictions_full.csv"));
        write_records(&path, &result.full_trace)?;
        written.push(path);
    }

    let path = dir.join("model_evaluation_metrics.csv");
    write_records(&path, run.results.iter().map(metrics_row))?;
    written.push(path);

    let path = dir.join("run_summary.json");
    fs::write(&path, serde_json::to_string_pretty(&run.summary)?)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    written.push(path);

    let path = dir.join("index.html");
    fs::write(&path, render_html(run)?)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    written.push(path);

    info!(files = written.len(), "Evaluation artifacts written");
    Ok(written)
}

pub fn write_dataset_summary(dir: &Path, summary: &DatasetSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("dataset_summary.csv");
    let metrics = summary.metrics();
    write_records(
        &path,
        metrics.iter().map(|(metric, value)| MetricValue {
            metric: *metric,
            value: value.as_str(),
        }),
    )?;
    info!(path = %path.display(), "Dataset summary written");
    Ok(path)
}

pub fn write_conditions(dir: &Path, rows: &[ConditionRow]) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("daily_rides_by_condition.csv");
    write_records(&path, rows)?;
    info!(path = %path.display(), "Condition summary written");
    Ok(path)
}

fn fmt4(value: f64) -> String {
    format!("{value:.4}")
}

/// Consolidated report: every table of the run plus the time-series chart references.
pub fn render_html(run: &EvaluationRun) -> Result<String> {
    let mut html = String::new();
    writeln!(
        html,
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">\
         <title>Ride demand model evaluation</title></head>\n<body>"
    )?;
    writeln!(html, "<h1>Ride demand model evaluation</h1>")?;

    writeln!(html, "<h2>Overall metrics</h2>\n<table border=\"1\">")?;
    writeln!(
        html,
        "<tr><th>Model</th><th>R²</th><th>MSE</th><th>MAE</th>\
         <th>CV R² mean</th><th>CV R² std</th></tr>"
    )?;
    for r in &run.results {
        writeln!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            r.model.name(),
            fmt4(r.r2),
            fmt4(r.mse),
            fmt4(r.mae),
            fmt4(r.cv.mean),
            fmt4(r.cv.std)
        )?;
    }
    writeln!(html, "</table>")?;

    for r in &run.results {
        let name = r.model.name();
        writeln!(html, "<h2>{name}</h2>")?;

        writeln!(html, "<h3>Feature weights</h3>\n<table border=\"1\">")?;
        writeln!(html, "<tr><th>Feature</th><th>Weight</th></tr>")?;
        for w in &r.attribution {
            let weight = fmt4(w.weight);
            writeln!(html, "<tr><td>{}</td><td>{weight}</td></tr>", w.feature)?;
        }
        writeln!(html, "</table>")?;

        writeln!(html, "<h3>Seasonal metrics</h3>\n<table border=\"1\">")?;
        writeln!(
            html,
            "<tr><th>Season</th><th>n</th><th>R²</th><th>Weight</th><th>Weighted R²</th></tr>"
        )?;
        for m in &r.seasonal.seasons {
            writeln!(
                html,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                m.season.name(),
                m.n,
                fmt4(m.r2),
                fmt4(m.weight),
                fmt4(m.weighted_r2)
            )?;
        }
        writeln!(
            html,
            "<tr><td colspan=\"4\">Season-weighted R²</td><td>{}</td></tr>\n</table>",
            fmt4(r.seasonal.weighted_r2)
        )?;

        writeln!(
            html,
            "<img src=\"{name}_timeseries_test.png\" alt=\"{name} test predictions\">\n\
             <img src=\"{name}_timeseries_full.png\" alt=\"{name} full predictions\">"
        )?;
    }

    let s = &run.summary;
    writeln!(html, "<h2>Data</h2>\n<ul>")?;
    writeln!(
        html,
        "<li>Weather files: {}, trip files: {}</li>",
        s.weather_files, s.trip_files
    )?;
    writeln!(
        html,
        "<li>Trips: {}, weather observations: {}</li>",
        s.trips, s.weather_observations
    )?;
    writeln!(
        html,
        "<li>Merged intervals: {}, after outlier trimming: {} (train {}, test {})</li>",
        s.merged_intervals, s.rows_after_outliers, s.train_rows, s.test_rows
    )?;
    for (label, count) in s.trip_drops.iter() {
        writeln!(html, "<li>Trip rows dropped ({label}): {count}</li>")?;
    }
    writeln!(
        html,
        "<li>Zero-filled intervals joined with weather: {}</li>",
        s.zero_filled_intervals
    )?;
    for (label, count) in s.weather_files_skipped.iter() {
        writeln!(html, "<li>Weather files skipped ({label}): {count}</li>")?;
    }
    for (label, count) in s.trip_files_skipped.iter() {
        writeln!(html, "<li>Trip files skipped ({label}): {count}</li>")?;
    }
    for (label, count) in s.weather_drops.iter() {
        writeln!(html, "<li>Weather rows dropped ({label}): {count}</li>")?;
    }
    writeln!(html, "</ul>\n</body>\n</html>")?;
    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DropCounts;
    use crate::pipeline::RunSummary;
    use crate::summary::Condition;
    use std::env;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_write_records_writes_header_once() {
        let dir = temp_dir("bikeshare_forecast_output_records");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rows.csv");

        let rows = [
            MetricValue {
                metric: "a",
                value: "1",
            },
            MetricValue {
                metric: "b",
                value: "2",
            },
        ];
        write_records(&path, &rows).unwrap();
        write_records(&path, &rows).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec!["metric,value", "a,1", "b,2"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_conditions_leave_empty_average_blank() {
        let dir = temp_dir("bikeshare_forecast_output_conditions");
        let rows = vec![
            ConditionRow {
                condition: Condition::RainCool.label(),
                days: 0,
                avg_rides: None,
            },
            ConditionRow {
                condition: Condition::DryWarm.label(),
                days: 2,
                avg_rides: Some(410.5),
            },
        ];

        let path = write_conditions(&dir, &rows).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content.lines().collect::<Vec<_>>(),
            vec!["condition,days,avg_rides", "rain_cool,0,", "dry_warm,2,410.5"]
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_report_lists_skipped_files_and_zero_filled_intervals() {
        let mut trip_files_skipped = DropCounts::default();
        trip_files_skipped.add("skipped_prefix", 2);
        trip_files_skipped.add("skipped_dir", 1);
        let run = EvaluationRun {
            summary: RunSummary {
                trip_files_skipped,
                zero_filled_intervals: 7,
                ..Default::default()
            },
            results: Vec::new(),
        };

        let html = render_html(&run).unwrap();
        assert!(html.contains("<li>Trip files skipped (skipped_prefix): 2</li>"));
        assert!(html.contains("<li>Trip files skipped (skipped_dir): 1</li>"));
        assert!(html.contains("<li>Zero-filled intervals joined with weather: 7</li>"));
        assert!(!html.contains("Weather files skipped"));
    }
}

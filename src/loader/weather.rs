//! Hourly weather log loading.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use super::schema::{
    self, ColumnMap, DAY, HOUR, HUMIDITY, MONTH, PRECIPITATION, PRESSURE, TEMPERATURE, WIND, YEAR,
};
use super::{DropCounts, DropReason, RecordOutcome, SourceFilter, discover_files};

/// One validated hourly reading. Every field is present; precipitation is ≥ 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherObservation {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub precipitation: f64,
    pub humidity: f64,
    pub wind: f64,
    pub pressure: f64,
}

/// All weather observations read from a directory.
#[derive(Debug, Default)]
pub struct WeatherLoad {
    pub observations: Vec<WeatherObservation>,
    pub files: usize,
    pub drops: DropCounts,
    /// Directory entries passed over by name.
    pub skipped_files: DropCounts,
}

/// Parses a numeric cell. Empty cells, unparsable text, NaN and sentinel codes are all missing.
pub fn parse_measurement(raw: Option<&str>, sentinels: &[f64]) -> Option<f64> {
    let value: f64 = raw?.parse().ok()?;
    if !value.is_finite() || sentinels.iter().any(|s| (value - s).abs() < 1e-9) {
        return None;
    }
    Some(value)
}

fn parse_component(raw: Option<&str>) -> Option<u32> {
    let value: f64 = raw?.parse().ok()?;
    if value < 0.0 || value.fract() != 0.0 {
        return None;
    }
    Some(value as u32)
}

/// The weather validity predicate.
pub fn classify_weather_row(
    map: &ColumnMap,
    record: &StringRecord,
    sentinels: &[f64],
) -> RecordOutcome<WeatherObservation> {
    let year = parse_component(map.get(record, YEAR));
    let month = parse_component(map.get(record, MONTH));
    let day = parse_component(map.get(record, DAY));
    let hour = parse_component(map.get(record, HOUR));

    let timestamp = match (year, month, day, hour) {
        (Some(y), Some(m), Some(d), Some(h)) => NaiveDate::from_ymd_opt(y as i32, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0)),
        _ => None,
    };
    let Some(timestamp) = timestamp else {
        return RecordOutcome::Dropped(DropReason::InvalidTimestamp);
    };

    macro_rules! measurement {
        ($field:expr) => {
            match parse_measurement(map.get(record, $field), sentinels) {
                Some(v) => v,
                None => return RecordOutcome::Dropped(DropReason::MissingField($field)),
            }
        };
    }

    let temperature = measurement!(TEMPERATURE);
    let precipitation = measurement!(PRECIPITATION);
    let humidity = measurement!(HUMIDITY);
    let wind = measurement!(WIND);
    let pressure = measurement!(PRESSURE);

    RecordOutcome::Valid(WeatherObservation {
        timestamp,
        temperature,
        precipitation: precipitation.max(0.0),
        humidity,
        wind,
        pressure,
    })
}

/// Reads one weather file. A missing required column fails the whole file.
#[tracing::instrument(skip(sentinels), fields(path = %path.display()))]
pub fn read_weather_file(
    path: &Path,
    sentinels: &[f64],
) -> Result<(Vec<WeatherObservation>, DropCounts)> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open weather file '{}'", path.display()))?;

    let headers = reader.headers()?.clone();
    let map = ColumnMap::resolve(path, &headers, schema::WEATHER_FIELDS, &[])?;

    let mut observations = Vec::new();
    let mut drops = DropCounts::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(error = %e, "Unreadable weather row");
                drops.record(DropReason::CsvError);
                continue;
            }
        };

        match classify_weather_row(&map, &record, sentinels) {
            RecordOutcome::Valid(obs) => observations.push(obs),
            RecordOutcome::Dropped(reason) => drops.record(reason),
        }
    }

    debug!(
        rows = observations.len(),
        dropped = drops.total(),
        "Weather file read"
    );
    Ok((observations, drops))
}

/// Loads every weather file directly inside `dir`.
#[tracing::instrument(skip(filter, sentinels), fields(dir = %dir.display()))]
pub fn load_weather(dir: &Path, filter: &SourceFilter, sentinels: &[f64]) -> Result<WeatherLoad> {
    let found = discover_files(dir, filter, false)?;
    let mut load = WeatherLoad {
        files: found.files.len(),
        skipped_files: found.skipped,
        ..Default::default()
    };

    for path in &found.files {
        let (observations, drops) = read_weather_file(path, sentinels)?;
        load.observations.extend(observations);
        load.drops.merge(&drops);
    }

    if load.observations.is_empty() {
        warn!(files = load.files, "No valid weather observations loaded");
    }

    info!(
        files = load.files,
        observations = load.observations.len(),
        dropped = load.drops.total(),
        "Loaded weather"
    );
    Ok(load)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use std::env;
    use std::fs;

    const HEADER: &str = "YEAR,MO,DY,HR,TEMP,PRCP,HMDT,WND_SPD,ATM_PRESS";
    const SENTINELS: &[f64] = &[-999.0, -9999.0];

    fn row(cells: &[&str]) -> (ColumnMap, StringRecord) {
        let headers = StringRecord::from(HEADER.split(',').collect::<Vec<_>>());
        let map =
            ColumnMap::resolve(Path::new("w.csv"), &headers, schema::WEATHER_FIELDS, &[]).unwrap();
        (map, StringRecord::from(cells.to_vec()))
    }

    #[test]
    fn test_valid_row_builds_hourly_timestamp() {
        let (map, record) = row(&["2023", "7", "1", "13", "24.1", "0.2", "55", "3.5", "1011"]);
        match classify_weather_row(&map, &record, SENTINELS) {
            RecordOutcome::Valid(obs) => {
                assert_eq!(obs.timestamp.to_string(), "2023-07-01 13:00:00");
                assert_eq!(obs.temperature, 24.1);
                assert_eq!(obs.pressure, 1011.0);
            }
            other => panic!("expected valid row, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_precipitation_is_clamped() {
        let (map, record) = row(&["2023", "7", "1", "13", "24.1", "-0.1", "55", "3.5", "1011"]);
        let RecordOutcome::Valid(obs) = classify_weather_row(&map, &record, SENTINELS) else {
            panic!("expected valid row");
        };
        assert_eq!(obs.precipitation, 0.0);
    }

    #[test]
    fn test_sentinel_code_marks_field_missing() {
        let (map, record) = row(&["2023", "7", "1", "13", "-9999", "0", "55", "3.5", "1011"]);
        assert_eq!(
            classify_weather_row(&map, &record, SENTINELS),
            RecordOutcome::Dropped(DropReason::MissingField(TEMPERATURE))
        );

        let (map, record) = row(&["2023", "7", "1", "13", "20", "0", "55", "-999", "1011"]);
        assert_eq!(
            classify_weather_row(&map, &record, SENTINELS),
            RecordOutcome::Dropped(DropReason::MissingField(WIND))
        );
    }

    #[test]
    fn test_impossible_date_is_invalid_timestamp() {
        let (map, record) = row(&["2023", "2", "30", "1", "1", "0", "55", "3", "1011"]);
        assert_eq!(
            classify_weather_row(&map, &record, SENTINELS),
            RecordOutcome::Dropped(DropReason::InvalidTimestamp)
        );

        let (map, record) = row(&["2023", "2", "3", "24", "1", "0", "55", "3", "1011"]);
        assert_eq!(
            classify_weather_row(&map, &record, SENTINELS),
            RecordOutcome::Dropped(DropReason::InvalidTimestamp)
        );
    }

    #[test]
    fn test_load_weather_skips_metadata_and_counts_drops() {
        let dir = env::temp_dir().join("bikeshare_forecast_weather_load");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();

        fs::write(
            dir.join("chicago_2023.csv"),
            format!("{HEADER}\n2023,7,1,0,20,0,50,3,1010\n2023,7,1,1,,0,50,3,1010\n"),
        )
        .unwrap();
        fs::write(dir.join("._chicago_2023.csv"), "\u{0}\u{1}binary").unwrap();

        let config = PipelineConfig::default();
        let load = load_weather(&dir, &SourceFilter::weather(&config), SENTINELS).unwrap();

        assert_eq!(load.files, 1);
        assert_eq!(load.skipped_files.iter().collect::<Vec<_>>(), vec![("skipped_prefix", 1)]);
        assert_eq!(load.observations.len(), 1);
        assert_eq!(load.drops.get(DropReason::MissingField(TEMPERATURE)), 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_column_fails_file() {
        let dir = env::temp_dir().join("bikeshare_forecast_weather_schema");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("w.csv"), "YEAR,MO,DY,HR,TEMP\n2023,7,1,0,20\n").unwrap();

        let config = PipelineConfig::default();
        let err = load_weather(&dir, &SourceFilter::weather(&config), SENTINELS).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::error::PipelineError>(),
            Some(crate::error::PipelineError::MissingColumn { .. })
        ));

        fs::remove_dir_all(&dir).unwrap();
    }
}

//! Declared field mappings from source column names to canonical fields.
//!
//! Header matching is case-insensitive and whitespace-trimmed. A required
//! field with no matching header fails the file with
//! [`PipelineError::MissingColumn`] instead of yielding an empty column.

use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub canonical: &'static str,
    /// Accepted source header names.
    pub aliases: &'static [&'static str],
    pub required: bool,
}

const fn required(canonical: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        canonical,
        aliases,
        required: true,
    }
}

const fn optional(canonical: &'static str, aliases: &'static [&'static str]) -> FieldSpec {
    FieldSpec {
        canonical,
        aliases,
        required: false,
    }
}

pub const YEAR: &str = "year";
pub const MONTH: &str = "month";
pub const DAY: &str = "day";
pub const HOUR: &str = "hour";
pub const TEMPERATURE: &str = "temperature";
pub const PRECIPITATION: &str = "precipitation";
pub const HUMIDITY: &str = "humidity";
pub const WIND: &str = "wind";
pub const PRESSURE: &str = "pressure";

pub const RIDE_ID: &str = "ride_id";
pub const STARTED_AT: &str = "started_at";
pub const ENDED_AT: &str = "ended_at";

/// Weather log columns (NOAA hourly export naming first).
pub const WEATHER_FIELDS: &[FieldSpec] = &[
    required(YEAR, &["YEAR", "YR"]),
    required(MONTH, &["MO", "MONTH"]),
    required(DAY, &["DY", "DAY"]),
    required(HOUR, &["HR", "HOUR"]),
    required(TEMPERATURE, &["TEMP", "TEMPERATURE"]),
    required(PRECIPITATION, &["PRCP", "PRECIP", "PRECIPITATION"]),
    required(HUMIDITY, &["HMDT", "HUMIDITY"]),
    required(WIND, &["WND_SPD", "WIND_SPEED", "WIND"]),
    required(PRESSURE, &["ATM_PRESS", "PRESSURE"]),
];

/// Trip log columns. Everything else in a trip file is ignored.
pub const TRIP_FIELDS: &[FieldSpec] = &[
    required(RIDE_ID, &["ride_id", "trip_id"]),
    required(STARTED_AT, &["started_at", "start_time"]),
    optional(ENDED_AT, &["ended_at", "end_time"]),
];

/// Canonical field → column index for one file.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    indices: HashMap<&'static str, usize>,
}

impl ColumnMap {
    /// Matches `headers` against `fields`, treating every name in `also_required`
    /// as required even if the table marks it optional.
    pub fn resolve(
        path: &Path,
        headers: &StringRecord,
        fields: &[FieldSpec],
        also_required: &[&str],
    ) -> Result<Self, PipelineError> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_ascii_uppercase())
            .collect();

        let mut indices = HashMap::new();
        for field in fields {
            let position = normalized.iter().position(|h| {
                field
                    .aliases
                    .iter()
                    .any(|alias| alias.eq_ignore_ascii_case(h))
            });

            match position {
                Some(idx) => {
                    indices.insert(field.canonical, idx);
                }
                None if field.required || also_required.contains(&field.canonical) => {
                    return Err(PipelineError::MissingColumn {
                        path: path.to_path_buf(),
                        column: field.canonical.to_string(),
                    });
                }
                None => {}
            }
        }

        Ok(Self { indices })
    }

    /// Trimmed cell for `canonical`, or `None` if the column is absent or the cell empty.
    pub fn get<'r>(&self, record: &'r StringRecord, canonical: &str) -> Option<&'r str> {
        let idx = *self.indices.get(canonical)?;
        record
            .get(idx)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn has(&self, canonical: &str) -> bool {
        self.indices.contains_key(canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive_and_trimmed() {
        let headers = StringRecord::from(vec![
            " year", "mo ", "DY", "Hr", "temp", "PRCP", "hmdt", "wnd_spd", "ATM_PRESS",
        ]);
        let map = ColumnMap::resolve(Path::new("w.csv"), &headers, WEATHER_FIELDS, &[]).unwrap();

        let row = StringRecord::from(vec!["2023", "7", "1", "13", " 21.5 ", "", "60", "4", "1012"]);
        assert_eq!(map.get(&row, TEMPERATURE), Some("21.5"));
        assert_eq!(map.get(&row, PRECIPITATION), None);
        assert_eq!(map.get(&row, HOUR), Some("13"));
    }

    #[test]
    fn test_missing_required_column_is_reported() {
        let headers = StringRecord::from(vec!["ride_id", "ended_at"]);
        let err = ColumnMap::resolve(Path::new("t.csv"), &headers, TRIP_FIELDS, &[]).unwrap_err();
        match err {
            PipelineError::MissingColumn { column, .. } => assert_eq!(column, STARTED_AT),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_optional_column_can_be_promoted() {
        let headers = StringRecord::from(vec!["ride_id", "started_at"]);
        let map = ColumnMap::resolve(Path::new("t.csv"), &headers, TRIP_FIELDS, &[]).unwrap();
        assert!(!map.has(ENDED_AT));

        let err = ColumnMap::resolve(Path::new("t.csv"), &headers, TRIP_FIELDS, &[ENDED_AT]);
        assert!(err.is_err());
    }
}

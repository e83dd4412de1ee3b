//! Trip log loading.
//!
//! Only the identifier and timestamp columns are decoded; trip files carry
//! station names, coordinates and rider types that are never materialised.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;
use tracing::debug;

use super::schema::{self, ColumnMap, ENDED_AT, RIDE_ID, STARTED_AT};
use super::{DropCounts, DropReason, RecordOutcome};
use crate::config::DurationBounds;

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Clone, PartialEq)]
pub struct TripEvent {
    pub ride_id: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

impl TripEvent {
    pub fn duration_minutes(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 60_000.0)
    }
}

/// What a trip row must carry to be valid.
#[derive(Debug, Clone, Copy)]
pub enum TripRequirement {
    /// Identifier and start timestamp.
    StartOnly,
    /// Additionally an end timestamp, with a duration inside the bounds.
    Duration(DurationBounds),
}

/// Parses the timestamp layouts found in trip exports.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim().trim_matches('"');
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// The trip validity predicate.
pub fn classify_trip_row(
    map: &ColumnMap,
    record: &StringRecord,
    requirement: TripRequirement,
) -> RecordOutcome<TripEvent> {
    let Some(started_at) = map.get(record, STARTED_AT).and_then(parse_timestamp) else {
        return RecordOutcome::Dropped(DropReason::InvalidTimestamp);
    };
    let Some(ride_id) = map.get(record, RIDE_ID) else {
        return RecordOutcome::Dropped(DropReason::MissingIdentifier);
    };

    let ended_at = match map.get(record, ENDED_AT) {
        Some(raw) => match parse_timestamp(raw) {
            Some(end) => Some(end),
            None if matches!(requirement, TripRequirement::Duration(_)) => {
                return RecordOutcome::Dropped(DropReason::InvalidTimestamp);
            }
            None => None,
        },
        None => None,
    };

    let trip = TripEvent {
        ride_id: ride_id.to_string(),
        started_at,
        ended_at,
    };

    if let TripRequirement::Duration(bounds) = requirement {
        let Some(minutes) = trip.duration_minutes() else {
            return RecordOutcome::Dropped(DropReason::MissingEnd);
        };
        if minutes < 0.0 {
            return RecordOutcome::Dropped(DropReason::NegativeDuration);
        }
        if !bounds.contains(minutes) {
            return RecordOutcome::Dropped(DropReason::DurationOutOfRange);
        }
    }

    RecordOutcome::Valid(trip)
}

/// Streams the valid trips of one file into `sink`, returning the drop counts.
///
/// Rows are visited one at a time so a file never has to fit in memory as events.
pub fn for_each_trip<F>(
    path: &Path,
    requirement: TripRequirement,
    mut sink: F,
) -> Result<DropCounts>
where
    F: FnMut(TripEvent),
{
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open trip file '{}'", path.display()))?;

    let headers = reader.headers()?.clone();
    let also_required: &[&str] = match requirement {
        TripRequirement::StartOnly => &[],
        TripRequirement::Duration(_) => &[ENDED_AT],
    };
    let map = ColumnMap::resolve(path, &headers, schema::TRIP_FIELDS, also_required)?;

    let mut drops = DropCounts::default();
    let mut record = StringRecord::new();
    loop {
        match reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                // A malformed byte sequence ends that row, not the file.
                debug!(error = %e, "Unreadable trip row");
                drops.record(DropReason::CsvError);
                if e.is_io_error() {
                    break;
                }
                continue;
            }
        }

        match classify_trip_row(&map, &record, requirement) {
            RecordOutcome::Valid(trip) => sink(trip),
            RecordOutcome::Dropped(reason) => drops.record(reason),
        }
    }

    Ok(drops)
}

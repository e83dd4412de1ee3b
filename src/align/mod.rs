//! Temporal alignment of ride counts and weather onto one interval grid.

pub mod rides;
pub mod weather;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use rides::{IntervalCounts, RideCountLoad, load_ride_counts};
pub use weather::{WeatherSeries, WeatherValues, resample_weather};

/// Width of one aggregation interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalWidth {
    #[default]
    Hourly,
    Daily,
}

impl IntervalWidth {
    /// Start of the interval containing `ts`.
    pub fn floor(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let midnight = ts.date().and_time(NaiveTime::MIN);
        match self {
            IntervalWidth::Hourly => midnight + Duration::hours(i64::from(ts.hour())),
            IntervalWidth::Daily => midnight,
        }
    }

    pub fn step(&self) -> Duration {
        match self {
            IntervalWidth::Hourly => Duration::hours(1),
            IntervalWidth::Daily => Duration::days(1),
        }
    }
}

/// One interval with its ride count and the weather observed during it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IntervalBucket {
    pub timestamp: NaiveDateTime,
    pub ride_count: u64,
    pub weather: WeatherValues,
}

impl IntervalBucket {
    pub fn is_complete(&self) -> bool {
        let w = &self.weather;
        [w.temperature, w.precipitation, w.humidity, w.wind, w.pressure]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Result of the inner join, with how many intervals each side lost.
#[derive(Debug, Clone, Default)]
pub struct AlignedSeries {
    pub buckets: Vec<IntervalBucket>,
    /// Ride intervals (zero-filled ones included) with no weather.
    pub ride_only: usize,
    /// Weather intervals outside the ride series.
    pub weather_only: usize,
    /// Joined intervals dropped for a residual missing value.
    pub incomplete: usize,
    /// Joined intervals with no observed trip, present only through zero-filling.
    pub zero_filled: usize,
}

/// Zero-fills the ride series over its full span and inner-joins it with weather.
///
/// An interval survives only if both sides have it. Output is time ordered
/// with exactly one bucket per interval.
#[tracing::instrument(
    skip_all,
    fields(ride_intervals = rides.len(), weather_intervals = weather.values.len())
)]
pub fn align(
    rides: &IntervalCounts,
    weather: &WeatherSeries,
    width: IntervalWidth,
) -> AlignedSeries {
    let filled = rides.filled(width);
    let mut aligned = AlignedSeries::default();

    for (timestamp, ride_count) in filled.iter() {
        let Some(values) = weather.values.get(&timestamp) else {
            aligned.ride_only += 1;
            continue;
        };
        let bucket = IntervalBucket {
            timestamp,
            ride_count,
            weather: *values,
        };
        if bucket.is_complete() {
            if !rides.contains(timestamp) {
                aligned.zero_filled += 1;
            }
            aligned.buckets.push(bucket);
        } else {
            aligned.incomplete += 1;
        }
    }

    aligned.weather_only = weather
        .values
        .keys()
        .filter(|ts| !filled.contains(**ts))
        .count();

    info!(
        merged = aligned.buckets.len(),
        ride_only = aligned.ride_only,
        weather_only = aligned.weather_only,
        incomplete = aligned.incomplete,
        zero_filled = aligned.zero_filled,
        "Aligned rides with weather"
    );
    aligned
}

/// Keeps the buckets whose date lies in the inclusive range; returns how many were removed.
pub fn restrict_dates(
    buckets: &mut Vec<IntervalBucket>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> usize {
    let before = buckets.len();
    buckets.retain(|b| {
        let date = b.timestamp.date();
        start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
    });
    let removed = before - buckets.len();
    debug!(removed, kept = buckets.len(), "Applied date range");
    removed
}

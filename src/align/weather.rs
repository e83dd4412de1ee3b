//! Weather series per interval.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, warn};

use super::IntervalWidth;
use crate::loader::WeatherObservation;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherValues {
    pub temperature: f64,
    pub precipitation: f64,
    pub humidity: f64,
    pub wind: f64,
    pub pressure: f64,
}

impl From<&WeatherObservation> for WeatherValues {
    fn from(obs: &WeatherObservation) -> Self {
        Self {
            temperature: obs.temperature,
            precipitation: obs.precipitation,
            humidity: obs.humidity,
            wind: obs.wind,
            pressure: obs.pressure,
        }
    }
}

/// Weather keyed by interval start.
#[derive(Debug, Clone, Default)]
pub struct WeatherSeries {
    pub values: BTreeMap<NaiveDateTime, WeatherValues>,
    /// Identical readings for an hour that appeared more than once.
    pub duplicates: usize,
    /// Hours excluded because sources disagreed on the reading.
    pub conflicts: usize,
}

enum HourSlot {
    Reading(WeatherValues),
    Conflict,
}

/// Resamples validated hourly observations onto `width` intervals.
///
/// Hours reported more than once keep a single reading if all copies agree
/// and are excluded if they disagree. Daily intervals sum precipitation and
/// average every other field over the hours that survived.
pub fn resample_weather(
    observations: &[WeatherObservation],
    width: IntervalWidth,
) -> WeatherSeries {
    let mut slots: BTreeMap<NaiveDateTime, HourSlot> = BTreeMap::new();
    let mut duplicates = 0;

    for obs in observations {
        let hour = IntervalWidth::Hourly.floor(obs.timestamp);
        let reading = WeatherValues::from(obs);

        match slots.entry(hour) {
            Entry::Vacant(entry) => {
                entry.insert(HourSlot::Reading(reading));
            }
            Entry::Occupied(mut entry) => {
                let agrees =
                    matches!(entry.get(), HourSlot::Reading(existing) if *existing == reading);
                if agrees {
                    duplicates += 1;
                } else {
                    entry.insert(HourSlot::Conflict);
                }
            }
        }
    }

    let mut conflicts = 0;
    let hourly: BTreeMap<NaiveDateTime, WeatherValues> = slots
        .into_iter()
        .filter_map(|(hour, slot)| match slot {
            HourSlot::Reading(values) => Some((hour, values)),
            HourSlot::Conflict => {
                conflicts += 1;
                None
            }
        })
        .collect();

    if conflicts > 0 {
        warn!(conflicts, "Excluded hours with conflicting weather readings");
    }

    let values = match width {
        IntervalWidth::Hourly => hourly,
        IntervalWidth::Daily => coarsen(&hourly, width),
    };

    debug!(
        intervals = values.len(),
        duplicates,
        conflicts,
        "Weather resampled"
    );

    WeatherSeries {
        values,
        duplicates,
        conflicts,
    }
}

fn coarsen(
    hourly: &BTreeMap<NaiveDateTime, WeatherValues>,
    width: IntervalWidth,
) -> BTreeMap<NaiveDateTime, WeatherValues> {
    let mut groups: BTreeMap<NaiveDateTime, Vec<&WeatherValues>> = BTreeMap::new();
    for (hour, values) in hourly {
        groups.entry(width.floor(*hour)).or_default().push(values);
    }

    groups
        .into_iter()
        .map(|(interval, readings)| {
            let n = readings.len() as f64;
            let mean =
                |f: fn(&WeatherValues) -> f64| readings.iter().map(|v| f(*v)).sum::<f64>() / n;
            let values = WeatherValues {
                temperature: mean(|v| v.temperature),
                precipitation: readings.iter().map(|v| v.precipitation).sum(),
                humidity: mean(|v| v.humidity),
                wind: mean(|v| v.wind),
                pressure: mean(|v| v.pressure),
            };
            (interval, values)
        })
        .collect()
}

//! Calendar covariates and the model feature vector.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::align::IntervalBucket;

/// Covariate names in matrix column order.
pub const FEATURE_NAMES: [&str; 7] = [
    "temp",
    "precip",
    "humidity",
    "wind",
    "hour",
    "dayofweek",
    "month",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Fall,
}

impl Season {
    /// Report order.
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Fall];

    /// Meteorological season of a month (1–12). Out-of-range months wrap modulo 12.
    pub fn from_month(month: u32) -> Self {
        match month % 12 {
            0..=2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Fall,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    pub hour: u32,
    /// 0 = Monday.
    pub day_of_week: u32,
    pub month: u32,
    pub season: Season,
}

pub fn derive_calendar(ts: NaiveDateTime) -> Calendar {
    let month = ts.month();
    Calendar {
        hour: ts.hour(),
        day_of_week: ts.weekday().num_days_from_monday(),
        month,
        season: Season::from_month(month),
    }
}

/// One training row: the seven covariates, the season label and the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub precipitation: f64,
    pub humidity: f64,
    pub wind: f64,
    pub hour: u32,
    pub day_of_week: u32,
    pub month: u32,
    pub season: Season,
    pub ride_count: f64,
}

impl FeatureVector {
    /// Covariates in [`FEATURE_NAMES`] order.
    pub fn covariates(&self) -> [f64; 7] {
        [
            self.temperature,
            self.precipitation,
            self.humidity,
            self.wind,
            f64::from(self.hour),
            f64::from(self.day_of_week),
            f64::from(self.month),
        ]
    }
}

pub fn derive(bucket: &IntervalBucket) -> FeatureVector {
    let calendar = derive_calendar(bucket.timestamp);
    FeatureVector {
        timestamp: bucket.timestamp,
        temperature: bucket.weather.temperature,
        precipitation: bucket.weather.precipitation,
        humidity: bucket.weather.humidity,
        wind: bucket.weather.wind,
        hour: calendar.hour,
        day_of_week: calendar.day_of_week,
        month: calendar.month,
        season: calendar.season,
        ride_count: bucket.ride_count as f64,
    }
}

pub fn derive_all(buckets: &[IntervalBucket]) -> Vec<FeatureVector> {
    buckets.iter().map(derive).collect()
}

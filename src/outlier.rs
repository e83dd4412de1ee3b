//! Interquartile-range trimming.
//!
//! Each [`OutlierPass`] computes Q1 and Q3 of one column over the rows still
//! in the working set and removes rows outside `[Q1 - k·IQR, Q3 + k·IQR]`.
//! Passes run in configuration order, so later passes see fewer rows.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::features::FeatureVector;

/// A column an outlier pass can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimColumn {
    RideCount,
    Temperature,
    Precipitation,
    Humidity,
    Wind,
}

impl TrimColumn {
    pub fn name(&self) -> &'static str {
        match self {
            TrimColumn::RideCount => "ride_count",
            TrimColumn::Temperature => "temperature",
            TrimColumn::Precipitation => "precipitation",
            TrimColumn::Humidity => "humidity",
            TrimColumn::Wind => "wind",
        }
    }

    pub fn value(&self, row: &FeatureVector) -> f64 {
        match self {
            TrimColumn::RideCount => row.ride_count,
            TrimColumn::Temperature => row.temperature,
            TrimColumn::Precipitation => row.precipitation,
            TrimColumn::Humidity => row.humidity,
            TrimColumn::Wind => row.wind,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutlierPass {
    pub column: TrimColumn,
    /// Band half-width in IQRs; larger keeps more rows.
    pub multiplier: f64,
}

/// Accepted value range for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IqrBand {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBand {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub column: &'static str,
    pub multiplier: f64,
    pub band: Option<IqrBand>,
    pub before: usize,
    pub removed: usize,
}

/// Quantile of sorted data with linear interpolation between closest ranks.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

pub fn iqr_band(values: &[f64], multiplier: f64) -> Option<IqrBand> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    Some(IqrBand {
        q1,
        q3,
        lower: q1 - multiplier * iqr,
        upper: q3 + multiplier * iqr,
    })
}

/// Runs every pass in order and returns the surviving rows with one report per pass.
pub fn apply_passes(
    mut rows: Vec<FeatureVector>,
    passes: &[OutlierPass],
) -> (Vec<FeatureVector>, Vec<PassReport>) {
    let mut reports = Vec::with_capacity(passes.len());

    for pass in passes {
        let before = rows.len();
        let values: Vec<f64> = rows.iter().map(|r| pass.column.value(r)).collect();
        let band = iqr_band(&values, pass.multiplier);

        if let Some(band) = band {
            if band.iqr() == 0.0 {
                warn!(
                    column = pass.column.name(),
                    value = band.q1,
                    "Zero interquartile range; keeping only rows equal to the quartile"
                );
            }
            rows.retain(|r| band.contains(pass.column.value(r)));
        }

        let removed = before - rows.len();
        info!(
            column = pass.column.name(),
            multiplier = pass.multiplier,
            lower = band.map(|b| b.lower),
            upper = band.map(|b| b.upper),
            removed,
            kept = rows.len(),
            "Outlier pass applied"
        );
        reports.push(PassReport {
            column: pass.column.name(),
            multiplier: pass.multiplier,
            band,
            before,
            removed,
        });
    }

    (rows, reports)
}

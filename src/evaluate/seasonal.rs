//! Season-stratified accuracy.
//!
//! The weighted sum reweights per-season R² by row count, so it generally
//! differs from the pooled R² of the same rows.

use serde::Serialize;

use super::metrics::r2;
use crate::features::Season;

#[derive(Debug, Clone, Serialize)]
pub struct SeasonMetrics {
    pub season: Season,
    pub n: usize,
    pub r2: f64,
    /// Share of the rows that belong to this season.
    pub weight: f64,
    pub weighted_r2: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeasonalBreakdown {
    /// Seasons with at least one row, in winter..fall order.
    pub seasons: Vec<SeasonMetrics>,
    pub weighted_r2: f64,
}

pub fn breakdown(seasons: &[Season], actual: &[f64], predicted: &[f64]) -> SeasonalBreakdown {
    let total = seasons.len();
    let mut rows = Vec::new();

    for season in Season::ALL {
        let (a, p): (Vec<f64>, Vec<f64>) = seasons
            .iter()
            .zip(actual.iter().zip(predicted))
            .filter(|(s, _)| **s == season)
            .map(|(_, (a, p))| (*a, *p))
            .unzip();
        if a.is_empty() {
            continue;
        }

        let score = r2(&a, &p);
        let weight = a.len() as f64 / total as f64;
        rows.push(SeasonMetrics {
            season,
            n: a.len(),
            r2: score,
            weight,
            weighted_r2: score * weight,
        });
    }

    let weighted_r2 = rows.iter().map(|m| m.weighted_r2).sum();
    SeasonalBreakdown {
        seasons: rows,
        weighted_r2,
    }
}

//! Fitting, scoring and attribution for every model variant.

pub mod cv;
pub mod metrics;
pub mod seasonal;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::error::PipelineError;
use crate::features::{FEATURE_NAMES, FeatureVector, Season};
use crate::models::{ModelKind, ModelsConfig, TrainedModel, to_matrix};
use crate::split::chronological_split;
pub use cv::CvScores;
pub use seasonal::{SeasonMetrics, SeasonalBreakdown};

#[derive(Debug, Clone, Serialize)]
pub struct PredictionPoint {
    pub timestamp: NaiveDateTime,
    pub actual: f64,
    pub predicted: f64,
    pub season: Season,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureWeight {
    pub feature: &'static str,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub model: ModelKind,
    pub r2: f64,
    pub mse: f64,
    pub mae: f64,
    pub cv: CvScores,
    pub seasonal: SeasonalBreakdown,
    pub attribution: Vec<FeatureWeight>,
    #[serde(skip)]
    pub test_trace: Vec<PredictionPoint>,
    #[serde(skip)]
    pub full_trace: Vec<PredictionPoint>,
}

impl EvaluationResult {
    /// Attribution entry with the largest absolute weight.
    pub fn dominant_feature(&self) -> Option<&FeatureWeight> {
        self.attribution
            .iter()
            .max_by(|a, b| a.weight.abs().total_cmp(&b.weight.abs()))
    }

    pub fn weight_of(&self, feature: &str) -> Option<f64> {
        self.attribution
            .iter()
            .find(|w| w.feature == feature)
            .map(|w| w.weight)
    }
}

/// Parameters shared by every model evaluation of a run.
#[derive(Debug, Clone)]
pub struct EvaluationPlan<'a> {
    pub models: &'a ModelsConfig,
    pub train_fraction: f64,
    pub cv_splits: usize,
    pub seed: u64,
}

fn trace(rows: &[FeatureVector], predicted: &[f64]) -> Vec<PredictionPoint> {
    rows.iter()
        .zip(predicted)
        .map(|(row, p)| PredictionPoint {
            timestamp: row.timestamp,
            actual: row.ride_count,
            predicted: *p,
            season: row.season,
        })
        .collect()
}

/// Fits `kind` on the training prefix of `rows` and scores it on the test suffix.
#[tracing::instrument(skip(plan, rows), fields(model = kind.name(), rows = rows.len()))]
pub fn evaluate_model(
    kind: ModelKind,
    plan: &EvaluationPlan<'_>,
    rows: &[FeatureVector],
) -> Result<EvaluationResult, PipelineError> {
    let (train, test) = chronological_split(rows, plan.train_fraction)?;
    let (x_train, y_train) = to_matrix(train);
    let (x_test, y_test) = to_matrix(test);
    let (x_full, y_full) = to_matrix(rows);
    let cv = cv::cross_validate(kind, plan.models, plan.seed, &x_full, &y_full, plan.cv_splits)?;

    let model = TrainedModel::fit(kind, plan.models, plan.seed, &x_train, &y_train)?;
    let test_pred = model.predict(&x_test)?.to_vec();
    let full_pred = model.predict(&x_full)?.to_vec();
    let actual = y_test.to_vec();

    let r2 = metrics::r2(&actual, &test_pred);
    let mse = metrics::mse(&actual, &test_pred);
    let mae = metrics::mae(&actual, &test_pred);

    let test_seasons: Vec<Season> = test.iter().map(|r| r.season).collect();
    let seasonal = seasonal::breakdown(&test_seasons, &actual, &test_pred);

    let attribution = FEATURE_NAMES
        .into_iter()
        .zip(model.attribution())
        .map(|(feature, weight)| FeatureWeight { feature, weight })
        .collect();

    info!(
        r2,
        mse,
        mae,
        cv_r2_mean = cv.mean,
        cv_r2_std = cv.std,
        seasonal_weighted_r2 = seasonal.weighted_r2,
        "Model evaluated"
    );

    Ok(EvaluationResult {
        model: kind,
        r2,
        mse,
        mae,
        cv,
        seasonal,
        attribution,
        test_trace: trace(test, &test_pred),
        full_trace: trace(rows, &full_pred),
    })
}

/// Evaluates every enabled variant, in report order.
pub fn evaluate_all(
    plan: &EvaluationPlan<'_>,
    rows: &[FeatureVector],
) -> Result<Vec<EvaluationResult>, PipelineError> {
    plan.models
        .enabled()
        .into_iter()
        .map(|kind| evaluate_model(kind, plan, rows))
        .collect()
}

//! Regression model variants and the fitted-model wrapper.
//!
//! Every variant implements [`Regressor`]. A [`TrainedModel`] binds a fitted
//! regressor to the column count it was trained on and clips every
//! prediction to a non-negative floor.

pub mod boosting;
pub mod forest;
pub mod linear;
pub mod tree;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;
use crate::features::{FEATURE_NAMES, FeatureVector};

pub use boosting::{BoostingConfig, GradientBoosting};
pub use forest::{ForestConfig, RandomForest};
pub use linear::LinearRegression;
pub use tree::RegressionTree;

pub trait Regressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PipelineError>;

    /// Raw predictions, one per row of `x`.
    fn predict(&self, x: &Array2<f64>) -> Array1<f64>;

    /// Per-feature weight: coefficients for linear models, relative importance for trees.
    fn attribution(&self) -> Vec<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModelKind {
    Linear,
    RandomForest,
    GradientBoosting,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Linear => "LinearRegression",
            ModelKind::RandomForest => "RandomForest",
            ModelKind::GradientBoosting => "GradientBoosting",
        }
    }

    fn build(&self, config: &ModelsConfig, seed: u64) -> Box<dyn Regressor> {
        match self {
            ModelKind::Linear => Box::new(LinearRegression::default()),
            ModelKind::RandomForest => {
                Box::new(RandomForest::new(config.random_forest.clone(), seed))
            }
            ModelKind::GradientBoosting => {
                Box::new(GradientBoosting::new(config.gradient_boosting.clone(), seed))
            }
        }
    }
}

/// Which variants run, and their parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub linear: bool,
    pub random_forest: ForestConfig,
    pub gradient_boosting: BoostingConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            linear: true,
            random_forest: ForestConfig::default(),
            gradient_boosting: BoostingConfig::default(),
        }
    }
}

impl ModelsConfig {
    /// Enabled variants in report order.
    pub fn enabled(&self) -> Vec<ModelKind> {
        let mut kinds = Vec::new();
        if self.linear {
            kinds.push(ModelKind::Linear);
        }
        if self.random_forest.enabled {
            kinds.push(ModelKind::RandomForest);
        }
        if self.gradient_boosting.enabled {
            kinds.push(ModelKind::GradientBoosting);
        }
        kinds
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.enabled().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one model must be enabled".to_string(),
            ));
        }
        self.random_forest.validate()?;
        self.gradient_boosting.validate()
    }
}

/// A fitted regressor bound to its feature schema.
pub struct TrainedModel {
    pub kind: ModelKind,
    n_features: usize,
    inner: Box<dyn Regressor>,
}

impl TrainedModel {
    pub fn fit(
        kind: ModelKind,
        config: &ModelsConfig,
        seed: u64,
        x: &Array2<f64>,
        y: &Array1<f64>,
    ) -> Result<Self, PipelineError> {
        if x.nrows() != y.len() {
            return Err(PipelineError::InsufficientData(format!(
                "{} feature rows but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(PipelineError::InsufficientData(
                "cannot fit on zero rows".to_string(),
            ));
        }

        let mut inner = kind.build(config, seed);
        inner.fit(x, y)?;
        debug!(model = kind.name(), rows = x.nrows(), "Model fitted");

        Ok(Self {
            kind,
            n_features: x.ncols(),
            inner,
        })
    }

    /// Predictions clipped at zero. Fails if `x` has a different column count than training.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PipelineError> {
        if x.ncols() != self.n_features {
            return Err(PipelineError::SchemaMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }
        Ok(self.inner.predict(x).mapv(|v| v.max(0.0)))
    }

    pub fn attribution(&self) -> Vec<f64> {
        self.inner.attribution()
    }
}

/// Covariate matrix in [`FEATURE_NAMES`] order and the ride-count target.
pub fn to_matrix(rows: &[FeatureVector]) -> (Array2<f64>, Array1<f64>) {
    let mut x = Array2::zeros((rows.len(), FEATURE_NAMES.len()));
    for (i, row) in rows.iter().enumerate() {
        for (j, value) in row.covariates().into_iter().enumerate() {
            x[[i, j]] = value;
        }
    }
    let y = rows.iter().map(|r| r.ride_count).collect();
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_config() -> ModelsConfig {
        ModelsConfig {
            linear: true,
            random_forest: ForestConfig {
                n_estimators: 5,
                ..Default::default()
            },
            gradient_boosting: BoostingConfig {
                n_estimators: 10,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_predictions_are_never_negative() {
        // Steep negative slope drives the linear fit below zero past the training range.
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![30.0, 20.0, 10.0, 0.0];
        let config = small_config();

        for kind in config.enabled() {
            let model = TrainedModel::fit(kind, &config, 7, &x, &y).unwrap();
            let pred = model.predict(&array![[5.0], [10.0], [1.0]]).unwrap();
            assert!(pred.iter().all(|p| *p >= 0.0), "{} went negative", kind.name());
        }
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
        let y = array![1.0, 2.0, 3.0];
        let model = TrainedModel::fit(ModelKind::Linear, &small_config(), 1, &x, &y).unwrap();

        let err = model.predict(&array![[1.0], [2.0]]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::SchemaMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_enabled_order_and_validation() {
        let mut config = ModelsConfig::default();
        assert_eq!(
            config.enabled(),
            vec![ModelKind::Linear, ModelKind::RandomForest, ModelKind::GradientBoosting]
        );

        config.linear = false;
        config.random_forest.enabled = false;
        config.gradient_boosting.enabled = false;
        assert!(config.validate().is_err());
    }
}

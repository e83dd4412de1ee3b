//! Least-squares gradient boosting over shallow regression trees.

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::Regressor;
use super::tree::{RegressionTree, normalize};
use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub enabled: bool,
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Share of rows drawn (without replacement) for each stage, in (0, 1].
    pub subsample: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_estimators: 200,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_leaf: 1,
            subsample: 1.0,
        }
    }
}

impl BoostingConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.enabled {
            return Ok(());
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig(
                "gradient_boosting.n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "gradient_boosting.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "gradient_boosting.subsample must lie in (0, 1], got {}",
                self.subsample
            )));
        }
        Ok(())
    }
}

pub struct GradientBoosting {
    config: BoostingConfig,
    seed: u64,
    init: f64,
    stages: Vec<RegressionTree>,
    importances: Vec<f64>,
}

impl GradientBoosting {
    pub fn new(config: BoostingConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            init: 0.0,
            stages: Vec::new(),
            importances: Vec::new(),
        }
    }

    fn stage_rows(&self, n: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n).collect();
        }
        let size = ((n as f64) * self.config.subsample).ceil() as usize;
        let mut rows = index::sample(rng, n, size.clamp(1, n)).into_vec();
        rows.sort_unstable();
        rows
    }
}

impl Regressor for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PipelineError> {
        let n = x.nrows();
        if n == 0 {
            return Err(PipelineError::InsufficientData(
                "gradient boosting needs at least one row".to_string(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.init = y.sum() / n as f64;
        let mut current = Array1::from_elem(n, self.init);
        let mut importances = vec![0.0; x.ncols()];
        let mut stages = Vec::with_capacity(self.config.n_estimators);

        for _ in 0..self.config.n_estimators {
            let residuals = y - &current;
            let rows = self.stage_rows(n, &mut rng);

            let mut tree = RegressionTree::default()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf);
            tree.fit_rows(x, &residuals, &rows, &mut rng)?;

            current.scaled_add(self.config.learning_rate, &tree.predict(x));
            for (total, imp) in importances.iter_mut().zip(tree.normalized_importances()) {
                *total += imp;
            }
            stages.push(tree);
        }

        self.importances = normalize(&importances);
        self.stages = stages;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut out = Array1::from_elem(x.nrows(), self.init);
        for tree in &self.stages {
            out.scaled_add(self.config.learning_rate, &tree.predict(x));
        }
        out
    }

    fn attribution(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((50, 2), |(i, j)| match j {
            0 => (i % 10) as f64,
            _ => ((i * 7) % 13) as f64,
        });
        let y = x.column(0).mapv(|v| if v < 5.0 { 10.0 } else { 40.0 });
        (x, y)
    }

    #[test]
    fn test_boosting_reduces_error_with_more_stages() {
        let (x, y) = data();
        let mse = |stages: usize| {
            let mut model = GradientBoosting::new(
                BoostingConfig {
                    n_estimators: stages,
                    ..Default::default()
                },
                1,
            );
            model.fit(&x, &y).unwrap();
            (&model.predict(&x) - &y).mapv(|e| e * e).mean().unwrap()
        };

        let few = mse(2);
        let many = mse(50);
        assert!(many < few);
        assert!(many < 1.0);
    }

    #[test]
    fn test_single_stage_starts_from_mean() {
        let (x, y) = data();
        let mut model = GradientBoosting::new(
            BoostingConfig {
                n_estimators: 1,
                max_depth: Some(0),
                ..Default::default()
            },
            1,
        );
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x);
        assert!(pred.iter().all(|p| (p - 25.0).abs() < 1e-9));
    }

    #[test]
    fn test_subsample_is_seeded() {
        let (x, y) = data();
        let config = BoostingConfig {
            n_estimators: 20,
            subsample: 0.5,
            ..Default::default()
        };
        let mut a = GradientBoosting::new(config.clone(), 5);
        let mut b = GradientBoosting::new(config, 5);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x), b.predict(&x));

        let imp = a.attribution();
        assert!(imp[0] > imp[1]);
    }
}

//! Bagged regression trees.

use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::Regressor;
use super::tree::{RegressionTree, normalize};
use crate::error::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub enabled: bool,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    /// Share of features tried at each split, in (0, 1].
    pub max_features: f64,
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_estimators: 100,
            max_depth: Some(12),
            min_samples_leaf: 1,
            max_features: 1.0,
            bootstrap: true,
        }
    }
}

impl ForestConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.enabled {
            return Ok(());
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::InvalidConfig(
                "random_forest.n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.max_features > 0.0 && self.max_features <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "random_forest.max_features must lie in (0, 1], got {}",
                self.max_features
            )));
        }
        Ok(())
    }
}

pub struct RandomForest {
    config: ForestConfig,
    seed: u64,
    trees: Vec<RegressionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig, seed: u64) -> Self {
        Self {
            config,
            seed,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn features_per_split(&self, n_features: usize) -> Option<usize> {
        let k = ((n_features as f64) * self.config.max_features).ceil() as usize;
        (k < n_features).then_some(k.max(1))
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PipelineError> {
        let n = x.nrows();
        let max_features = self.features_per_split(x.ncols());
        let mut trees = Vec::with_capacity(self.config.n_estimators);
        let mut importances = vec![0.0; x.ncols()];

        for tree_idx in 0..self.config.n_estimators {
            // Each tree owns a stream so results do not depend on fitting order.
            let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(tree_idx as u64));
            let rows: Vec<usize> = if self.config.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };

            let mut tree = RegressionTree::default()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_max_features(max_features);
            tree.fit_rows(x, y, &rows, &mut rng)?;

            for (total, imp) in importances.iter_mut().zip(tree.normalized_importances()) {
                *total += imp;
            }
            trees.push(tree);
        }

        let n_trees = trees.len().max(1) as f64;
        self.importances = normalize(&importances.iter().map(|v| v / n_trees).collect::<Vec<_>>());
        self.trees = trees;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut sum = Array1::zeros(x.nrows());
        for tree in &self.trees {
            sum += &tree.predict(x);
        }
        sum / self.trees.len().max(1) as f64
    }

    fn attribution(&self) -> Vec<f64> {
        self.importances.clone()
    }
}

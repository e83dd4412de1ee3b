//! CART regression tree with the squared-error criterion.

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;

use super::Regressor;
use crate::error::PipelineError;

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct RegressionTree {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all.
    pub max_features: Option<usize>,
    /// Seeds feature sampling when the tree is fitted on its own.
    pub seed: u64,
    root: Option<Node>,
    importances: Vec<f64>,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: 0,
            root: None,
            importances: Vec::new(),
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// n·parent_mse − (n_left·mse_left + n_right·mse_right)
    decrease: f64,
}

impl RegressionTree {
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: Option<usize>) -> Self {
        self.max_features = max_features;
        self
    }

    /// Fits on the rows named by `indices` (repeats allowed, as in a bootstrap sample).
    pub fn fit_rows(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Result<(), PipelineError> {
        if indices.is_empty() {
            return Err(PipelineError::InsufficientData(
                "regression tree needs at least one row".to_string(),
            ));
        }
        let mut importances = vec![0.0; x.ncols()];
        let mut rows = indices.to_vec();
        self.root = Some(self.grow(x, y, &mut rows, 0, &mut importances, rng));
        self.importances = importances;
        Ok(())
    }

    /// Unnormalised total impurity decrease per feature.
    pub fn raw_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Importances scaled to sum to 1 (all zero for a single-leaf tree).
    pub fn normalized_importances(&self) -> Vec<f64> {
        normalize(&self.importances)
    }

    pub fn predict_row(&self, x: &Array2<f64>, row: usize) -> f64 {
        let mut node = match &self.root {
            Some(node) => node,
            None => return 0.0,
        };
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[[row, *feature]] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    fn grow(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &mut [usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let n = rows.len();
        let mean = rows.iter().map(|&i| y[i]).sum::<f64>() / n as f64;

        let should_stop = n < self.min_samples_split
            || n < 2 * self.min_samples_leaf
            || self.max_depth.is_some_and(|d| depth >= d)
            || rows.iter().all(|&i| y[i] == y[rows[0]]);
        if should_stop {
            return Node::Leaf(mean);
        }

        let Some(best) = self.best_split(x, y, rows, rng) else {
            return Node::Leaf(mean);
        };
        rows.sort_by(|&a, &b| x[[a, best.feature]].total_cmp(&x[[b, best.feature]]));
        let mid = rows.partition_point(|&i| x[[i, best.feature]] <= best.threshold);
        if mid == 0 || mid == n {
            return Node::Leaf(mean);
        }
        importances[best.feature] += best.decrease;
        let (left_rows, right_rows) = rows.split_at_mut(mid);

        let left = self.grow(x, y, left_rows, depth + 1, importances, rng);
        let right = self.grow(x, y, right_rows, depth + 1, importances, rng);
        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn candidate_features(&self, n_features: usize, rng: &mut ChaCha8Rng) -> Vec<usize> {
        match self.max_features {
            Some(k) if k < n_features => {
                let mut picked = index::sample(rng, n_features, k.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    /// Sorted sweep per feature: maximising `sum_l²/n_l + sum_r²/n_r` minimises the child SSE.
    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        let total: f64 = rows.iter().map(|&i| y[i]).sum();
        let parent_score = total * total / n as f64;
        let min_leaf = self.min_samples_leaf;

        let mut best: Option<SplitCandidate> = None;
        let mut best_score = parent_score;
        let mut order = rows.to_vec();

        for feature in self.candidate_features(x.ncols(), rng) {
            order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

            let mut left_sum = 0.0;
            for pos in 1..n {
                left_sum += y[order[pos - 1]];
                let lo = x[[order[pos - 1], feature]];
                let hi = x[[order[pos], feature]];
                if pos < min_leaf || n - pos < min_leaf || lo == hi {
                    continue;
                }

                let right_sum = total - left_sum;
                let score =
                    left_sum * left_sum / pos as f64 + right_sum * right_sum / (n - pos) as f64;
                if score > best_score + 1e-12 * best_score.abs().max(1.0) {
                    // Adjacent doubles: the midpoint rounds up to `hi`.
                    let mut threshold = lo + (hi - lo) / 2.0;
                    if threshold >= hi {
                        threshold = lo;
                    }
                    best_score = score;
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        decrease: score - parent_score,
                    });
                }
            }
        }
        best
    }
}

impl Regressor for RegressionTree {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PipelineError> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.fit_rows(x, y, &rows, &mut rng)
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        (0..x.nrows()).map(|row| self.predict_row(x, row)).collect()
    }

    fn attribution(&self) -> Vec<f64> {
        self.normalized_importances()
    }
}

/// Scales `values` to sum to 1; an all-zero vector stays zero.
pub fn normalize(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_step_function_is_learned_exactly() {
        let x = array![[1.0, 5.0], [2.0, 3.0], [3.0, 9.0], [10.0, 1.0], [11.0, 7.0], [12.0, 2.0]];
        let y = array![5.0, 5.0, 5.0, 50.0, 50.0, 50.0];

        let mut tree = RegressionTree::default();
        tree.fit(&x, &y).unwrap();

        let pred = tree.predict(&array![[0.0, 0.0], [6.0, 0.0], [7.0, 0.0], [20.0, 0.0]]);
        assert_eq!(pred.to_vec(), vec![5.0, 5.0, 50.0, 50.0]);
        assert_eq!(tree.attribution(), vec![1.0, 0.0]);
    }

    #[test]
    fn test_adjacent_float_values_are_separated() {
        let a = f64::from_bits(1.0f64.to_bits() + 1);
        let b = f64::from_bits(1.0f64.to_bits() + 2);
        let x = array![[a], [b]];
        let y = array![0.0, 10.0];

        let mut tree = RegressionTree::default().with_max_depth(Some(3));
        tree.fit(&x, &y).unwrap();

        let pred = tree.predict(&array![[a], [b], [2.0]]);
        assert_eq!(pred.to_vec(), vec![0.0, 10.0, 10.0]);

        let mut unbounded = RegressionTree::default();
        unbounded.fit(&x, &y).unwrap();
        assert!(unbounded.predict(&x).iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_depth_limit_yields_mean_leaf() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![1.0, 2.0, 3.0, 6.0];

        let mut stump = RegressionTree::default().with_max_depth(Some(0));
        stump.fit(&x, &y).unwrap();
        assert_eq!(stump.predict(&x).to_vec(), vec![3.0; 4]);
        assert_eq!(stump.attribution(), vec![0.0]);
    }

    #[test]
    fn test_min_samples_leaf_is_respected() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 100.0];

        let mut tree = RegressionTree::default()
            .with_max_depth(Some(1))
            .with_min_samples_leaf(2);
        tree.fit(&x, &y).unwrap();

        // The outlier cannot be isolated in a leaf of its own.
        let pred = tree.predict(&array![[5.0]]);
        assert!((pred[0] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_importance_tracks_informative_feature() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| match j {
            0 => (i % 7) as f64,
            1 => i as f64,
            _ => ((i * 13) % 5) as f64,
        });
        let y: Array1<f64> = (0..40).map(|i| if i < 20 { 0.0 } else { 10.0 }).collect();

        let mut tree = RegressionTree::default().with_max_depth(Some(3));
        tree.fit(&x, &y).unwrap();
        let imp = tree.attribution();
        assert!(imp[1] > 0.99);
        assert!((imp.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }
}

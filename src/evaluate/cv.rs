//! Forward-chaining cross-validation.

use ndarray::{Array1, Array2, s};
use serde::Serialize;
use std::ops::Range;
use tracing::debug;

use super::metrics::{mean, r2, stddev};
use crate::error::PipelineError;
use crate::models::{ModelKind, ModelsConfig, TrainedModel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Fold layout over `n` time-ordered rows: every fold trains on a prefix and
/// tests on the `n / (splits + 1)` rows right after it.
pub fn folds(n: usize, splits: usize) -> Result<Vec<Fold>, PipelineError> {
    let test_size = n / (splits + 1);
    if splits < 2 || test_size == 0 {
        return Err(PipelineError::InsufficientData(format!(
            "{n} rows cannot form {splits} forward-chaining folds"
        )));
    }

    Ok((0..splits)
        .map(|i| {
            let train_end = n - (splits - i) * test_size;
            Fold {
                train: 0..train_end,
                test: train_end..train_end + test_size,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct CvScores {
    pub fold_r2: Vec<f64>,
    pub mean: f64,
    /// Population standard deviation of the fold scores.
    pub std: f64,
}

/// Refits `kind` on every fold's prefix and scores R² on its test block.
pub fn cross_validate(
    kind: ModelKind,
    config: &ModelsConfig,
    seed: u64,
    x: &Array2<f64>,
    y: &Array1<f64>,
    splits: usize,
) -> Result<CvScores, PipelineError> {
    let mut fold_r2 = Vec::with_capacity(splits);

    for (i, fold) in folds(x.nrows(), splits)?.into_iter().enumerate() {
        let x_train = x.slice(s![fold.train.clone(), ..]).to_owned();
        let y_train = y.slice(s![fold.train.clone()]).to_owned();
        let x_test = x.slice(s![fold.test.clone(), ..]).to_owned();
        let y_test = y.slice(s![fold.test.clone()]).to_vec();

        let model = TrainedModel::fit(kind, config, seed, &x_train, &y_train)?;
        let predicted = model.predict(&x_test)?.to_vec();
        let score = r2(&y_test, &predicted);
        debug!(
            model = kind.name(),
            fold = i,
            train = fold.train.len(),
            r2 = score,
            "CV fold scored"
        );
        fold_r2.push(score);
    }

    let m = mean(&fold_r2);
    Ok(CvScores {
        std: stddev(&fold_r2, m),
        mean: m,
        fold_r2,
    })
}
